//! Filtering and sorting over the module catalog
use crate::error::InventoryError;
use crate::kernel::{LoadedModule, ModuleCatalog, ModuleRecord, ModuleStatus};
use regex::Regex;
use std::cmp::Ordering;
use std::str::FromStr;

/// Translate a shell glob into an anchored regex.
///
/// `*` matches any run, `?` one character, `[...]` a class with `!` for
/// negation. An unterminated `[` is a literal bracket.
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^(?s:");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i + 1) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str("\\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    out.push_str(")$");
    out
}

/// Index of the `]` closing a class that opens just before `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    // A `]` right after the opening is a literal member.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

/// Translate a bracket expression body. Reversed ranges contribute nothing,
/// as with `fnmatch`, and regex class operators (`--`, `&&`, `~~`) are
/// neutralised by escaping.
fn translate_class(body: &[char]) -> String {
    let (negated, rest) = match body.split_first() {
        Some(('!', tail)) => (true, tail),
        _ => (false, body),
    };

    let mut members = String::new();
    let mut i = 0;
    while i < rest.len() {
        let lo = rest[i];
        if i + 2 < rest.len() && rest[i + 1] == '-' {
            let hi = rest[i + 2];
            if lo <= hi {
                push_class_char(&mut members, lo);
                members.push('-');
                push_class_char(&mut members, hi);
            }
            i += 3;
        } else {
            push_class_char(&mut members, lo);
            i += 1;
        }
    }

    match (members.is_empty(), negated) {
        (true, false) => r"(?:\b\B)".to_string(),
        (true, true) => ".".to_string(),
        (false, false) => format!("[{}]", members),
        (false, true) => format!("[^{}]", members),
    }
}

fn push_class_char(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~' | '-') {
        out.push('\\');
    }
    out.push(c);
}

/// Criteria for narrowing a catalog. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleFilter {
    pub name_pattern: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_refs: Option<u64>,
    pub status: Option<ModuleStatus>,
}

impl ModuleFilter {
    pub fn is_empty(&self) -> bool {
        *self == ModuleFilter::default()
    }

    pub fn compile(&self) -> Result<CompiledFilter, InventoryError> {
        let name = match &self.name_pattern {
            Some(pattern) => Some(Regex::new(&glob_to_regex(pattern)).map_err(|e| {
                InventoryError::InvalidArgument(format!("bad name pattern {:?}: {}", pattern, e))
            })?),
            None => None,
        };
        Ok(CompiledFilter {
            name,
            criteria: self.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledFilter {
    name: Option<Regex>,
    criteria: ModuleFilter,
}

impl CompiledFilter {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.as_ref().map_or(true, |re| re.is_match(name))
    }

    /// Size, refcount and status only exist for loaded modules; other
    /// records are judged by name alone.
    pub fn matches(&self, record: &ModuleRecord) -> bool {
        if !self.matches_name(record.name()) {
            return false;
        }
        let Some(module) = record.as_loaded() else {
            return true;
        };
        let c = &self.criteria;
        c.min_size.map_or(true, |min| module.size >= min)
            && c.max_size.map_or(true, |max| module.size <= max)
            && c.min_refs.map_or(true, |min| module.ref_count >= min)
            && c.status.map_or(true, |status| module.status == status)
    }

    pub fn apply(&self, records: Vec<ModuleRecord>) -> Vec<ModuleRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }

    pub fn apply_catalog(&self, catalog: &ModuleCatalog) -> ModuleCatalog {
        ModuleCatalog::from_records(self.apply(catalog.records()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Name,
    Size,
    Refs,
    Status,
}

impl FromStr for SortField {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortField::Name),
            "size" => Ok(SortField::Size),
            "refs" => Ok(SortField::Refs),
            "status" => Ok(SortField::Status),
            other => Err(InventoryError::InvalidArgument(format!(
                "unknown sort field: {}",
                other
            ))),
        }
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn compare_loaded(a: &LoadedModule, b: &LoadedModule, field: SortField) -> Ordering {
    match field {
        SortField::Name => compare_names(&a.name, &b.name),
        SortField::Size => a.size.cmp(&b.size),
        SortField::Refs => a.ref_count.cmp(&b.ref_count),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

/// Order two records by `field`. Fields other than name only exist on
/// loaded modules: loaded records come first and the rest fall back to name.
pub fn compare_records(a: &ModuleRecord, b: &ModuleRecord, field: SortField) -> Ordering {
    if field == SortField::Name {
        return compare_names(a.name(), b.name());
    }
    match (a.as_loaded(), b.as_loaded()) {
        (Some(x), Some(y)) => compare_loaded(x, y, field),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_names(a.name(), b.name()),
    }
}

fn directed(ordering: Ordering, reverse: bool) -> Ordering {
    if reverse {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Stable sort; equal keys keep their input order in both directions.
pub fn sort_records(records: &mut [ModuleRecord], field: SortField, reverse: bool) {
    records.sort_by(|a, b| directed(compare_records(a, b, field), reverse));
}

pub fn sort_loaded(modules: &mut [LoadedModule], field: SortField, reverse: bool) {
    modules.sort_by(|a, b| directed(compare_loaded(a, b, field), reverse));
}

/// Sort each list of the catalog. Builtin and unloaded lists have only a
/// name to sort on.
pub fn sort_catalog(catalog: &mut ModuleCatalog, field: SortField, reverse: bool) {
    sort_loaded(&mut catalog.loaded, field, reverse);
    catalog
        .builtin
        .sort_by(|a, b| directed(compare_names(&a.name, &b.name), reverse));
    catalog
        .unloaded
        .sort_by(|a, b| directed(compare_names(&a.name, &b.name), reverse));
}
