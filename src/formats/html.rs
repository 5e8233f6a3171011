//! HTML report formatter
use crate::error::InventoryError;
use crate::formats::traits::{OutputFormatter, ReportContext};
use crate::kernel::{format_size, ModuleCatalog};
use std::fmt::Write;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Kernel Modules Report - @HOSTNAME@</title>
    <style>
        body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0; background: #f4f6f8; color: #222; }
        .container { max-width: 1200px; margin: 0 auto; background: #fff; }
        .header { background: #2c3e50; color: #fff; padding: 24px 32px; }
        .header h1 { margin: 0 0 4px 0; }
        .stats { display: flex; gap: 16px; padding: 24px 32px; }
        .stat-card { flex: 1; background: #ecf0f1; border-radius: 6px; padding: 16px; text-align: center; }
        .stat-number { font-size: 1.8em; font-weight: bold; }
        .stat-label { color: #555; }
        .content { padding: 0 32px 32px 32px; }
        .module-table { width: 100%; border-collapse: collapse; margin-bottom: 24px; }
        .module-table th { background: #34495e; color: #fff; text-align: left; padding: 8px; }
        .module-table td { border-bottom: 1px solid #ddd; padding: 6px 8px; }
        .module-table tr:nth-child(even) { background: #fafafa; }
        .module-type { border-radius: 4px; padding: 2px 6px; font-size: 0.85em; color: #fff; }
        .type-loadable { background: #2980b9; }
        .type-builtin { background: #27ae60; }
        .type-unloaded { background: #7f8c8d; }
        .status-live { color: #27ae60; font-weight: bold; }
        .status-loading { color: #f39c12; font-weight: bold; }
        .status-unloading { color: #e67e22; font-weight: bold; }
        .status-dead { color: #c0392b; font-weight: bold; }
        .dependencies { max-width: 300px; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
        .search-box input { width: 100%; padding: 8px; margin: 16px 0; box-sizing: border-box; }
        .notice-warning { background: #fff3cd; border: 1px solid #ffe08a; padding: 12px; border-radius: 6px; }
        .footer { text-align: center; color: #777; padding: 16px; font-size: 0.85em; }
    </style>
    <script>
        function searchModules() {
            const filter = document.getElementById('searchInput').value.toLowerCase();
            document.querySelectorAll('.module-table tbody tr').forEach(row => {
                const name = row.getElementsByTagName('td')[0];
                const text = name ? name.textContent.toLowerCase() : '';
                row.style.display = text.indexOf(filter) > -1 ? '' : 'none';
            });
        }
    </script>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Kernel Modules Report</h1>
            <p>@HOSTNAME@ - @TIMESTAMP@</p>
        </div>
        <div class="stats">
            <div class="stat-card"><div class="stat-number">@TOTAL@</div><div class="stat-label">Total Modules</div></div>
            <div class="stat-card"><div class="stat-number">@LOADED@</div><div class="stat-label">Loadable</div></div>
            <div class="stat-card"><div class="stat-number">@BUILTIN@</div><div class="stat-label">Builtin</div></div>
            <div class="stat-card"><div class="stat-number">@UNLOADED@</div><div class="stat-label">Unloaded</div></div>
            <div class="stat-card"><div class="stat-number">@TOTAL_SIZE@</div><div class="stat-label">Total Size</div></div>
        </div>
        <div class="content">
            <h3>System Information</h3>
            <ul>
                <li><strong>Hostname:</strong> @HOSTNAME@</li>
                <li><strong>Kernel:</strong> Linux @RELEASE@</li>
                <li><strong>Architecture:</strong> @MACHINE@</li>
                <li><strong>Report Generated:</strong> @TIMESTAMP@</li>
            </ul>
@NOTICE@
            <div class="search-box">
                <input type="text" id="searchInput" placeholder="Search modules..." onkeyup="searchModules()">
            </div>
@SECTIONS@
        </div>
        <div class="footer">Generated by @TOOL@</div>
    </div>
</body>
</html>
"#;

const MASKED_NOTICE: &str = r#"            <div class="notice-warning">
                Note: module addresses are masked. The report was generated without the privilege to read kernel addresses.
            </div>
"#;

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn or_na(text: &str) -> String {
    if text.is_empty() {
        "N/A".to_string()
    } else {
        escape_html(text)
    }
}

fn open_table(out: &mut String, title: &str, count: usize, headers: &[&str]) {
    let _ = writeln!(out, "            <div class=\"section\">");
    let _ = writeln!(out, "                <h2>{} ({})</h2>", title, count);
    let _ = writeln!(out, "                <table class=\"module-table\">");
    let _ = write!(out, "                    <thead><tr>");
    for header in headers {
        let _ = write!(out, "<th>{}</th>", header);
    }
    let _ = writeln!(out, "</tr></thead>");
    let _ = writeln!(out, "                    <tbody>");
}

fn close_table(out: &mut String) {
    out.push_str("                    </tbody>\n                </table>\n            </div>\n");
}

/// HTML formatter producing a standalone report page
pub struct HtmlFormatter;

impl HtmlFormatter {
    fn sections(&self, catalog: &ModuleCatalog) -> String {
        let mut out = String::new();

        open_table(
            &mut out,
            "Loadable Kernel Modules",
            catalog.loaded.len(),
            &["Name", "Type", "Size", "Ref Count", "Status", "Dependencies", "Address"],
        );
        for module in &catalog.loaded {
            let deps = if module.dependencies.is_empty() {
                "None".to_string()
            } else {
                escape_html(&module.dependencies.join(", "))
            };
            let status = module.status.as_str();
            let _ = writeln!(
                out,
                "                        <tr><td><strong>{}</strong></td><td><span class=\"module-type type-loadable\">Loadable</span></td><td>{}</td><td>{}</td><td><span class=\"status-{}\">{}</span></td><td class=\"dependencies\" title=\"{}\">{}</td><td><code>{}</code></td></tr>",
                escape_html(&module.name),
                format_size(module.size),
                module.ref_count,
                status.to_lowercase(),
                status,
                deps,
                deps,
                escape_html(&module.address)
            );
        }
        close_table(&mut out);

        if !catalog.builtin.is_empty() {
            open_table(
                &mut out,
                "Builtin Kernel Modules",
                catalog.builtin.len(),
                &["Name", "Type", "Description", "Version", "Author", "License"],
            );
            for module in &catalog.builtin {
                let _ = writeln!(
                    out,
                    "                        <tr><td><strong>{}</strong></td><td><span class=\"module-type type-builtin\">Builtin</span></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(&module.name),
                    or_na(&module.description),
                    or_na(&module.version),
                    or_na(&module.author),
                    or_na(&module.license)
                );
            }
            close_table(&mut out);
        }

        if !catalog.unloaded.is_empty() {
            open_table(
                &mut out,
                "Unloaded Kernel Modules",
                catalog.unloaded.len(),
                &["Name", "Type", "Size", "Description", "File Path"],
            );
            for module in &catalog.unloaded {
                let _ = writeln!(
                    out,
                    "                        <tr><td><strong>{}</strong></td><td><span class=\"module-type type-unloaded\">Unloaded</span></td><td>{}</td><td>{}</td><td><code>{}</code></td></tr>",
                    escape_html(&module.name),
                    format_size(module.size),
                    or_na(&module.description),
                    escape_html(&module.file_path)
                );
            }
            close_table(&mut out);
        }

        let summary = catalog.status_summary();
        if !summary.is_empty() {
            open_table(
                &mut out,
                "Module Status Summary",
                summary.len(),
                &["Status", "Count", "Percentage"],
            );
            let loaded = catalog.loaded.len() as f64;
            for (status, count) in summary {
                let percentage = count as f64 / loaded * 100.0;
                let _ = writeln!(
                    out,
                    "                        <tr><td><span class=\"status-{}\">{}</span></td><td>{}</td><td>{:.1}%</td></tr>",
                    status.as_str().to_lowercase(),
                    status,
                    count,
                    percentage
                );
            }
            close_table(&mut out);
        }

        out
    }
}

impl OutputFormatter for HtmlFormatter {
    fn format_catalog(
        &self,
        catalog: &ModuleCatalog,
        context: &ReportContext,
    ) -> Result<String, InventoryError> {
        let notice = if catalog.addresses_masked() {
            MASKED_NOTICE
        } else {
            ""
        };

        // Sections go in last so module text cannot introduce placeholders.
        let page = TEMPLATE
            .replace("@HOSTNAME@", &escape_html(&context.hostname))
            .replace("@TIMESTAMP@", &escape_html(&context.timestamp()))
            .replace("@RELEASE@", &escape_html(&context.kernel_release))
            .replace("@MACHINE@", &escape_html(&context.machine))
            .replace("@TOOL@", env!("CARGO_PKG_NAME"))
            .replace("@TOTAL@", &catalog.total().to_string())
            .replace("@LOADED@", &catalog.loaded.len().to_string())
            .replace("@BUILTIN@", &catalog.builtin.len().to_string())
            .replace("@UNLOADED@", &catalog.unloaded.len().to_string())
            .replace("@TOTAL_SIZE@", &format_size(catalog.total_loaded_size()))
            .replace("@NOTICE@", notice)
            .replace("@SECTIONS@", &self.sections(catalog));

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BuiltinModule, LoadedModule, ModuleStatus};

    fn module(name: &str, status: ModuleStatus, address: &str) -> LoadedModule {
        LoadedModule::new(name.to_string(), 1024, 0, vec![], status, address.to_string())
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>\"Tom\" & 'Jerry'</b>"),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_report_contents() {
        let mut builtin = BuiltinModule::new("ext4");
        builtin.description = "<script>alert(1)</script>".to_string();
        let catalog = ModuleCatalog {
            loaded: vec![
                module("a", ModuleStatus::Live, "0xffffffffc0a00000"),
                module("b", ModuleStatus::Live, "0xffffffffc0b00000"),
                module("c", ModuleStatus::Live, "0xffffffffc0c00000"),
                module("d", ModuleStatus::Unloading, "0xffffffffc0d00000"),
            ],
            builtin: vec![builtin],
            unloaded: vec![],
        };

        let page = HtmlFormatter
            .format_catalog(&catalog, &ReportContext::new("host<1>", "6.1.0"))
            .unwrap();
        assert!(page.contains("Kernel Modules Report - host&lt;1&gt;"));
        assert!(page.contains("Loadable Kernel Modules (4)"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!page.contains("<script>alert(1)"));
        assert!(page.contains("<td>75.0%</td>"));
        assert!(page.contains("<td>25.0%</td>"));
        assert!(!page.contains("notice-warning\">"));
        assert!(!page.contains("@SECTIONS@"));
        assert!(!page.contains("@HOSTNAME@"));
    }

    #[test]
    fn test_masked_addresses_notice() {
        let catalog = ModuleCatalog {
            loaded: vec![module("a", ModuleStatus::Live, "0x0000000000000000")],
            ..ModuleCatalog::default()
        };
        let page = HtmlFormatter
            .format_catalog(&catalog, &ReportContext::new("h", "r"))
            .unwrap();
        assert!(page.contains("module addresses are masked"));
    }
}
