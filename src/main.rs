//! Main entry point for kmodlist
use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Duration;

use kmodlist::cli::args::Cli;
use kmodlist::config::{InventoryConfig, KernelPaths};
use kmodlist::error::InventoryError;
use kmodlist::filter::{sort_catalog, ModuleFilter};
use kmodlist::formats::traits::{OutputDestination, OutputWriter, ReportContext};
use kmodlist::inventory::Inventory;
use kmodlist::kernel::ModuleCatalog;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<InventoryError>()
                .map_or(1, InventoryError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Errors only by default; `-v` shows warnings and progress, `--debug` everything.
/// `RUST_LOG` overrides both.
fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Error
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn build_filter(cli: &Cli) -> ModuleFilter {
    ModuleFilter {
        name_pattern: cli.name.clone(),
        min_size: cli.min_size,
        max_size: cli.max_size,
        min_refs: cli.min_refs,
        status: cli.status.map(Into::into),
    }
}

fn print_counts(catalog: &ModuleCatalog, quiet: bool) {
    if quiet {
        println!(
            "{} {} {} {}",
            catalog.loaded.len(),
            catalog.builtin.len(),
            catalog.unloaded.len(),
            catalog.total()
        );
        return;
    }
    println!("Loaded modules:   {}", catalog.loaded.len());
    println!("Builtin modules:  {}", catalog.builtin.len());
    println!("Unloaded modules: {}", catalog.unloaded.len());
    println!("Total:            {}", catalog.total());
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if let (Some(min), Some(max)) = (cli.min_size, cli.max_size) {
        if min > max {
            return Err(InventoryError::InvalidArgument(format!(
                "--min-size {} is larger than --max-size {}",
                min, max
            ))
            .into());
        }
    }
    let filter = build_filter(cli)
        .compile()
        .context("Invalid module filter")?;

    let paths = KernelPaths::detect(&cli.root, cli.kernel_release.as_deref());
    let mut config = InventoryConfig::new(paths);
    config.external_tools = !cli.no_external_tools;
    config.include_builtin = cli.include_builtin();
    config.include_unloaded = cli.include_unloaded();
    config.resolve_details = cli.detailed;
    debug!("{:?}", config);

    let progress = spinner(cli.quiet);
    let mut inventory = Inventory::new(config.clone());
    let result = inventory.build_with_progress(|stage| progress.set_message(stage.to_string()));
    progress.finish_and_clear();
    let catalog = result.with_context(|| {
        format!(
            "Cannot list kernel modules from {}",
            config.paths.proc_modules.display()
        )
    })?;

    let mut catalog = filter.apply_catalog(&catalog);
    sort_catalog(&mut catalog, cli.sort.into(), cli.reverse);

    if cli.count {
        print_counts(&catalog, cli.quiet);
        return Ok(());
    }

    let mut context = ReportContext::detect(&cli.root, &config.paths.release);
    context.detailed = cli.detailed;
    context.quiet = cli.quiet;

    let destination = match &cli.output {
        Some(path) => OutputDestination::File(path.clone()),
        None => OutputDestination::Stdout,
    };
    OutputWriter::new(cli.format.into(), destination)
        .write_catalog(&catalog, &context)
        .context("Failed to write report")?;

    if let Some(path) = &cli.output {
        if !cli.quiet {
            eprintln!("Report written to {}", path.display());
        }
    }
    Ok(())
}
