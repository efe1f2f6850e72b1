//! lvfs-bench - layer-count scaling benchmark for layered filesystem mounters.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lvfs_bench::{
    cli::{Cli, USAGE},
    config::BenchConfig,
    mount::MountController,
    results::export_json,
    sampler::MetadataSampler,
    Experiment,
};
use lvfs_mount::SystemRunner;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("{USAGE}");
            if let Some(reason) = e.to_string().lines().next() {
                eprintln!("{reason}");
            }
            std::process::exit(2);
        }
    };

    // Respect RUST_LOG if set, otherwise use default based on verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });

    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .with(filter)
        .init();

    let color = !cli.no_color && std::io::IsTerminal::is_terminal(&std::io::stdout());
    let config = cli.into_config();
    print_banner(&config, color);

    let runner = SystemRunner::new(config.mounter_output());
    let controller = MountController::new(runner, config.mount_settings());
    let sampler = MetadataSampler::new(&config.drive.root(), config.num_files);

    let experiment = Experiment::new(
        config.plan(),
        config.fixture(),
        controller,
        sampler,
        config.output.clone(),
    )
    .with_progress(progress_bar());

    let summary = experiment.run().context("Benchmark run failed")?;

    if summary.failed_lookups > 0 {
        tracing::warn!(
            "{} lookups failed through the mount; affected samples are not meaningful",
            summary.failed_lookups
        );
    }

    if let Some(path) = &config.json {
        export_json(&summary, &config, path).context("Failed to export JSON")?;
        println!("Results exported to: {}", path.display());
    }

    println!(
        "Wrote {} rows to {}",
        summary.rows.len(),
        summary.output.display()
    );
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} cycles ({msg})")
    {
        bar.set_style(style);
    }
    bar
}

/// Print a compact one-line banner with configuration summary.
fn print_banner(config: &BenchConfig, color: bool) {
    use owo_colors::OwoColorize;

    let mode = if config.probe.is_some() { "probe" } else { "fixed settle" };
    let summary = format!(
        "{} layers x {} files x {} samples on {} ({} mode)",
        config.max_layers, config.num_files, config.num_samples, config.drive, mode
    );

    println!();
    if color {
        println!("{}: {}", "lvfs-bench".cyan().bold(), summary);
    } else {
        println!("lvfs-bench: {summary}");
    }
    println!();
}
