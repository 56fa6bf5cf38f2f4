use anyhow::{Context, Result};
use clap::Parser;
use rastro::cli::{Cli, Command, OutputFormat};
use rastro::config::TraceConfig;
use rastro::export::{self, ExportOutcome};
use rastro::layout::assign_levels;
use rastro::persistence::load_graph;
use rastro::registry::validate_target_path;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load(path: &Path) -> Result<rastro::ProvenanceGraph> {
    load_graph(path).with_context(|| format!("failed to load graph {}", path.display()))
}

fn print_levels(path: &Path, format: OutputFormat) -> Result<()> {
    let graph = load(path)?;
    let levels = assign_levels(&graph);
    match format {
        OutputFormat::Text => {
            for (level, ids) in levels.layers().iter().enumerate() {
                println!("{}: {}", level, ids.join(", "));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&levels)?);
        }
    }
    Ok(())
}

fn render(path: &Path, out: &Path) -> Result<()> {
    let graph = load(path)?;
    match export::render(&graph, out)
        .with_context(|| format!("failed to write {}", out.display()))?
    {
        ExportOutcome::Written => println!("Wrote {}", out.display()),
        ExportOutcome::SkippedExisting => println!("{} already exists; not rendered", out.display()),
        ExportOutcome::SkippedEmpty => println!("Graph is empty; nothing rendered"),
    }
    Ok(())
}

fn check_config(path: &Path, list: &str) -> Result<()> {
    let config = TraceConfig::from_path(path, list)?;
    let mut invalid = 0;
    for target in &config.targets {
        match validate_target_path(target) {
            Ok(()) => println!("ok       {}", target),
            Err(e) => {
                invalid += 1;
                println!("invalid  {} ({})", target, e);
            }
        }
    }
    for entry in &config.malformed {
        println!("skipped  {}", entry);
    }
    match config.unique_calls {
        Some(unique) => println!("unique_calls: {}", unique),
        None => println!("unique_calls: unset"),
    }
    println!(
        "{} targets, {} invalid, {} malformed entries",
        config.targets.len(),
        invalid,
        config.malformed.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match args.command {
        Command::Summary { graph } => {
            print!("{}", export::summary(&load(&graph)?));
            Ok(())
        }
        Command::Levels { graph, format } => print_levels(&graph, format),
        Command::Render { graph, out } => render(&graph, &out),
        Command::CheckConfig { config, list } => check_config(&config, &list),
    }
}
