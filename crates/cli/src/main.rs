//! skript - load a scripts directory, report its diagnostics and run its
//! `on load` triggers, optionally reloading scripts as they change

use anyhow::{Context, Result};
use clap::Parser;
use skript_config::EngineConfig;
use skript_core::ScriptName;
use skript_lang::Engine;
use skript_script::{LoadSummary, ScriptManager, ScriptWatcher};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "skript")]
#[command(about = "Load and run a directory of scripts")]
struct Cli {
    /// Config file path (defaults to ./skript.conf when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print load summaries as JSON
    #[arg(long)]
    json: bool,

    /// Reload scripts when they change
    #[arg(short, long)]
    watch: bool,

    /// Scripts directory, overriding the configured one
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<(EngineConfig, Option<String>)> {
    match &cli.config {
        Some(path) => {
            let config = EngineConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Ok((config, None))
        }
        None => match EngineConfig::load_default() {
            Ok(config) => Ok((config, None)),
            Err(e) => Ok((
                EngineConfig::default(),
                Some(format!("No {} loaded ({}), using defaults", skript_config::DEFAULT_CONFIG_FILE, e)),
            )),
        },
    }
}

fn report(summary: &LoadSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        summary.log();
    }
    Ok(())
}

/// Fire an event into the triggers of `scripts` (all when `None`) and
/// print what they emitted
fn run_event(manager: &ScriptManager, name: &str, scripts: Option<&[ScriptName]>, json: bool) {
    let event = manager.event(name);
    let ran = match scripts {
        Some(scripts) => manager.fire_in(&event, scripts),
        None => manager.fire(&event),
    };
    info!("'{}' ran {} triggers", name, ran);
    if !json {
        for line in event.take_output() {
            println!("{}", line);
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (mut config, config_note) = load_config(&cli)?;
    if let Some(dir) = &cli.dir {
        config.scripts_dir = dir.clone();
    }
    config.watch |= cli.watch;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Some(note) = config_note {
        warn!("{}", note);
    }
    config.display();

    let scripts_dir = std::fs::canonicalize(&config.scripts_dir)
        .with_context(|| format!("Scripts directory {} not found", config.scripts_dir.display()))?;
    let engine = Engine::with_defaults(config.clone()).context("Failed to set up the engine")?;
    let manager = ScriptManager::with_dir(engine, &scripts_dir)?;

    let summary = manager.load_all().await?;
    report(&summary, cli.json)?;
    run_event(&manager, "load", None, cli.json);

    if !config.watch {
        let stats = manager.engine().stats().snapshot();
        info!("Parsed {} lines ({} failed)", stats.lines, stats.failed);
        return Ok(if summary.has_errors() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let mut watcher = ScriptWatcher::new(&scripts_dir, manager.engine().config())?;
    loop {
        tokio::select! {
            batch = watcher.next_batch() => {
                let Some(paths) = batch else {
                    warn!("File watcher stopped");
                    break;
                };
                let summary = manager.apply_changes(&paths).await;
                report(&summary, cli.json)?;
                if !summary.loaded.is_empty() {
                    run_event(&manager, "load", Some(&summary.loaded), cli.json);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    manager.unload_all();
    Ok(ExitCode::SUCCESS)
}
