// # -----------------------------
// # crates/cli/src/main.rs
// # -----------------------------
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use guesthost_cli::{load_scenario, Runner};
use guesthost_common::config::CONFIG_ENV;
use guesthost_common::{load_config, OrchestratorConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "guesthost-sim",
    version,
    about = "Replays a navigation scenario against the guest task orchestrator"
)]
struct Cli {
    /// Scenario file (JSON): component catalog plus ordered steps
    #[arg(long, value_name = "FILE")]
    scenario: PathBuf,
    /// Orchestrator config (TOML). Falls back to $GUESTHOST_CONFIG, then defaults.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,
    /// Log level (trace, debug, info, warn, error, off). Overrides RUST_LOG if set.
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

fn init_logging(log_level: Option<&str>) -> Result<()> {
    let filter = if let Some(level) = log_level {
        match level.to_lowercase().as_str() {
            "off" => EnvFilter::new("off"),
            "error" => EnvFilter::new("error"),
            "warn" | "warning" => EnvFilter::new("warn"),
            "info" => EnvFilter::new("info"),
            "debug" => EnvFilter::new("debug"),
            "trace" => EnvFilter::new("trace"),
            _ => {
                eprintln!("Warning: Invalid log level '{}', using 'info'", level);
                EnvFilter::new("info")
            }
        }
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn resolve_config(explicit: Option<PathBuf>) -> Result<OrchestratorConfig> {
    let path = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => load_config(&path).with_context(|| format!("load config {}", path.display())),
        None => Ok(OrchestratorConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug {
        Some("debug")
    } else {
        cli.log_level.as_deref()
    };
    init_logging(level)?;
    tracing::debug!("CLI arguments: {:?}", cli);

    let config = resolve_config(cli.config.clone())?;
    let scenario = load_scenario(&cli.scenario)?;
    tracing::info!(
        steps = scenario.steps.len(),
        components = scenario.components.len(),
        "scenario loaded"
    );

    let report = Runner::new(config, &scenario).run(&scenario.steps).await?;
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");

    if report.steps.iter().any(|s| s.status < 0) {
        std::process::exit(1);
    }
    Ok(())
}
