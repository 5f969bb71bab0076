//! screen-coordinator - Screen Composition Coordinator
//!
//! Entry point for the coordinator binary: replays a scenario against a fresh
//! coordinator and prints the resulting state as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use screen_coordinator::config::{Config, LoggingConfig};
use screen_coordinator::coordinator::ScreenCoordinator;
use screen_coordinator::scenario::{Scenario, ScenarioRunner};
use screen_coordinator::utils::format_user_error;

/// Command-line arguments for screen-coordinator
#[derive(Parser, Debug)]
#[command(name = "screen-coordinator")]
#[command(version, about = "Screen identity and composition coordinator", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "SCREEN_COORDINATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scenario file to replay
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, load_error) = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default_config()?, Some(e)),
        },
        None => (Config::default_config()?, None),
    };
    let config = config.with_overrides(args.log_format.clone(), args.verbose);

    let _log_guard = init_logging(&config.logging, args.log_file.as_ref())?;

    info!("════════════════════════════════════════════════════════");
    info!("  screen-coordinator v{}", env!("CARGO_PKG_VERSION"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Some(e) = load_error {
        warn!("Failed to load config: {:#}, using defaults", e);
    }
    tracing::debug!("Config: {:?}", config);

    let coordinator = ScreenCoordinator::from_config(&config);

    let mut events = coordinator.subscribe();
    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(event = event.name(), "{:?}", event);
        }
    });

    let outcome = run(&coordinator, &args);
    coordinator.flush_notifications();
    drop(coordinator);

    if event_log.await.is_err() {
        warn!("Event log task ended abnormally");
    }

    if let Err(e) = outcome {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }

    info!("screen-coordinator finished");
    Ok(())
}

fn run(coordinator: &ScreenCoordinator, args: &Args) -> Result<()> {
    let summary = match &args.scenario {
        Some(path) => {
            let scenario = Scenario::load(path)?;
            info!("Replaying {} steps from {}", scenario.steps.len(), path.display());
            Some(ScenarioRunner::new(coordinator).run(&scenario)?)
        }
        None => {
            info!("No scenario given, reporting initial state");
            None
        }
    };

    let report = serde_json::json!({
        "replay": summary,
        "state": coordinator.snapshot(),
    });
    let rendered = serde_json::to_string_pretty(&report).context("Failed to render state")?;
    println!("{}", rendered);
    Ok(())
}

fn fmt_layer<W>(format: &str, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        "json" => layer.json().boxed(),
        "compact" => layer.compact().boxed(),
        _ if ansi => layer.pretty().boxed(),
        _ => layer.boxed(),
    }
}

fn init_logging(logging: &LoggingConfig, log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    use std::fs::File;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "screen_coordinator={level},warn",
            level = logging.level
        ))
    });

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(&logging.format, std::io::stderr, true)];

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        layers.push(fmt_layer(&logging.format, std::sync::Mutex::new(file), false));
    }

    let mut guard = None;
    if let Some(dir) = &logging.log_dir {
        let appender = tracing_appender::rolling::daily(dir, "screen-coordinator.log");
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(&logging.format, writer, false));
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    if let Some(path) = log_file {
        info!("Logging to file: {}", path.display());
    }
    if let Some(dir) = &logging.log_dir {
        info!("Logging to directory: {}", dir.display());
    }

    Ok(guard)
}
