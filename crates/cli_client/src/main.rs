//! Dunebugger terminal
//! Operator console for a remote dunebugger core over NATS

mod console;
mod input;
mod nats;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dunebugger_core::transport::Broker;
use dunebugger_core::version::load_version_info;
use dunebugger_core::{ConnectionManager, ReplyRouter, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use console::Console;
use input::InputWorker;
use nats::NatsBroker;
use session::InteractiveSession;

/// How often startup checks whether the broker session is up
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "dunebugger-terminal")]
#[command(about = "Interactive terminal for the dunebugger core", long_about = None)]
struct Args {
    /// Settings file
    #[arg(short, long, default_value = "config/dunebugger.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Command history file
    #[arg(long)]
    history: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;

    let log_level = args.log_level.as_deref().unwrap_or(&settings.log_level);
    setup_logging(log_level)?;

    info!("Dunebugger terminal v{}", env!("CARGO_PKG_VERSION"));

    let broker: Arc<dyn Broker> = Arc::new(NatsBroker::new());
    let (manager, inbound_rx) = ConnectionManager::new(broker, &settings);
    let manager = Arc::new(manager);

    let console = Arc::new(Console::new(settings.commands.clone()));
    let workdir = std::env::current_dir().context("Failed to resolve working directory")?;
    let version = load_version_info(settings.client_id(), &workdir);
    info!("Version {}", version.full_version);

    let router = ReplyRouter::new(manager.clone(), console.clone(), version);
    let router_task = tokio::spawn(router.run(inbound_rx));

    manager.start_listener();

    let interrupt = watch_interrupts();
    let session = InteractiveSession::new(manager.clone(), console.clone());
    let connected = tokio::select! {
        _ = manager.wait_connected(CONNECT_POLL_INTERVAL) => true,
        _ = interrupt.cancelled() => false,
    };

    if connected {
        if !session.request_commands_list().await {
            warn!("Command list request not sent");
        }

        let history = args.history.or_else(|| settings.history_path());
        let mut terminal = InputWorker::spawn(move || input::open_terminal(history))
            .context("Failed to start terminal input")?;
        session.terminal_listen(&mut terminal, &interrupt).await;
        if interrupt.is_cancelled() {
            // The input thread may sit in a blocking read; leave it behind
            warn!("Interrupted, command history not saved");
        } else {
            terminal.close().await;
        }
    } else {
        info!("Interrupted before the broker connection came up");
    }

    // Ctrl-C from here on exits at once
    interrupt.cancel();
    println!("Cleaning up resources...");
    manager.close_listener().await;
    router_task.abort();
    let _ = router_task.await;
    println!("Cleanup completed.");

    Ok(())
}

/// Turn Ctrl-C into a cancellation for the whole run
///
/// A second Ctrl-C exits immediately.
fn watch_interrupts() -> CancellationToken {
    let interrupt = CancellationToken::new();
    let token = interrupt.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if token.is_cancelled() {
                eprintln!("Interrupted again, exiting.");
                std::process::exit(130);
            }
            token.cancel();
        }
    });
    interrupt
}

/// Parse a log level, accepting the core's level names
fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_uppercase().as_str() {
        "WARNING" => Some(Level::WARN),
        "CRITICAL" => Some(Level::ERROR),
        other => other.parse::<Level>().ok(),
    }
}

/// Setup logging with tracing
fn setup_logging(level: &str) -> Result<()> {
    let parsed = parse_level(level);
    let log_level = parsed.unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install log subscriber")?;

    if parsed.is_none() {
        warn!("Unknown log level {:?}, using info", level);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["dunebugger-terminal"]);
        assert_eq!(args.config, PathBuf::from("config/dunebugger.toml"));
        assert!(args.log_level.is_none());
        assert!(args.history.is_none());
    }

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("INFO"), Some(Level::INFO));
        assert_eq!(parse_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level("CRITICAL"), Some(Level::ERROR));
        assert_eq!(parse_level("error"), Some(Level::ERROR));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "dunebugger-terminal",
            "-c",
            "/etc/dunebugger.toml",
            "-l",
            "debug",
            "--history",
            "/tmp/h",
        ]);
        assert_eq!(args.config, PathBuf::from("/etc/dunebugger.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.history, Some(PathBuf::from("/tmp/h")));
    }
}
