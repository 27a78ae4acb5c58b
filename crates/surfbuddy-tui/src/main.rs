use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use surfbuddy_core::{
    ConfigStore, ControllerOptions, FileStorage, KeyValueStorage, MemoryStorage, OllamaClient,
};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const DEFAULT_LOG_ENV: &str = "info";

#[derive(Parser)]
#[command(name = "surfbuddy")]
#[command(version, about = "Chat with a local Ollama server from the terminal")]
struct Cli {
    /// Storage file holding the saved Ollama configuration
    #[arg(long, env = "SURFBUDDY_STORAGE")]
    storage: Option<PathBuf>,

    /// Keep the configuration in memory only
    #[arg(long, env = "SURFBUDDY_EPHEMERAL", conflicts_with = "storage")]
    ephemeral: bool,

    /// Log file (defaults to the platform data directory)
    #[arg(long, env = "SURFBUDDY_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Quiet period after the last URL edit before probing the server
    #[arg(long, env = "SURFBUDDY_DEBOUNCE_MS", default_value_t = 500)]
    debounce_ms: u64,

    /// Allow saving even when nothing changed since the last save
    #[arg(long, env = "SURFBUDDY_NO_CHANGE_DETECTION")]
    no_change_detection: bool,
}

fn default_log_file() -> Result<PathBuf> {
    let dir = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(dir.join("surfbuddy").join("surfbuddy.log"))
}

/// Logs go to a file; the terminal belongs to the UI.
fn setup_tracing(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("opening log file {}", log_file.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_ENV.into()),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(())
}

fn open_storage(cli: &Cli) -> Result<Arc<dyn KeyValueStorage>> {
    if cli.ephemeral {
        return Ok(Arc::new(MemoryStorage::new()));
    }
    let path = match &cli.storage {
        Some(path) => path.clone(),
        None => FileStorage::default_path()?,
    };
    let storage = FileStorage::new(path);
    tracing::info!(path = %storage.path().display(), "using storage file");
    Ok(Arc::new(storage))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.log_file {
        Some(path) => path.clone(),
        None => default_log_file()?,
    };
    setup_tracing(&log_file)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "surfbuddy starting");

    let store = ConfigStore::new(open_storage(&cli)?);
    let options = ControllerOptions {
        debounce: Duration::from_millis(cli.debounce_ms),
        change_detection: !cli.no_change_detection,
    };

    // Install panic hook before entering TUI mode
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(store, Arc::new(OllamaClient::new()), options, events.sender()).await;

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    tracing::info!("surfbuddy exiting");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
