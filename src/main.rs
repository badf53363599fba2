//! whatslogged command-line entry point.
//!
//! Usage:
//!   whatslogged --extension ./extension.xpi
//!   WHATSLOGGED_ENV=production LOG_LEVEL=debug whatslogged --screenshots

// ============================================================================
// Imports
// ============================================================================

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use whatslogged::config::log_level_from_env;
use whatslogged::{Settings, controller};

// ============================================================================
// Constants
// ============================================================================

const APP_LOG: &str = "app.log";
const ERROR_LOG: &str = "error.log";

/// Executable names tried when `--browser` is not given.
const BROWSER_CANDIDATES: &[&str] = &["firefox", "firefox-esr", "firefox-nightly"];

// ============================================================================
// CLI
// ============================================================================

/// Logs incoming messages of a paired messaging web session.
#[derive(Parser, Debug)]
#[command(name = "whatslogged", version, about)]
struct Cli {
    /// Firefox binary; searched on PATH when omitted
    #[arg(long)]
    browser: Option<PathBuf>,

    /// Automation extension directory or .xpi
    #[arg(long, default_value = "./extension")]
    extension: PathBuf,

    /// Data directory for the session file and chat logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Save a screenshot when a page-related check fails
    #[arg(long)]
    screenshots: bool,

    /// Dump extension logs when a page-related check fails
    #[arg(long)]
    dump_browser_logs: bool,
}

impl Cli {
    fn into_settings(self) -> Settings {
        let browser = self
            .browser
            .or_else(find_browser)
            .unwrap_or_else(|| PathBuf::from(BROWSER_CANDIDATES[0]));

        let mut settings = Settings::new(browser, self.extension)
            .with_screenshots(self.screenshots)
            .with_browser_log_dump(self.dump_browser_logs);
        if let Some(dir) = self.data_dir {
            settings = settings.with_data_dir(dir);
        }
        settings
    }
}

/// First candidate executable found on `PATH`.
fn find_browser() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| BROWSER_CANDIDATES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// Logging
// ============================================================================

fn open_log(dir: &Path, name: &str) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new().create(true).append(true).open(dir.join(name))
}

/// Console plus `app.log` (every level) and `error.log` (errors only).
///
/// Falls back to console only if the log files cannot be opened.
fn init_logging(log_dir: &Path, level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    let files = open_log(log_dir, APP_LOG).and_then(|app| Ok((app, open_log(log_dir, ERROR_LOG)?)));
    match files {
        Ok((app, errors)) => {
            let app = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(app));
            let errors = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(errors))
                .with_filter(LevelFilter::ERROR);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(app)
                .with(errors)
                .init();
        }
        Err(e) => {
            tracing_subscriber::registry().with(filter).with(console).init();
            warn!(error = %e, path = %log_dir.display(), "Cannot open log files, logging to console only");
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let settings = Cli::parse().into_settings();
    let level = log_level_from_env();
    init_logging(&settings.paths.log_dir, &level);

    let cwd = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = %cwd,
        mode = ?settings.mode,
        log_level = %level,
        "Starting whatslogged"
    );
    info!(
        browser = %settings.browser_binary.display(),
        data_dir = %settings.paths.data_dir.display(),
        "Using paths"
    );

    std::process::exit(controller::run(settings).await);
}
