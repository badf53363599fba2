//! Runtime configuration.
//!
//! Configuration comes from three places: compiled-in [`Timings`], the
//! process environment ([`RunMode`], log level) and command-line flags
//! (browser and extension paths, diagnostics toggles). [`Settings`] is the
//! assembled result handed to [`crate::controller::SessionController`].
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `WHATSLOGGED_ENV` | `production` runs headless; anything else is visible with devtools |
//! | `LOG_LEVEL` | Tracing filter directive, default `info` |

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Fixed URL of the host web application.
pub const HOST_URL: &str = "https://web.whatsapp.com";

/// User agent presented to the host application.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/77.0.3865.120 Safari/537.36";

/// Environment variable selecting the run mode.
pub const ENV_MODE: &str = "WHATSLOGGED_ENV";

/// Environment variable holding the log filter.
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Application directory name under the platform data directory.
const APP_DIR_NAME: &str = "whatslogged";

/// Session snapshot file name.
const SESSION_FILE_NAME: &str = "session.json";

/// Chat log root directory name.
const CHAT_DIR_NAME: &str = "chats";

/// Log directory name (relative to the working directory).
const LOG_DIR_NAME: &str = "logs";

// ============================================================================
// RunMode
// ============================================================================

/// Selects how the browser is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Headless browser, no devtools.
    Production,
    /// Visible browser with devtools attached.
    #[default]
    Development,
}

impl RunMode {
    /// Reads the mode from [`ENV_MODE`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENV_MODE).ok().as_deref())
    }

    /// Parses a raw mode value.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// Returns `true` in production mode.
    #[inline]
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

// ============================================================================
// Timings
// ============================================================================

/// Every interval and timeout used by the state machines.
///
/// `Default` holds the production values; tests shrink them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// How often the pairing element is polled.
    pub pairing_poll: Duration,
    /// Subtracted from the host's give-up wait to form the pairing deadline.
    pub expiration_margin: Duration,
    /// How often login markers are polled after the code disappears.
    pub login_poll: Duration,
    /// How long to wait for login markers after the code disappears.
    pub login_timeout: Duration,
    /// How often the host module registry is probed for readiness.
    pub ready_poll: Duration,
    /// How long the host may take to expose its message module.
    pub ready_timeout: Duration,
    /// Delay before the first liveness check.
    pub monitor_first_check: Duration,
    /// Interval between liveness checks.
    pub monitor_interval: Duration,
    /// How often captured messages are drained from the page.
    pub hook_drain: Duration,
    /// Maximum wait for the browser to close before exiting.
    pub graceful_close: Duration,
    /// Maximum wait for DOMContentLoaded after a reload.
    pub reload_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pairing_poll: Duration::from_millis(500),
            expiration_margin: Duration::from_secs(3),
            login_poll: Duration::from_millis(100),
            login_timeout: Duration::from_secs(10),
            ready_poll: Duration::from_millis(50),
            ready_timeout: Duration::from_secs(30),
            monitor_first_check: Duration::from_secs(30),
            monitor_interval: Duration::from_secs(60),
            hook_drain: Duration::from_millis(250),
            graceful_close: Duration::from_secs(5),
            reload_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// AppPaths
// ============================================================================

/// Filesystem locations owned by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Application data directory.
    pub data_dir: PathBuf,
    /// Root of per-sender chat directories.
    pub chat_dir: PathBuf,
    /// Directory for application log files.
    pub log_dir: PathBuf,
    /// Persisted session snapshot.
    pub session_file: PathBuf,
}

impl AppPaths {
    /// Lays out paths under `data_dir`.
    #[must_use]
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            chat_dir: data_dir.join(CHAT_DIR_NAME),
            session_file: data_dir.join(SESSION_FILE_NAME),
            log_dir: PathBuf::from(LOG_DIR_NAME),
            data_dir,
        }
    }

    /// Uses the platform data directory, falling back to `./data`.
    #[must_use]
    pub fn platform_default() -> Self {
        let base = dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::under(base)
    }

    /// Creates every directory that must exist before startup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a directory cannot be created.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.chat_dir, &self.log_dir] {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

/// Directory holding everything received from `sender`.
///
/// The identity is URL-encoded, so separators and dot segments stay inside
/// `chat_root`.
#[must_use]
pub fn sender_dir(chat_root: &Path, sender: &str) -> PathBuf {
    chat_root.join(format!("+{}", urlencoding::encode(sender)))
}

/// Creates `dir` and its parents when missing.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(Error::Io)?;
        debug!(path = %dir.display(), "Created directory");
    }
    Ok(())
}

// ============================================================================
// Settings
// ============================================================================

/// Fully assembled runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Headless or visible.
    pub mode: RunMode,
    /// Filesystem layout.
    pub paths: AppPaths,
    /// Intervals and timeouts.
    pub timings: Timings,
    /// Firefox binary.
    pub browser_binary: PathBuf,
    /// Automation extension (directory or `.xpi`).
    pub extension: PathBuf,
    /// Capture a screenshot when a page-related check fails.
    pub screenshot_on_check: bool,
    /// Dump extension logs when a page-related check fails.
    pub dump_browser_logs: bool,
    /// Maximum consecutive reload attempts before giving up.
    pub recovery_ceiling: u32,
}

impl Settings {
    /// Default recovery ceiling.
    pub const DEFAULT_RECOVERY_CEILING: u32 = 3;

    /// Creates settings with production timings and the given browser.
    #[must_use]
    pub fn new(browser_binary: impl Into<PathBuf>, extension: impl Into<PathBuf>) -> Self {
        Self {
            mode: RunMode::from_env(),
            paths: AppPaths::platform_default(),
            timings: Timings::default(),
            browser_binary: browser_binary.into(),
            extension: extension.into(),
            screenshot_on_check: false,
            dump_browser_logs: false,
            recovery_ceiling: Self::DEFAULT_RECOVERY_CEILING,
        }
    }

    /// Overrides the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let log_dir = self.paths.log_dir.clone();
        self.paths = AppPaths::under(dir);
        self.paths.log_dir = log_dir;
        self
    }

    /// Enables screenshots on failed checks.
    #[must_use]
    pub fn with_screenshots(mut self, enabled: bool) -> Self {
        self.screenshot_on_check = enabled;
        self
    }

    /// Enables extension log dumps on failed checks.
    #[must_use]
    pub fn with_browser_log_dump(mut self, enabled: bool) -> Self {
        self.dump_browser_logs = enabled;
        self
    }

    /// Directory for diagnostic artifacts (screenshots, log dumps).
    #[must_use]
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.paths.data_dir.join("diagnostics")
    }
}

/// Returns the log filter directive from [`ENV_LOG_LEVEL`].
#[must_use]
pub fn log_level_from_env() -> String {
    std::env::var(ENV_LOG_LEVEL)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

// ============================================================================
// Tests
// ============================================================================
