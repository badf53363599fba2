//! Browser launch options.
//!
//! Command-line flags go to the Firefox process; the user agent is written
//! into the profile as a preference because Firefox has no flag for it.
//!
//! ```ignore
//! use whatslogged::driver::BrowserOptions;
//!
//! let options = BrowserOptions::new()
//!     .with_headless()
//!     .with_window_size(1280, 900);
//!
//! assert_eq!(options.to_args(), ["--headless", "--window-size", "1280,900"]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::config::{RunMode, USER_AGENT};

// ============================================================================
// BrowserOptions
// ============================================================================

/// How the browser is launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserOptions {
    /// Run without a GUI.
    pub headless: bool,

    /// Open developer tools on startup.
    pub devtools: bool,

    /// Window dimensions in pixels (width, height).
    pub window_size: Option<(u32, u32)>,

    /// Overrides `navigator.userAgent`.
    pub user_agent: Option<String>,

    /// Additional command-line arguments.
    pub extra_args: Vec<String>,
}

// ============================================================================
// Constructors
// ============================================================================

impl BrowserOptions {
    /// Creates options with every flag off.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headless: false,
            devtools: false,
            window_size: None,
            user_agent: None,
            extra_args: Vec::new(),
        }
    }

    /// Options for the host application in the given mode.
    ///
    /// Production runs headless; development is visible with devtools.
    /// Both present the desktop user agent the host expects.
    #[must_use]
    pub fn for_mode(mode: RunMode) -> Self {
        let options = Self::new().with_user_agent(USER_AGENT);
        if mode.is_production() {
            options.with_headless()
        } else {
            options.with_devtools()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BrowserOptions {
    /// Enables headless mode.
    #[inline]
    #[must_use]
    pub fn with_headless(mut self) -> Self {
        self.headless = true;
        self
    }

    /// Opens developer tools.
    #[inline]
    #[must_use]
    pub fn with_devtools(mut self) -> Self {
        self.devtools = true;
        self
    }

    /// Sets the window size.
    #[inline]
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    /// Overrides the user agent.
    #[inline]
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Appends a raw command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

// ============================================================================
// Conversion
// ============================================================================

impl BrowserOptions {
    /// Converts to Firefox command-line arguments.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.headless {
            args.push("--headless".to_string());
        }

        if let Some((width, height)) = self.window_size {
            args.push("--window-size".to_string());
            args.push(format!("{width},{height}"));
        }

        // Devtools cannot attach to a headless window.
        if self.devtools && !self.headless {
            args.push("--devtools".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_no_args() {
        assert!(BrowserOptions::new().to_args().is_empty());
    }

    #[test]
    fn test_production_mode_is_headless() {
        let options = BrowserOptions::for_mode(RunMode::Production);
        assert_eq!(options.to_args(), vec!["--headless".to_string()]);
        assert_eq!(options.user_agent.as_deref(), Some(USER_AGENT));
    }

    #[test]
    fn test_development_mode_opens_devtools() {
        let options = BrowserOptions::for_mode(RunMode::Development);
        assert!(!options.headless);
        assert!(options.to_args().contains(&"--devtools".to_string()));
    }

    #[test]
    fn test_window_size_and_extra_args() {
        let args = BrowserOptions::new()
            .with_window_size(1280, 900)
            .with_arg("--safe-mode")
            .to_args();
        assert_eq!(args, ["--window-size", "1280,900", "--safe-mode"]);
    }

    #[test]
    fn test_devtools_dropped_when_headless() {
        let args = BrowserOptions::new().with_headless().with_devtools().to_args();
        assert_eq!(args, ["--headless"]);
    }
}
