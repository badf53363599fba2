//! Browser launch.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Driver`] | Launches Firefox and connects to its extension |
//! | [`DriverBuilder`] | Validates binary and extension paths |
//! | [`BrowserOptions`] | Headless, devtools, window size, user agent |
//! | [`Profile`] | Temporary profile with prefs and extension |
//!
//! ```no_run
//! use whatslogged::driver::{BrowserOptions, Driver};
//!
//! # async fn example() -> whatslogged::Result<()> {
//! let driver = Driver::builder()
//!     .binary("/usr/bin/firefox")
//!     .extension("./extension")
//!     .build()?;
//!
//! let browser = driver.launch(&BrowserOptions::new().with_headless()).await?;
//! browser.page().goto("https://web.whatsapp.com").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Initial page handed to Firefox on launch.
pub mod assets;

/// Builder for driver configuration.
pub mod builder;

/// Launch sequence.
pub mod core;

/// Browser launch options.
pub mod options;

/// Temporary profile management.
pub mod profile;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::DriverBuilder;
pub use core::Driver;
pub use options::BrowserOptions;
pub use profile::{ExtensionSource, Profile};
