//! Builder for [`Driver`].

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use crate::error::{Error, Result};

use super::core::Driver;
use super::profile::ExtensionSource;

// ============================================================================
// DriverBuilder
// ============================================================================

/// Collects and validates the browser binary and extension paths.
#[derive(Debug, Default, Clone)]
pub struct DriverBuilder {
    /// Path to Firefox binary.
    binary: Option<PathBuf>,
    /// Extension directory or archive.
    extension: Option<PathBuf>,
}

impl DriverBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Firefox binary.
    #[inline]
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Sets the automation extension (directory or `.xpi`).
    #[inline]
    #[must_use]
    pub fn extension(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension = Some(path.into());
        self
    }

    /// Validates both paths and builds the driver.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if either path is unset or the extension is missing
    /// - [`Error::BrowserNotFound`] if the binary does not exist
    pub fn build(self) -> Result<Driver> {
        let binary = self
            .binary
            .ok_or_else(|| Error::config("Firefox binary path is required"))?;
        if !binary.exists() {
            return Err(Error::browser_not_found(binary));
        }

        let extension = self
            .extension
            .ok_or_else(|| Error::config("Automation extension path is required"))?;
        if !extension.exists() {
            return Err(Error::config(format!(
                "Extension not found at: {}",
                extension.display()
            )));
        }

        Ok(Driver::new(binary, ExtensionSource::from(extension)))
    }
}

// ============================================================================
// Tests
// ============================================================================
