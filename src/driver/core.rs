//! Browser launcher.
//!
//! [`Driver::launch`] runs the whole local-end startup sequence:
//!
//! 1. Bind a localhost WebSocket server
//! 2. Prepare a temporary profile with the extension and preferences
//! 3. Spawn Firefox with the init data URI
//! 4. Wait for the extension to connect and send READY

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::browser::Browser;
use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TabId};
use crate::transport::PendingServer;

use super::assets;
use super::builder::DriverBuilder;
use super::options::BrowserOptions;
use super::profile::{ExtensionSource, Profile};

// ============================================================================
// Driver
// ============================================================================

/// Validated browser binary and extension, ready to launch.
#[derive(Clone)]
pub struct Driver {
    /// Path to the Firefox binary.
    binary: PathBuf,
    /// Automation extension.
    extension: ExtensionSource,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("binary", &self.binary)
            .field("extension", &self.extension.path())
            .finish()
    }
}

impl Driver {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    /// Creates a driver from already-validated paths.
    pub(crate) fn new(binary: PathBuf, extension: ExtensionSource) -> Self {
        Self { binary, extension }
    }

    /// Returns the Firefox binary path.
    #[inline]
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Launches Firefox and waits for the extension to connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Profile`] if the profile cannot be prepared
    /// - [`Error::ProcessLaunchFailed`] if Firefox cannot be spawned
    /// - [`Error::ConnectionTimeout`] if the extension never connects
    pub async fn launch(&self, options: &BrowserOptions) -> Result<Browser> {
        let server = PendingServer::bind_localhost().await?;
        let profile = Profile::prepare(&self.extension, options)?;

        let session_id = SessionId::next();
        let data_uri = assets::build_init_data_uri(&server.ws_url(), session_id);

        let child = self.spawn_process(&profile, options, &data_uri)?;
        info!(pid = child.id(), %session_id, headless = options.headless, "Firefox process spawned");

        // `kill_on_drop` reaps Firefox if the handshake fails.
        let (connection, ready) = server.accept().await?;
        let tab_id = TabId::new(ready.tab_id)
            .ok_or_else(|| Error::protocol("Invalid tabId in READY message"))?;

        debug!(%session_id, %tab_id, "Browser connected");
        Ok(Browser::new(connection, child, profile, session_id, tab_id))
    }

    /// Spawns the Firefox process.
    fn spawn_process(
        &self,
        profile: &Profile,
        options: &BrowserOptions,
        data_uri: &str,
    ) -> Result<Child> {
        let mut cmd = Command::new(&self.binary);

        cmd.arg("--profile")
            .arg(profile.path())
            .arg("--no-remote")
            .arg("--new-instance")
            .args(options.to_args())
            .arg(data_uri)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd.spawn().map_err(Error::process_launch_failed)
    }
}

// ============================================================================
// Tests
// ============================================================================
