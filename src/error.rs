//! Error types for whatslogged.
//!
//! Every fallible operation in the crate returns [`Result<T>`] which uses
//! [`Error`]. How an error is *handled* (skip, terminate, clear the session)
//! is decided separately by [`crate::report`].
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Profile`], [`Error::BrowserNotFound`], [`Error::ProcessLaunchFailed`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::ScriptError`], [`Error::RequestTimeout`] |
//! | Host page | [`Error::HostNotReady`], [`Error::HostConstants`], [`Error::PairingCode`], [`Error::Timeout`] |
//! | Session | [`Error::SessionFile`] |
//! | Local storage | [`Error::OutputDir`] |
//! | Media | [`Error::MediaKey`], [`Error::Decrypt`], [`Error::Download`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Firefox profile creation or setup failed.
    #[error("Profile error: {message}")]
    Profile {
        /// Description of the profile error.
        message: String,
    },

    /// Browser binary not found at path.
    #[error("Browser not found at: {path}")]
    BrowserNotFound {
        /// Path where the browser was expected.
        path: PathBuf,
    },

    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The extension did not connect in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected response.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// In-page script evaluation failed.
    #[error("Script error: {message}")]
    ScriptError {
        /// Error message from the page.
        message: String,
    },

    /// Command request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Host Page Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The host application never exposed its message module.
    #[error("Host application did not become ready within {timeout_ms}ms")]
    HostNotReady {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// The host constants module was missing or incomplete.
    #[error("Host constants unavailable: {message}")]
    HostConstants {
        /// What was missing.
        message: String,
    },

    /// The pairing code element was present but its value could not be read.
    #[error("Pairing code could not be read: {message}")]
    PairingCode {
        /// Why the read failed.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The persisted session file is malformed.
    #[error("Bad session file {path}: {message}")]
    SessionFile {
        /// Session file path.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    // ========================================================================
    // Local Storage Errors
    // ========================================================================
    /// An output directory or file could not be created.
    #[error("Cannot write to {path}: {source}")]
    OutputDir {
        /// Directory or file that could not be created.
        path: PathBuf,
        /// Underlying failure.
        source: IoError,
    },

    // ========================================================================
    // Media Errors
    // ========================================================================
    /// The media key could not be decoded.
    #[error("Invalid media key: {message}")]
    MediaKey {
        /// Decoder message.
        message: String,
    },

    /// Streaming decryption failed.
    #[error("Decryption failed: {message}")]
    Decrypt {
        /// Cipher message.
        message: String,
    },

    /// Remote media download failed.
    #[error("Download failed for {url}: {message}")]
    Download {
        /// Remote URL.
        url: String,
        /// Failure description.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a profile error.
    #[inline]
    pub fn profile(message: impl Into<String>) -> Self {
        Self::Profile {
            message: message.into(),
        }
    }

    /// Creates a browser not found error.
    #[inline]
    pub fn browser_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BrowserNotFound { path: path.into() }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script_error(message: impl Into<String>) -> Self {
        Self::ScriptError {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a host-not-ready error.
    #[inline]
    pub fn host_not_ready(timeout_ms: u64) -> Self {
        Self::HostNotReady { timeout_ms }
    }

    /// Creates a host constants error.
    #[inline]
    pub fn host_constants(message: impl Into<String>) -> Self {
        Self::HostConstants {
            message: message.into(),
        }
    }

    /// Creates a pairing code read error.
    #[inline]
    pub fn pairing_code(message: impl Into<String>) -> Self {
        Self::PairingCode {
            message: message.into(),
        }
    }

    /// Creates a session file error.
    #[inline]
    pub fn session_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SessionFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an output directory error.
    #[inline]
    pub fn output_dir(path: impl Into<PathBuf>, source: IoError) -> Self {
        Self::OutputDir {
            path: path.into(),
            source,
        }
    }

    /// Creates a media key error.
    #[inline]
    pub fn media_key(message: impl Into<String>) -> Self {
        Self::MediaKey {
            message: message.into(),
        }
    }

    /// Creates a decryption error.
    #[inline]
    pub fn decrypt(message: impl Into<String>) -> Self {
        Self::Decrypt {
            message: message.into(),
        }
    }

    /// Creates a download error.
    #[inline]
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::Timeout { .. }
                | Self::RequestTimeout { .. }
                | Self::HostNotReady { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if local storage cannot be written at all.
    #[inline]
    #[must_use]
    pub fn is_local_io(&self) -> bool {
        matches!(self, Self::OutputDir { .. })
    }

    /// Returns `true` if this error originated from a single media download.
    #[inline]
    #[must_use]
    pub fn is_media_error(&self) -> bool {
        matches!(
            self,
            Self::MediaKey { .. } | Self::Decrypt { .. } | Self::Download { .. } | Self::Http(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
