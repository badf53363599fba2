//! whatslogged - Headless logger for a messaging web client.
//!
//! Drives Firefox through a WebExtension-based automation channel, pairs
//! with the host web application by QR code, hooks its message listener and
//! writes every incoming message to per-contact chat logs. Image, sticker
//! and audio attachments are downloaded and decrypted on the fly.
//!
//! # Architecture
//!
//! - **Local End (Rust)**: state machines, storage, media pipeline
//! - **Remote End (Extension)**: executes scripts and reads the page
//! - **In-page runtime** (`window.__wl`): finds the host modules and
//!   buffers captured messages until drained
//!
//! Key design principles:
//!
//! - State machines talk to a [`PageHandle`], never to the socket
//! - Every timed wait is a race: the loser is dropped, not left polling
//! - Errors flow to one [`Reporter`] whose policy decides the exit code
//!
//! # Quick Start
//!
//! ```no_run
//! use whatslogged::{Settings, controller};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Settings::new("/usr/bin/firefox", "./extension");
//!     std::process::exit(controller::run(settings).await);
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | Browser process and [`PageHandle`] |
//! | [`config`] | [`Settings`], timings and paths |
//! | [`controller`] | Session lifecycle and entry point |
//! | [`driver`] | Firefox launch and profile setup |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | In-page runtime and host constants |
//! | [`media`] | Key derivation and streaming decryption |
//! | [`message`] | Message classification and chat logs |
//! | [`monitor`] | Liveness checks and recovery |
//! | [`pairing`] | QR pairing state machine |
//! | [`report`] | Error policy table |
//! | [`session`] | Session snapshot persistence |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Browser process and page handle.
pub mod browser;

/// Runtime configuration.
pub mod config;

/// Session orchestration.
pub mod controller;

/// Driver factory and launch options.
///
/// Use [`Driver::builder()`] to create a configured driver instance.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Host application integration.
pub mod host;

/// Type-safe identifiers for protocol entities.
pub mod identifiers;

/// Media download and decryption.
pub mod media;

/// Captured messages.
pub mod message;

/// Session liveness monitoring.
pub mod monitor;

/// Device pairing.
pub mod pairing;

/// WebSocket protocol message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// Error reporting policy.
pub mod report;

/// Session persistence.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling WebSocket server and connection management.
pub mod transport;

/// Deadline races and tickers.
pub mod wait;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{AttributeProbe, Browser, Page, PageHandle, StorageEntry};

// Configuration
pub use config::{AppPaths, RunMode, Settings, Timings};

// Orchestration
pub use controller::{HostEvent, SessionContext, SessionController};

// Driver types
pub use driver::{BrowserOptions, Driver, DriverBuilder, ExtensionSource, Profile};

// Error types
pub use error::{Error, Result};

// Domain types
pub use host::{EventHook, HostConstants, LoginMarkers, ModuleMatcher};
pub use media::{KeyBundle, MediaJob, MediaRetriever};
pub use message::{ChatLog, Content, Message};
pub use monitor::{RecoveryPolicy, SessionMonitor, TickReport};
pub use pairing::{CodeDisplay, PairingOutcome, PairingStateMachine, TerminalQr};
pub use report::{Disposition, ErrorKind, Reporter};
pub use session::{RestoreOutcome, SessionStore};

// Identifier types
pub use identifiers::{FrameId, RequestId, SessionId, TabId};
