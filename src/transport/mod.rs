//! WebSocket transport between the driver and the automation extension.
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Page (Rust)    │         WebSocket            │  Extension      │
//! │  PendingServer  │◄────────────────────────────►│  (Background)   │
//! │  → Connection   │      127.0.0.1:PORT          │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Event loop, request correlation, event fan-out |
//! | `server` | Binding and single-connection acceptance |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// WebSocket server for Firefox communication.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, DEFAULT_COMMAND_TIMEOUT, ReadyData};
pub use server::PendingServer;
