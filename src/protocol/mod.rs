//! WebSocket protocol message types.
//!
//! Messages exchanged between the driver (Rust) and the automation
//! extension running inside Firefox.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Driver → Extension | Command request |
//! | `Response` | Extension → Driver | Command response |
//! | `Event` | Extension → Driver | Browsing-context notification |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by module.
pub mod command;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{BrowsingContextCommand, Command, ScriptCommand, SessionCommand};
pub use event::{Event, ParsedEvent};
pub use request::{Request, Response, ResponseType};
