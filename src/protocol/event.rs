//! Event message types.
//!
//! Events are notifications pushed by the extension when the page's
//! browsing context changes. The page handle uses them to know when a
//! reload has produced a fresh document.
//!
//! | Event | Meaning |
//! |-------|---------|
//! | `browsingContext.domContentLoaded` | New document parsed |
//! | `browsingContext.load` | All subresources loaded |
//! | `browsingContext.navigationFailed` | Navigation aborted |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::RequestId;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the extension.
///
/// # Format
///
/// ```json
/// {
///   "id": "event-uuid",
///   "type": "event",
///   "method": "module.eventName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event ID.
    pub id: RequestId,

    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        match self.method.as_str() {
            "browsingContext.domContentLoaded" => ParsedEvent::DomContentLoaded {
                tab_id: self.get_u32("tabId"),
                url: self.get_string("url"),
            },

            "browsingContext.load" => ParsedEvent::Load {
                tab_id: self.get_u32("tabId"),
                url: self.get_string("url"),
            },

            "browsingContext.navigationFailed" => ParsedEvent::NavigationFailed {
                tab_id: self.get_u32("tabId"),
                url: self.get_string("url"),
                error: self.get_string("error"),
            },

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
            },
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u32 from params.
    #[inline]
    fn get_u32(&self, key: &str) -> u32 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or_default() as u32
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed browsing-context events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// DOM content loaded.
    DomContentLoaded {
        /// Tab ID.
        tab_id: u32,
        /// Page URL.
        url: String,
    },

    /// Page load complete.
    Load {
        /// Tab ID.
        tab_id: u32,
        /// Page URL.
        url: String,
    },

    /// Navigation failed.
    NavigationFailed {
        /// Tab ID.
        tab_id: u32,
        /// Page URL.
        url: String,
        /// Error message.
        error: String,
    },

    /// Anything else the extension emits.
    Unknown {
        /// Raw method name.
        method: String,
    },
}

impl ParsedEvent {
    /// Returns the tab the event concerns, if any.
    #[must_use]
    pub fn tab_id(&self) -> Option<u32> {
        match self {
            Self::DomContentLoaded { tab_id, .. }
            | Self::Load { tab_id, .. }
            | Self::NavigationFailed { tab_id, .. } => Some(*tab_id),
            Self::Unknown { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
