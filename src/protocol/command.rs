//! Command definitions organized by module.
//!
//! Commands follow `module.methodName` format. Only the commands the
//! session controller actually drives are defined.
//!
//! | Module | Commands |
//! |--------|----------|
//! | `browsingContext` | navigate, reload, captureScreenshot |
//! | `script` | evaluate |
//! | `session` | stealLogs |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// BrowsingContext module commands.
    BrowsingContext(BrowsingContextCommand),
    /// Script module commands.
    Script(ScriptCommand),
    /// Session module commands.
    Session(SessionCommand),
}

// ============================================================================
// BrowsingContext Commands
// ============================================================================

/// Navigation and capture commands for the page's tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowsingContextCommand {
    /// Navigate to URL.
    #[serde(rename = "browsingContext.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Reload current page.
    #[serde(rename = "browsingContext.reload")]
    Reload,

    /// Capture the visible tab.
    #[serde(rename = "browsingContext.captureScreenshot")]
    CaptureScreenshot {
        /// `png` or `jpeg`.
        format: String,
        /// JPEG quality.
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
    },
}

// ============================================================================
// Script Commands
// ============================================================================

/// JavaScript execution in the page context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ScriptCommand {
    /// Execute synchronous script.
    #[serde(rename = "script.evaluate")]
    Evaluate {
        /// JavaScript code.
        script: String,
        /// Script arguments.
        #[serde(default)]
        args: Vec<Value>,
    },
}

// ============================================================================
// Session Commands
// ============================================================================

/// Extension-level commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum SessionCommand {
    /// Get and clear extension logs.
    #[serde(rename = "session.stealLogs")]
    StealLogs,
}

// ============================================================================
// Tests
// ============================================================================
