//! Initial page that tells the extension where to connect.
//!
//! Firefox opens a `data:` URI as its first tab. The page posts a
//! `WEBDRIVER_INIT` message which the extension's content script forwards
//! to its background script, which then dials the WebSocket server.

// ============================================================================
// Imports
// ============================================================================

use serde_json::json;

use crate::identifiers::SessionId;

// ============================================================================
// Constants
// ============================================================================

/// Page body; `$CONFIG_JSON` is replaced with the init message.
const INIT_HTML_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>whatslogged</title></head>
<body style="background:#111;color:#9c9;font-family:monospace;padding:32px">
<p>Connecting automation bridge (session $SESSION_ID)...</p>
<script>window.postMessage($CONFIG_JSON, '*');</script>
</body>
</html>"##;

// ============================================================================
// Public Functions
// ============================================================================

/// Builds the `data:text/html,...` URI passed to Firefox on launch.
#[must_use]
pub fn build_init_data_uri(ws_url: &str, session_id: SessionId) -> String {
    let config = json!({
        "type": "WEBDRIVER_INIT",
        "wsUrl": ws_url,
        "sessionId": session_id.as_u32(),
    });

    let html = INIT_HTML_TEMPLATE
        .replace("$SESSION_ID", &session_id.to_string())
        .replace("$CONFIG_JSON", &config.to_string());

    format!("data:text/html,{}", urlencoding::encode(&html))
}

// ============================================================================
// Tests
// ============================================================================
