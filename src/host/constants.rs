//! Host-internal named constants.
//!
//! Read once from the constants module after the page is ready. Storage-key
//! constants fall back to the values the host has shipped for years; the
//! give-up wait has no fallback because the pairing deadline is meaningless
//! without it.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constant Names
// ============================================================================

/// How long the host keeps a pairing code alive, in milliseconds.
const GIVE_UP_WAIT: &str = "GIVE_UP_WAIT";

/// Storage key of the secret bundle.
const KEY_SECRET_BUNDLE: &str = "KEY_SECRET_BUNDLE";

/// Storage key of the logout token.
const KEY_LOGOUT_TOKEN: &str = "KEY_LOGOUT_TOKEN";

/// Storage key holding the logged-in identity.
const KEY_LAST_WID: &str = "KEY_LAST_WID";

/// Constant the receive marker is derived from.
pub const RECEIVE_MARKER_CONSTANT: &str = "KEY_LAST_PUSHNAME";

// ============================================================================
// LoginMarkers
// ============================================================================

/// Storage keys that must both be set for the session to count as logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginMarkers {
    /// Secret bundle key.
    pub secret_bundle: String,
    /// Logout token key.
    pub logout_token: String,
}

impl Default for LoginMarkers {
    fn default() -> Self {
        Self {
            secret_bundle: "WASecretBundle".to_string(),
            logout_token: "logout-token".to_string(),
        }
    }
}

// ============================================================================
// HostConstants
// ============================================================================

/// Constants extracted from the host's constants module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConstants {
    /// How long a pairing code stays valid.
    pub give_up_wait: Duration,
    /// Login marker keys.
    pub login: LoginMarkers,
    /// Storage key holding the logged-in identity.
    pub identity_key: String,
    /// Name of the constant the receive marker is derived from.
    pub receive_marker: String,
}

impl HostConstants {
    /// Parses the object returned by `window.__wl.constants()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostConstants`] if the module was not found or lacks
    /// a usable give-up wait.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::host_constants("constants module not found"))?;

        let give_up_wait = map
            .get(GIVE_UP_WAIT)
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .ok_or_else(|| Error::host_constants(format!("{GIVE_UP_WAIT} missing or invalid")))?;

        let string = |name: &str, fallback: String| {
            map.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(fallback)
        };
        let defaults = LoginMarkers::default();

        Ok(Self {
            give_up_wait: Duration::from_millis(give_up_wait),
            login: LoginMarkers {
                secret_bundle: string(KEY_SECRET_BUNDLE, defaults.secret_bundle),
                logout_token: string(KEY_LOGOUT_TOKEN, defaults.logout_token),
            },
            identity_key: string(KEY_LAST_WID, "last-wid".to_string()),
            receive_marker: RECEIVE_MARKER_CONSTANT.to_string(),
        })
    }
}
