//! Structural matchers for the host module registry.
//!
//! The host application ships minified bundles whose module IDs change on
//! every deploy, so modules are found by shape instead of by name. The shape
//! is data: updating it for a new host build does not touch the state
//! machines.

use serde::{Deserialize, Serialize};

// ============================================================================
// Defaults
// ============================================================================

/// Path from a module's exports to the object owning the event table.
const OWNER_PATH: &[&str] = &["default"];

/// Path from the owner to the new-message listener array.
const LISTENER_PATH: &[&str] = &["_events", "alert_new_msg"];

/// Keys that identify the constants module.
const CONSTANT_KEYS: &[&str] = &["ACK", "KEY_SECRET"];

// ============================================================================
// ModuleMatcher
// ============================================================================

/// Describes which module records the in-page runtime looks for.
///
/// Serialized as the argument to `window.__wl.configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMatcher {
    /// Property path from a module's exports to the listener owner.
    pub owner_path: Vec<String>,
    /// Property path from the owner to the listener array.
    pub listener_path: Vec<String>,
    /// Own properties every constants module carries.
    pub constant_keys: Vec<String>,
}

impl Default for ModuleMatcher {
    fn default() -> Self {
        Self {
            owner_path: to_owned(OWNER_PATH),
            listener_path: to_owned(LISTENER_PATH),
            constant_keys: to_owned(CONSTANT_KEYS),
        }
    }
}

impl ModuleMatcher {
    /// Replaces the listener path, keeping everything else.
    #[must_use]
    pub fn with_listener_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listener_path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the constant keys.
    #[must_use]
    pub fn with_constant_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constant_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

fn to_owned(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| (*s).to_string()).collect()
}
