//! In-memory [`PageHandle`] for state machine tests.
//!
//! Emulates the pairing element, `localStorage`, the `window.__wl` runtime
//! and reloads. All state sits behind one lock; no call ever suspends.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::host::{
    FN_CONFIGURE, FN_CONSTANTS, FN_DRAIN, FN_INJECT, FN_RECEIVE_MARKER, HOOK_SOURCE, LoginMarkers,
};

use super::{AttributeProbe, PageHandle, StorageEntry};

// ============================================================================
// Pairing Script
// ============================================================================

/// One change to the pairing element, applied on an attribute read.
#[derive(Debug, Clone)]
pub(crate) enum PairingStep {
    /// Element present with this code.
    Code(&'static str),
    /// Element present, attribute empty.
    Unreadable,
    /// Element removed; login markers stay unset.
    Gone,
    /// Element removed and login markers written.
    GoneAndLogin,
}

#[derive(Debug, Clone, Default)]
enum QrState {
    #[default]
    Absent,
    Code(String),
    Unreadable,
}

// ============================================================================
// FakePage
// ============================================================================

#[derive(Debug, Default)]
struct State {
    storage: Vec<StorageEntry>,
    qr: QrState,
    pairing: VecDeque<PairingStep>,
    attribute_reads: usize,
    runtime: bool,
    configured: Option<Value>,
    ready_after: usize,
    probes: usize,
    listener_entries: usize,
    constants: Value,
    markers: FxHashMap<String, String>,
    marker_calls: usize,
    inbox: Vec<Value>,
    reloads: usize,
    on_reload: Vec<StorageEntry>,
    gotos: Vec<String>,
}

/// Scriptable page.
#[derive(Debug, Default)]
pub(crate) struct FakePage {
    state: Mutex<State>,
}

impl FakePage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Listener array appears after `probes` unsuccessful probes.
    pub(crate) fn with_listener_ready_after(self, probes: usize) -> Self {
        self.state.lock().ready_after = probes;
        self
    }

    pub(crate) fn with_constants(self, constants: Value) -> Self {
        self.state.lock().constants = constants;
        self
    }

    pub(crate) fn with_inbox(self, messages: Vec<Value>) -> Self {
        self.state.lock().inbox = messages;
        self
    }

    pub(crate) fn with_storage(self, key: &str, value: &str) -> Self {
        self.set_storage(key, value);
        self
    }

    /// Marks the session as logged in.
    pub(crate) fn logged_in(self) -> Self {
        let markers = LoginMarkers::default();
        self.with_storage(&markers.secret_bundle, "{}")
            .with_storage(&markers.logout_token, "token")
    }

    pub(crate) fn with_pairing(self, steps: Vec<PairingStep>) -> Self {
        self.state.lock().pairing = steps.into();
        self
    }

    /// `constant` resolves to `prefix` + identity.
    pub(crate) fn with_receive_marker(self, constant: &str, prefix: &str) -> Self {
        self.state
            .lock()
            .markers
            .insert(constant.to_string(), prefix.to_string());
        self
    }

    /// Entries written into storage by every reload.
    pub(crate) fn with_on_reload(self, entries: Vec<StorageEntry>) -> Self {
        self.state.lock().on_reload = entries;
        self
    }

    pub(crate) fn set_storage(&self, key: &str, value: &str) {
        upsert(&mut self.state.lock().storage, StorageEntry::new(key, value));
    }

    pub(crate) fn remove_storage(&self, key: &str) {
        self.state.lock().storage.retain(|e| e.key != key);
    }

    pub(crate) fn push_message(&self, message: Value) {
        self.state.lock().inbox.push(message);
    }

    pub(crate) fn storage(&self) -> Vec<StorageEntry> {
        self.state.lock().storage.clone()
    }

    pub(crate) fn listener_entries(&self) -> usize {
        self.state.lock().listener_entries
    }

    pub(crate) fn reloads(&self) -> usize {
        self.state.lock().reloads
    }

    pub(crate) fn marker_calls(&self) -> usize {
        self.state.lock().marker_calls
    }

    pub(crate) fn attribute_reads(&self) -> usize {
        self.state.lock().attribute_reads
    }

    pub(crate) fn configured(&self) -> Option<Value> {
        self.state.lock().configured.clone()
    }

    pub(crate) fn gotos(&self) -> Vec<String> {
        self.state.lock().gotos.clone()
    }
}

fn upsert(storage: &mut Vec<StorageEntry>, entry: StorageEntry) {
    match storage.iter_mut().find(|e| e.key == entry.key) {
        Some(existing) => existing.value = entry.value,
        None => storage.push(entry),
    }
}

impl State {
    fn runtime_call(&mut self, path: &str, args: &[Value]) -> Result<Value> {
        if !self.runtime {
            return Err(Error::script_error("TypeError: window.__wl is undefined"));
        }

        match path {
            FN_CONFIGURE => {
                self.configured = args.first().cloned();
                Ok(json!(true))
            }
            FN_INJECT => {
                if self.probes < self.ready_after {
                    self.probes += 1;
                    return Ok(json!("not_found"));
                }
                let trial = args
                    .first()
                    .and_then(|a| a.get("trial"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if trial {
                    Ok(json!("ready"))
                } else if self.listener_entries > 0 {
                    Ok(json!("already_attached"))
                } else {
                    self.listener_entries += 1;
                    Ok(json!("attached"))
                }
            }
            FN_CONSTANTS => Ok(self.constants.clone()),
            FN_RECEIVE_MARKER => {
                self.marker_calls += 1;
                let identity = args.first().and_then(Value::as_str).unwrap_or_default();
                let constant = args.get(1).and_then(Value::as_str).unwrap_or_default();
                Ok(self
                    .markers
                    .get(constant)
                    .map_or(Value::Null, |prefix| json!(format!("{prefix}{identity}"))))
            }
            FN_DRAIN => Ok(Value::Array(std::mem::take(&mut self.inbox))),
            other => Err(Error::script_error(format!("TypeError: {other} is not a function"))),
        }
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.state.lock().gotos.push(url.to_string());
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.reloads += 1;
        state.runtime = false;
        state.configured = None;
        state.listener_entries = 0;
        state.probes = 0;
        for entry in std::mem::take(&mut state.on_reload) {
            upsert(&mut state.storage, entry.clone());
            state.on_reload.push(entry);
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if script == HOOK_SOURCE {
            self.state.lock().runtime = true;
        }
        Ok(Value::Null)
    }

    async fn call_function(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.state.lock().runtime_call(path, &args)
    }

    async fn attribute(&self, _selector: &str, _name: &str) -> Result<AttributeProbe> {
        let mut state = self.state.lock();
        state.attribute_reads += 1;

        if let Some(step) = state.pairing.pop_front() {
            let next = match step {
                PairingStep::Code(code) => QrState::Code(code.to_string()),
                PairingStep::Unreadable => QrState::Unreadable,
                PairingStep::Gone => QrState::Absent,
                PairingStep::GoneAndLogin => {
                    let markers = LoginMarkers::default();
                    upsert(&mut state.storage, StorageEntry::new(markers.secret_bundle, "{}"));
                    upsert(&mut state.storage, StorageEntry::new(markers.logout_token, "token"));
                    QrState::Absent
                }
            };
            state.qr = next;
        }

        Ok(match &state.qr {
            QrState::Absent => AttributeProbe::Absent,
            QrState::Code(code) => AttributeProbe::Present(Some(code.clone())),
            QrState::Unreadable => AttributeProbe::Present(None),
        })
    }

    async fn storage_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .storage
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.clone()))
    }

    async fn storage_entries(&self) -> Result<Vec<StorageEntry>> {
        Ok(self.storage())
    }

    async fn storage_replay(&self, entries: &[StorageEntry]) -> Result<()> {
        let mut state = self.state.lock();
        for entry in entries {
            upsert(&mut state.storage, entry.clone());
        }
        Ok(())
    }

    async fn storage_clear(&self) -> Result<()> {
        self.state.lock().storage.clear();
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn browser_logs(&self) -> Result<Vec<Value>> {
        Ok(vec![json!({"level": "info", "message": "fake"})])
    }
}
