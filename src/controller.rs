//! Session orchestration.
//!
//! [`SessionController`] owns the page and runs the whole lifecycle:
//!
//! ```text
//! goto host ─► install runtime ─► restore session ─► wait ready ─► constants
//!     ─► logged in? ──no──► pair ─► save session
//!          │                           │
//!          └──────────yes──────────────┴─► attach hook ─► drain + monitor loop
//! ```
//!
//! Failures are never handled inline: each is reported under an
//! [`ErrorKind`] and the resulting [`Disposition`] decides whether the loop
//! continues. [`SessionContext`] carries the page and what was learned about
//! the host, so the state machines need no global state.

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::browser::PageHandle;
use crate::config::{HOST_URL, Settings, Timings};
use crate::driver::{BrowserOptions, Driver};
use crate::error::{Error, Result};
use crate::host::{EventHook, HostConstants, LoginMarkers};
use crate::media::MediaRetriever;
use crate::message::{ChatLog, Message};
use crate::monitor::{SessionMonitor, TickReport};
use crate::pairing::{self, CodeDisplay, PairingOutcome, PairingStateMachine, TerminalQr};
use crate::report::{Disposition, ErrorKind, Reporter};
use crate::session::{RestoreOutcome, SessionStore};
use crate::wait::ticker;

// ============================================================================
// SessionContext
// ============================================================================

/// The page plus everything learned about the host while running.
pub struct SessionContext {
    page: Arc<dyn PageHandle>,
    hook: EventHook,
    timings: Timings,
    constants: Option<HostConstants>,
    /// Receive-marker keys by (identity, constant name).
    receive_markers: FxHashMap<(String, String), Option<String>>,
}

impl SessionContext {
    /// Creates a context over `page`.
    #[must_use]
    pub fn new(page: Arc<dyn PageHandle>, hook: EventHook, timings: Timings) -> Self {
        Self {
            page,
            hook,
            timings,
            constants: None,
            receive_markers: FxHashMap::default(),
        }
    }

    /// Returns the page.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &dyn PageHandle {
        self.page.as_ref()
    }

    /// Returns the hook driver.
    #[inline]
    #[must_use]
    pub fn hook(&self) -> &EventHook {
        &self.hook
    }

    /// Returns the timings.
    #[inline]
    #[must_use]
    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Host constants, once loaded.
    #[inline]
    #[must_use]
    pub fn constants(&self) -> Option<&HostConstants> {
        self.constants.as_ref()
    }

    /// Login marker keys: the host's if known, else the defaults.
    #[must_use]
    pub fn login_markers(&self) -> LoginMarkers {
        self.constants
            .as_ref()
            .map(|c| c.login.clone())
            .unwrap_or_default()
    }

    /// Loads the host constants on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostConstants`] if the module is missing.
    pub async fn load_constants(&mut self) -> Result<&HostConstants> {
        if self.constants.is_none() {
            let constants = self.hook.constants(self.page.as_ref()).await?;
            debug!(give_up_wait_ms = constants.give_up_wait.as_millis() as u64, "Host constants loaded");
            self.constants = Some(constants);
        }
        self.constants
            .as_ref()
            .ok_or_else(|| Error::host_constants("constants not loaded"))
    }

    /// Returns `true` if both login markers are set.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub async fn is_logged_in(&self) -> Result<bool> {
        pairing::is_logged_in(self.page.as_ref(), &self.login_markers()).await
    }

    /// Identity of the logged-in account, if stored.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub async fn identity(&self) -> Result<Option<String>> {
        let key = self
            .constants
            .as_ref()
            .map_or("last-wid", |c| c.identity_key.as_str());
        let raw = self.page.storage_get(key).await?;

        // The host stores it JSON-encoded.
        Ok(raw.map(|v| serde_json::from_str::<String>(&v).unwrap_or(v)))
    }

    /// Resolves the receive-marker key for `identity`, memoized.
    ///
    /// # Errors
    ///
    /// Returns an error if the page call fails.
    pub async fn receive_marker(&mut self, identity: &str, constant: &str) -> Result<Option<String>> {
        let cache_key = (identity.to_string(), constant.to_string());
        if let Some(marker) = self.receive_markers.get(&cache_key) {
            return Ok(marker.clone());
        }

        let marker = self
            .hook
            .receive_marker(self.page.as_ref(), identity, constant)
            .await?;
        self.receive_markers.insert(cache_key, marker.clone());
        Ok(marker)
    }

    /// Whether the session can still receive messages.
    ///
    /// Without host constants or a marker constant the check cannot be
    /// computed and passes. A logged-in session without an identity fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be queried.
    pub async fn can_receive(&mut self) -> Result<bool> {
        let Some(constant) = self.constants.as_ref().map(|c| c.receive_marker.clone()) else {
            debug!("Receive check skipped, host constants unknown");
            return Ok(true);
        };
        let Some(identity) = self.identity().await? else {
            return Ok(false);
        };
        let Some(marker) = self.receive_marker(&identity, &constant).await? else {
            debug!(%constant, "Receive check skipped, host does not define the constant");
            return Ok(true);
        };
        Ok(self.page.storage_get(&marker).await?.is_some())
    }

    /// Reloads the page and re-arms the hook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostNotReady`] if the host does not come back.
    pub async fn reload(&self) -> Result<()> {
        self.page.reload(self.timings.reload_timeout).await?;
        info!("Page refreshed");
        self.hook
            .arm(self.page.as_ref(), self.timings.ready_poll, self.timings.ready_timeout)
            .await
    }
}

// ============================================================================
// HostEvent
// ============================================================================

/// What the controller reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The host exposed its message module.
    Ready,
    /// The host did not become ready in time.
    ReadyTimeout,
    /// A message was captured.
    Message(Box<Message>),
}

// ============================================================================
// SessionController
// ============================================================================

/// Runs one logged-in session over a page.
pub struct SessionController {
    ctx: SessionContext,
    store: SessionStore,
    reporter: Reporter,
    chat_log: ChatLog,
    retriever: MediaRetriever,
    monitor: SessionMonitor,
    display: Box<dyn CodeDisplay>,
    /// Each download yields the context of a local storage failure, if any.
    downloads: JoinSet<Option<String>>,
}

impl SessionController {
    /// Creates a controller over `page`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the media client cannot be built.
    pub fn new(settings: &Settings, page: Arc<dyn PageHandle>) -> Result<Self> {
        Ok(Self {
            ctx: SessionContext::new(page, EventHook::default(), settings.timings.clone()),
            store: SessionStore::new(&settings.paths.session_file),
            reporter: Reporter::new(settings),
            chat_log: ChatLog::new(&settings.paths.chat_dir),
            retriever: MediaRetriever::new(&settings.paths.chat_dir)?,
            monitor: SessionMonitor::new(settings.recovery_ceiling),
            display: Box::new(TerminalQr),
            downloads: JoinSet::new(),
        })
    }

    /// Replaces where pairing codes are shown.
    #[must_use]
    pub fn with_display(mut self, display: Box<dyn CodeDisplay>) -> Self {
        self.display = display;
        self
    }

    /// Returns the session context.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Starts the session and serves it until a critical error.
    ///
    /// Returns the exit code.
    pub async fn run_session(&mut self) -> i32 {
        if let ControlFlow::Break(code) = self.start().await {
            return code;
        }
        self.serve().await
    }

    /// Brings the session up to the point where messages flow.
    pub async fn start(&mut self) -> ControlFlow<i32> {
        let page = Arc::clone(&self.ctx.page);
        let timings = self.ctx.timings.clone();

        info!(url = HOST_URL, "Opening host application");
        if let Err(e) = page.goto(HOST_URL).await {
            return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await;
        }
        if let Err(e) = self.ctx.hook.install(page.as_ref()).await {
            return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await;
        }

        self.restore().await?;

        let ready = self
            .ctx
            .hook
            .wait_ready(page.as_ref(), timings.ready_poll, timings.ready_timeout)
            .await;
        let event = match ready {
            Ok(()) => HostEvent::Ready,
            Err(e) if matches!(e, Error::HostNotReady { .. }) => HostEvent::ReadyTimeout,
            Err(e) => return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await,
        };
        self.dispatch(event).await?;

        if let Err(e) = self.ctx.load_constants().await.map(|_| ()) {
            return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await;
        }

        match self.ctx.is_logged_in().await {
            Ok(true) => info!("Session is logged in"),
            Ok(false) => self.pair().await?,
            Err(e) => return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await,
        }

        if let Err(e) = self.ctx.hook.attach(page.as_ref()).await {
            return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await;
        }
        info!("Waiting for new messages, do not stop the process");
        ControlFlow::Continue(())
    }

    /// Drains and monitors until a critical error.
    pub async fn serve(&mut self) -> i32 {
        let timings = self.ctx.timings.clone();
        let mut drain = ticker(timings.hook_drain);
        let mut checks = interval_at(
            Instant::now() + timings.monitor_first_check,
            timings.monitor_interval,
        );
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                _ = drain.tick() => self.drain().await,
                _ = checks.tick() => self.check().await,
            };
            if let ControlFlow::Break(code) = flow {
                return code;
            }
        }
    }

    /// Handles one event.
    pub async fn dispatch(&mut self, event: HostEvent) -> ControlFlow<i32> {
        match event {
            HostEvent::Ready => {
                info!("Host application ready");
                ControlFlow::Continue(())
            }
            HostEvent::ReadyTimeout => {
                let limit = self.ctx.timings.ready_timeout.as_millis();
                self.fail(
                    ErrorKind::HostNotReady,
                    &format!("Host application did not load within {limit}ms"),
                )
                .await
            }
            HostEvent::Message(message) => self.on_message(&message).await,
        }
    }

    /// Takes captured messages from the page and dispatches them.
    ///
    /// Finished downloads are reaped first; one that could not write to
    /// local storage ends the session.
    pub async fn drain(&mut self) -> ControlFlow<i32> {
        while let Some(joined) = self.downloads.try_join_next() {
            if let Ok(Some(context)) = joined {
                self.report(ErrorKind::LocalIo, &context).await?;
            }
        }

        let page = Arc::clone(&self.ctx.page);
        let items = match self.ctx.hook.drain(page.as_ref()).await {
            Ok(items) => items,
            Err(e) => {
                return self.fail(page_kind(&e, ErrorKind::CheckFailed), &e.to_string()).await;
            }
        };

        for item in items {
            match Message::classify(&item) {
                Ok(message) => self.dispatch(HostEvent::Message(Box::new(message))).await?,
                Err(e) => {
                    self.report(ErrorKind::MessageParse, &format!("{e}: {}", preview(&item)))
                        .await?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Runs one liveness check.
    pub async fn check(&mut self) -> ControlFlow<i32> {
        match self.monitor.tick(&mut self.ctx).await {
            Ok(TickReport::Expired) => {
                self.fail(ErrorKind::SessionExpired, "Session is no longer logged in")
                    .await
            }
            Ok(TickReport::Exhausted) => {
                let attempts = self.monitor.policy().attempts();
                self.fail(
                    ErrorKind::RecoveryExhausted,
                    &format!("Still not receiving after {attempts} reloads"),
                )
                .await
            }
            Ok(_) => ControlFlow::Continue(()),
            Err(e) => {
                let kind = match e {
                    Error::HostNotReady { .. } => ErrorKind::HostNotReady,
                    _ => page_kind(&e, ErrorKind::CheckFailed),
                };
                self.fail(kind, &e.to_string()).await
            }
        }
    }

    async fn restore(&mut self) -> ControlFlow<i32> {
        let page = Arc::clone(&self.ctx.page);
        match self.store.restore(page.as_ref()).await {
            Ok(RestoreOutcome::Restored(_)) => {
                if let Err(e) = page.reload(self.ctx.timings.reload_timeout).await {
                    return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await;
                }
                if let Err(e) = self.ctx.hook.install(page.as_ref()).await {
                    return self.fail(page_kind(&e, ErrorKind::HostNotReady), &e.to_string()).await;
                }
                ControlFlow::Continue(())
            }
            Ok(RestoreOutcome::NotFound | RestoreOutcome::Malformed) => ControlFlow::Continue(()),
            Err(e) => {
                self.report(ErrorKind::SessionRestoreFailed, &format!("Failed to restore session: {e}"))
                    .await
            }
        }
    }

    async fn pair(&mut self) -> ControlFlow<i32> {
        let page = Arc::clone(&self.ctx.page);
        let timings = self.ctx.timings.clone();
        let markers = self.ctx.login_markers();
        let give_up_wait = match self.ctx.constants() {
            Some(constants) => constants.give_up_wait,
            None => return self.fail(ErrorKind::HostNotReady, "Host constants unavailable").await,
        };

        let code = match pairing::wait_for_code(page.as_ref(), timings.pairing_poll, timings.ready_timeout).await {
            Ok(code) => code,
            Err(e) => return self.fail(ErrorKind::PairingError, &e.to_string()).await,
        };

        let outcome = {
            let mut machine =
                PairingStateMachine::new(page.as_ref(), &markers, &timings, self.display.as_mut());
            machine.run(code, give_up_wait).await
        };

        match outcome {
            Ok(PairingOutcome::Scanned) => {
                info!("QR code successfully scanned");
                if let Err(e) = self.store.capture(page.as_ref()).await {
                    self.report(ErrorKind::SessionSaveFailed, &format!("Error while saving session: {e}"))
                        .await?;
                }
                ControlFlow::Continue(())
            }
            Ok(PairingOutcome::Timeout) => {
                self.fail(ErrorKind::PairingTimeout, "QR code scanning timeout").await
            }
            Ok(PairingOutcome::Error) => {
                self.fail(
                    ErrorKind::PairingError,
                    "QR code scanning error, unknown QR code element state",
                )
                .await
            }
            Err(e) => {
                self.fail(ErrorKind::PairingError, &format!("QR code scanning error: {e}"))
                    .await
            }
        }
    }

    async fn on_message(&mut self, message: &Message) -> ControlFlow<i32> {
        debug!(sender = %message.sender, at = %message.at(), "-> {message}");

        if let Err(e) = self.chat_log.append(message) {
            self.report(ErrorKind::ChatLogWrite, &format!("Cannot log message from {}: {e}", message.sender))
                .await?;
        }

        let job = match message.media_job() {
            Ok(Some(job)) => job,
            Ok(None) => return ControlFlow::Continue(()),
            Err(e) => {
                return self
                    .report(ErrorKind::MediaFailed, &format!("Cannot retrieve {message}: {e}"))
                    .await;
            }
        };

        let retriever = self.retriever.clone();
        let reporter = self.reporter.clone();
        self.downloads.spawn(async move {
            let e = retriever.fetch(&job).await.err()?;
            let context = format!("Error while retrieving media {}: {e}", job.file_hash);
            if e.is_local_io() {
                return Some(context);
            }
            reporter.report(ErrorKind::MediaFailed, &context, None).await;
            None
        });
        ControlFlow::Continue(())
    }

    /// Reports a failure with the page available for diagnostics.
    async fn fail(&self, kind: ErrorKind, context: &str) -> ControlFlow<i32> {
        let page = match kind {
            ErrorKind::BrowserDisconnected => None,
            _ => Some(self.ctx.page()),
        };
        flow(self.reporter.report(kind, context, page).await)
    }

    /// Reports a failure that does not need the page.
    async fn report(&self, kind: ErrorKind, context: &str) -> ControlFlow<i32> {
        flow(self.reporter.report(kind, context, None).await)
    }
}

fn flow(disposition: Disposition) -> ControlFlow<i32> {
    match disposition {
        Disposition::Continue => ControlFlow::Continue(()),
        Disposition::Terminate { exit_code } => ControlFlow::Break(exit_code),
    }
}

/// Connection failures mean the browser is gone, whatever was being done.
fn page_kind(error: &Error, otherwise: ErrorKind) -> ErrorKind {
    if error.is_connection_error() {
        ErrorKind::BrowserDisconnected
    } else {
        otherwise
    }
}

/// Short form of a payload for log lines.
fn preview(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 200 {
        let mut cut = 200;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

// ============================================================================
// Entry Point
// ============================================================================

/// Launches the browser and runs a session until exit or interrupt.
///
/// Returns the process exit code.
pub async fn run(settings: Settings) -> i32 {
    let reporter = Reporter::new(&settings);

    if let Err(e) = settings.paths.ensure() {
        return exit_code(
            reporter
                .report(ErrorKind::LocalIo, &format!("Cannot create directories: {e}"), None)
                .await,
        );
    }

    let driver = match Driver::builder()
        .binary(&settings.browser_binary)
        .extension(&settings.extension)
        .build()
    {
        Ok(driver) => driver,
        Err(e) => return exit_code(reporter.report(ErrorKind::LaunchFailed, &e.to_string(), None).await),
    };

    let options = BrowserOptions::for_mode(settings.mode);
    let browser = match driver.launch(&options).await {
        Ok(browser) => browser,
        Err(e) => return exit_code(reporter.report(ErrorKind::LaunchFailed, &e.to_string(), None).await),
    };
    info!(session_id = %browser.session_id(), "Browser launched");

    let page: Arc<dyn PageHandle> = Arc::new(browser.page().clone());
    let code = match SessionController::new(&settings, page) {
        Ok(mut controller) => {
            tokio::select! {
                code = controller.run_session() => code,
                () = interrupted() => {
                    info!("SIGINT received (stopped by user interaction)");
                    0
                }
            }
        }
        Err(e) => exit_code(reporter.report(ErrorKind::LaunchFailed, &e.to_string(), None).await),
    };

    browser.close_within(settings.timings.graceful_close).await;
    code
}

fn exit_code(disposition: Disposition) -> i32 {
    match disposition {
        Disposition::Continue => 0,
        Disposition::Terminate { exit_code } => exit_code,
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::browser::StorageEntry;
    use crate::browser::fake::{FakePage, PairingStep};
    use crate::session::LoadedSession;

    struct Shared(Arc<Mutex<Vec<String>>>);

    impl CodeDisplay for Shared {
        fn show(&mut self, code: &str) {
            self.0.lock().push(code.to_string());
        }
    }

    fn settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::new("/usr/bin/firefox", "./ext").with_data_dir(dir);
        settings.timings.ready_poll = Duration::from_millis(5);
        settings
    }

    fn host_page() -> FakePage {
        FakePage::new()
            .with_listener_ready_after(2)
            .with_constants(json!({"ACK": 1, "KEY_SECRET": "s", "GIVE_UP_WAIT": 20_000}))
    }

    fn controller(settings: &Settings, page: &Arc<FakePage>) -> (SessionController, Arc<Mutex<Vec<String>>>) {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let controller = SessionController::new(settings, page.clone())
            .expect("controller")
            .with_display(Box::new(Shared(Arc::clone(&shown))));
        (controller, shown)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_pairing_saves_session_and_attaches() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        let page = Arc::new(host_page().with_pairing(vec![
            PairingStep::Code("ref-1"),
            PairingStep::Code("ref-1"),
            PairingStep::Code("ref-2"),
            PairingStep::GoneAndLogin,
        ]));
        let (mut controller, shown) = controller(&settings, &page);

        assert_eq!(controller.start().await, ControlFlow::Continue(()));
        assert_eq!(*shown.lock(), ["ref-1", "ref-2"]);
        assert_eq!(page.gotos(), [HOST_URL]);
        assert_eq!(page.listener_entries(), 1);
        assert!(page.configured().is_some());

        match SessionStore::new(&settings.paths.session_file).load().expect("load") {
            LoadedSession::Entries(entries) => assert_eq!(entries.len(), 2),
            other => panic!("unexpected session: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_session_skips_pairing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        SessionStore::new(&settings.paths.session_file)
            .save(&[
                StorageEntry::new("WASecretBundle", "{}"),
                StorageEntry::new("logout-token", "tok"),
            ])
            .expect("save");

        let page = Arc::new(host_page());
        let (mut controller, shown) = controller(&settings, &page);

        assert_eq!(controller.start().await, ControlFlow::Continue(()));
        assert_eq!(page.reloads(), 1);
        assert!(shown.lock().is_empty());
        assert_eq!(page.attribute_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscanned_code_exits_zero() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        let page = Arc::new(host_page().with_pairing(vec![PairingStep::Code("ref-1")]));
        let (mut controller, _) = controller(&settings, &page);

        assert_eq!(controller.start().await, ControlFlow::Break(0));
        assert_eq!(page.listener_entries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_never_ready_exits_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        let page = Arc::new(host_page().with_listener_ready_after(usize::MAX));
        let (mut controller, _) = controller(&settings, &page);

        assert_eq!(controller.start().await, ControlFlow::Break(1));
    }

    #[tokio::test]
    async fn test_drain_logs_messages_and_skips_bad_ones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        let page = Arc::new(host_page().logged_in().with_listener_ready_after(0));
        let (mut controller, _) = controller(&settings, &page);
        controller.context().hook().install(page.as_ref()).await.expect("install");

        page.push_message(json!({"type": "chat", "t": 1, "from": "5511@c.us", "body": "hello"}));
        page.push_message(json!({"type": "chat"}));
        page.push_message(json!({"type": "location", "t": 2, "from": "5511@c.us"}));

        assert_eq!(controller.drain().await, ControlFlow::Continue(()));

        let log = std::fs::read_to_string(ChatLog::new(&settings.paths.chat_dir).path_for("5511"))
            .expect("chat log");
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("hello"));
        assert!(lines[1].ends_with(crate::message::UNSUPPORTED_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_media_without_key_is_still_logged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        let page = Arc::new(host_page().logged_in().with_listener_ready_after(0));
        let (mut controller, _) = controller(&settings, &page);
        controller.context().hook().install(page.as_ref()).await.expect("install");

        page.push_message(json!({
            "type": "image", "t": 1, "from": "5511@c.us",
            "mediaKey": null, "clientUrl": "http://127.0.0.1:9/never", "filehash": "h1"
        }));
        page.push_message(json!({"type": "chat", "t": 2, "from": "5511@c.us", "body": "after"}));

        assert_eq!(controller.drain().await, ControlFlow::Continue(()));
        assert!(controller.downloads.is_empty());

        let log = std::fs::read_to_string(ChatLog::new(&settings.paths.chat_dir).path_for("5511"))
            .expect("chat log");
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Image message (h1)"));
        assert!(lines[1].ends_with("after"));
    }

    #[tokio::test]
    async fn test_unwritable_media_dir_ends_session() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        std::fs::write(&settings.paths.chat_dir, b"not a directory").expect("block chat dir");

        let page = Arc::new(host_page().logged_in().with_listener_ready_after(0));
        let (mut controller, _) = controller(&settings, &page);
        controller.context().hook().install(page.as_ref()).await.expect("install");

        page.push_message(json!({
            "type": "image", "t": 1, "from": "5511@c.us",
            "mediaKey": "AQIDBA==", "clientUrl": "http://127.0.0.1:9/never", "filehash": "h1"
        }));
        assert_eq!(controller.drain().await, ControlFlow::Continue(()));
        assert_eq!(controller.downloads.len(), 1);

        let mut flow = ControlFlow::Continue(());
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flow = controller.drain().await;
            if flow.is_break() {
                break;
            }
        }
        assert_eq!(flow, ControlFlow::Break(1));
    }

    #[tokio::test]
    async fn test_logged_out_check_clears_session() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = settings(temp.path());
        let store = SessionStore::new(&settings.paths.session_file);
        store.save(&[StorageEntry::new("k", "v")]).expect("save");

        let page = Arc::new(host_page());
        let (mut controller, _) = controller(&settings, &page);

        assert_eq!(controller.check().await, ControlFlow::Break(0));
        assert_eq!(store.load().expect("load"), LoadedSession::NotFound);
    }
}
