//! QR pairing.
//!
//! [`PairingStateMachine`] shows the host's pairing code, follows its
//! rotations and decides how pairing ended:
//!
//! | Outcome | When |
//! |---------|------|
//! | [`PairingOutcome::Scanned`] | Code element disappeared and both login markers appeared |
//! | [`PairingOutcome::Timeout`] | Code element still present at the deadline |
//! | [`PairingOutcome::Error`] | Code element disappeared but login never completed |
//!
//! An element that is present with an unreadable code is a hard error
//! ([`Error::PairingCode`]), not an outcome.

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, Write};
use std::time::Duration;

use qrcode::{Color, EcLevel, QrCode};
use tracing::{debug, info, warn};

use crate::browser::{AttributeProbe, PageHandle};
use crate::config::Timings;
use crate::error::{Error, Result};
use crate::host::LoginMarkers;
use crate::wait::{deadline_in, race, ticker};

// ============================================================================
// Constants
// ============================================================================

/// Selector of the element carrying the pairing code.
pub const QR_SELECTOR: &str = "[data-ref]";

/// Attribute holding the pairing code.
pub const CODE_ATTRIBUTE: &str = "data-ref";

/// Quiet zone around the rendered code, in modules.
const QUIET_ZONE: usize = 2;

// ============================================================================
// Outcomes
// ============================================================================

/// How pairing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The code was scanned and the session is logged in.
    Scanned,
    /// Nobody scanned before the deadline.
    Timeout,
    /// The code disappeared without a login.
    Error,
}

/// Result of waiting for the login markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Both markers present.
    LoggedIn,
    /// The wait ran out.
    Timeout,
}

// ============================================================================
// Login Markers
// ============================================================================

/// Returns `true` if both login markers are set and non-empty.
///
/// # Errors
///
/// Returns an error if storage cannot be read.
pub async fn is_logged_in(page: &dyn PageHandle, markers: &LoginMarkers) -> Result<bool> {
    let present = |v: Option<String>| v.is_some_and(|s| !s.is_empty());
    Ok(present(page.storage_get(&markers.secret_bundle).await?)
        && present(page.storage_get(&markers.logout_token).await?))
}

/// Polls the login markers every `poll` for at most `limit`.
///
/// # Errors
///
/// Returns an error if storage cannot be read.
pub async fn wait_for_login(
    page: &dyn PageHandle,
    markers: &LoginMarkers,
    poll: Duration,
    limit: Duration,
) -> Result<LoginState> {
    let outcome = race(deadline_in(limit), async {
        let mut tick = ticker(poll);
        loop {
            tick.tick().await;
            if is_logged_in(page, markers).await? {
                return Ok::<_, Error>(LoginState::LoggedIn);
            }
        }
    })
    .await;

    outcome.unwrap_or(Ok(LoginState::Timeout))
}

// ============================================================================
// Pairing Code
// ============================================================================

/// Reads the current pairing code; `None` if the element is gone.
///
/// # Errors
///
/// Returns [`Error::PairingCode`] if the element is present without a code.
pub async fn read_code(page: &dyn PageHandle) -> Result<Option<String>> {
    match page.attribute(QR_SELECTOR, CODE_ATTRIBUTE).await? {
        AttributeProbe::Absent => Ok(None),
        AttributeProbe::Present(Some(code)) => Ok(Some(code)),
        AttributeProbe::Present(None) => Err(Error::pairing_code(format!(
            "{QR_SELECTOR} has no {CODE_ATTRIBUTE}"
        ))),
    }
}

/// Polls until the pairing element shows a code.
///
/// # Errors
///
/// Returns [`Error::PairingCode`] if no code appears within `limit`.
pub async fn wait_for_code(page: &dyn PageHandle, poll: Duration, limit: Duration) -> Result<String> {
    let outcome = race(deadline_in(limit), async {
        let mut tick = ticker(poll);
        loop {
            tick.tick().await;
            if let Some(code) = read_code(page).await? {
                return Ok::<_, Error>(code);
            }
        }
    })
    .await;

    outcome.unwrap_or_else(|| {
        Err(Error::pairing_code(format!(
            "no pairing code within {}ms",
            limit.as_millis()
        )))
    })
}

// ============================================================================
// CodeDisplay
// ============================================================================

/// Where pairing codes are shown.
pub trait CodeDisplay: Send {
    /// Shows `code`, replacing whatever was shown before.
    fn show(&mut self, code: &str);
}

impl<D: CodeDisplay + ?Sized> CodeDisplay for &mut D {
    fn show(&mut self, code: &str) {
        (**self).show(code);
    }
}

impl<D: CodeDisplay + ?Sized> CodeDisplay for Box<D> {
    fn show(&mut self, code: &str) {
        (**self).show(code);
    }
}

/// Draws codes as QR blocks on stdout.
#[derive(Debug, Default)]
pub struct TerminalQr;

impl CodeDisplay for TerminalQr {
    fn show(&mut self, code: &str) {
        let lines = match render_qr(code) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Cannot render pairing code");
                return;
            }
        };

        let mut out = io::stdout().lock();
        // Clear screen, cursor home.
        let _ = write!(out, "\x1B[2J\x1B[H");
        info!("Scan the following QR code with your phone");
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }
}

/// Renders `data` as terminal rows, two modules per row.
///
/// Light modules are drawn so the code reads correctly on a dark terminal.
///
/// # Errors
///
/// Returns [`Error::PairingCode`] if `data` does not fit in a QR code.
pub fn render_qr(data: &str) -> Result<Vec<String>> {
    let code = QrCode::with_error_correction_level(data, EcLevel::L)
        .map_err(|e| Error::pairing_code(e.to_string()))?;

    let colors = code.to_colors();
    let size = code.width();
    let total = size + QUIET_ZONE * 2;

    let light = |x: usize, y: usize| -> bool {
        if x < QUIET_ZONE || y < QUIET_ZONE {
            return true;
        }
        let (qx, qy) = (x - QUIET_ZONE, y - QUIET_ZONE);
        if qx >= size || qy >= size {
            return true;
        }
        colors[qy * size + qx] == Color::Light
    };

    let mut lines = Vec::with_capacity(total.div_ceil(2));
    for pair in 0..total.div_ceil(2) {
        let (upper_y, lower_y) = (pair * 2, pair * 2 + 1);
        let line: String = (0..total)
            .map(|x| {
                let upper = light(x, upper_y);
                let lower = lower_y < total && light(x, lower_y);
                match (upper, lower) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                }
            })
            .collect();
        lines.push(line);
    }
    Ok(lines)
}

// ============================================================================
// PairingStateMachine
// ============================================================================

/// Intermediate result of the rotation poll.
enum Poll {
    /// The code element disappeared.
    Gone,
}

/// Runs one pairing attempt.
pub struct PairingStateMachine<'a, D> {
    page: &'a dyn PageHandle,
    markers: &'a LoginMarkers,
    timings: &'a Timings,
    display: D,
}

impl<'a, D: CodeDisplay> PairingStateMachine<'a, D> {
    /// Creates a state machine over `page`.
    pub fn new(page: &'a dyn PageHandle, markers: &'a LoginMarkers, timings: &'a Timings, display: D) -> Self {
        Self {
            page,
            markers,
            timings,
            display,
        }
    }

    /// Returns the display, e.g. to inspect what was shown.
    pub fn into_display(self) -> D {
        self.display
    }

    /// Shows `code` and waits for exactly one outcome.
    ///
    /// The deadline is `give_up_wait` minus the expiration margin. When the
    /// element disappears the deadline is dropped and the login wait starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PairingCode`] if a present code cannot be read, or
    /// any page error.
    pub async fn run(&mut self, code: String, give_up_wait: Duration) -> Result<PairingOutcome> {
        let limit = give_up_wait.saturating_sub(self.timings.expiration_margin);
        debug!(limit_ms = limit.as_millis() as u64, "Pairing started");

        self.display.show(&code);

        let page = self.page;
        let display = &mut self.display;
        let poll = self.timings.pairing_poll;

        let rotation = race(deadline_in(limit), async move {
            let mut last = code;
            let mut tick = ticker(poll);
            loop {
                tick.tick().await;
                match read_code(page).await? {
                    None => return Ok::<_, Error>(Poll::Gone),
                    Some(current) if current != last => {
                        debug!("Pairing code rotated");
                        display.show(&current);
                        last = current;
                    }
                    Some(_) => {}
                }
            }
        })
        .await;

        match rotation {
            None => {
                info!("Pairing code was not scanned in time");
                Ok(PairingOutcome::Timeout)
            }
            Some(Err(e)) => Err(e),
            Some(Ok(Poll::Gone)) => {
                debug!("Pairing code consumed, waiting for login");
                let state = wait_for_login(
                    self.page,
                    self.markers,
                    self.timings.login_poll,
                    self.timings.login_timeout,
                )
                .await?;

                Ok(match state {
                    LoginState::LoggedIn => PairingOutcome::Scanned,
                    LoginState::Timeout => PairingOutcome::Error,
                })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::browser::fake::{FakePage, PairingStep};

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl CodeDisplay for Recorder {
        fn show(&mut self, code: &str) {
            self.0.push(code.to_string());
        }
    }

    const GIVE_UP: Duration = Duration::from_secs(20);

    fn within(elapsed: Duration, expected: Duration) -> bool {
        elapsed >= expected && elapsed < expected + Duration::from_millis(50)
    }

    /// Nothing keeps polling the code element once the outcome is known.
    async fn assert_no_late_reads(page: &FakePage) {
        let reads = page.attribute_reads();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(page.attribute_reads(), reads);
    }

    async fn run(page: &FakePage) -> (Result<PairingOutcome>, Vec<String>) {
        let timings = Timings::default();
        let markers = LoginMarkers::default();
        let mut machine = PairingStateMachine::new(page, &markers, &timings, Recorder::default());
        let outcome = machine.run("a".to_string(), GIVE_UP).await;
        (outcome, machine.into_display().0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_then_scan() {
        let page = FakePage::new().with_pairing(vec![
            PairingStep::Code("a"),
            PairingStep::Code("b"),
            PairingStep::Code("b"),
            PairingStep::GoneAndLogin,
        ]);

        let (outcome, shown) = run(&page).await;
        assert_eq!(outcome.expect("outcome"), PairingOutcome::Scanned);
        assert_eq!(shown, ["a", "b"]);
        assert_no_late_reads(&page).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscanned_code_times_out_at_margin() {
        let page = FakePage::new().with_pairing(vec![PairingStep::Code("a")]);
        let start = Instant::now();

        let (outcome, shown) = run(&page).await;
        assert_eq!(outcome.expect("outcome"), PairingOutcome::Timeout);
        assert!(within(start.elapsed(), Duration::from_secs(17)));
        assert_eq!(shown, ["a"]);
        assert_no_late_reads(&page).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gone_without_login_is_error() {
        let page = FakePage::new().with_pairing(vec![PairingStep::Code("a"), PairingStep::Gone]);
        let start = Instant::now();

        let (outcome, _) = run(&page).await;
        assert_eq!(outcome.expect("outcome"), PairingOutcome::Error);
        // Two pairing polls, then the full login wait.
        assert!(within(start.elapsed(), Duration::from_secs(11)));
        assert_no_late_reads(&page).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_code_is_fatal() {
        let page = FakePage::new().with_pairing(vec![PairingStep::Unreadable]);
        let (outcome, _) = run(&page).await;
        assert!(matches!(outcome, Err(Error::PairingCode { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_code() {
        let page = FakePage::new().with_pairing(vec![PairingStep::Gone, PairingStep::Code("xyz")]);
        let code = wait_for_code(&page, Duration::from_millis(500), Duration::from_secs(5))
            .await
            .expect("code");
        assert_eq!(code, "xyz");
    }

    #[tokio::test]
    async fn test_is_logged_in_needs_both_markers() {
        let markers = LoginMarkers::default();
        let page = FakePage::new().with_storage("WASecretBundle", "{}");
        assert!(!is_logged_in(&page, &markers).await.expect("check"));

        page.set_storage("logout-token", "t");
        assert!(is_logged_in(&page, &markers).await.expect("check"));

        page.set_storage("logout-token", "");
        assert!(!is_logged_in(&page, &markers).await.expect("check"));
    }

    #[test]
    fn test_render_qr_is_square_ish() {
        let lines = render_qr("2@abcdef,ghijkl,mnopqr").expect("render");
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
        assert_eq!(lines.len(), width.div_ceil(2));
        // Quiet zone rows are fully light.
        assert!(lines[0].chars().all(|c| c == '█'));
    }
}
