//! Page navigation methods.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{BrowsingContextCommand, Command, ParsedEvent};

use super::Page;

// ============================================================================
// Page - Navigation
// ============================================================================

impl Page {
    /// Navigates to a URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension rejects the navigation.
    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!(%url, tab_id = %self.tab_id(), "Navigating");

        let command = Command::BrowsingContext(BrowsingContextCommand::Navigate {
            url: url.to_string(),
        });
        self.send_command(command).await?;
        Ok(())
    }

    /// Reloads the page and waits for the new document's DOMContentLoaded.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if DOMContentLoaded does not arrive within `limit`
    /// - [`Error::Protocol`] if the navigation fails
    pub async fn reload(&self, limit: Duration) -> Result<()> {
        debug!(tab_id = %self.tab_id(), "Reloading page");

        let deadline = Instant::now() + limit;
        let mut events = self.connection().subscribe();

        self.send_command(Command::BrowsingContext(BrowsingContextCommand::Reload))
            .await?;

        let tab_id = self.tab_id().as_u32();
        let waited = timeout_at(deadline, async {
            loop {
                match events.recv().await {
                    Ok(ParsedEvent::DomContentLoaded { tab_id: t, url }) if t == tab_id => {
                        debug!(%url, "Page reloaded");
                        return Ok(());
                    }
                    Ok(ParsedEvent::NavigationFailed { tab_id: t, url, error }) if t == tab_id => {
                        return Err(Error::protocol(format!("Reload of {url} failed: {error}")));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed browser events while waiting for reload");
                    }
                    Err(RecvError::Closed) => return Err(Error::ConnectionClosed),
                }
            }
        })
        .await;

        waited.map_err(|_| Error::timeout("page reload", limit.as_millis() as u64))?
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::testing::{Reply, connect};
    use super::*;

    #[tokio::test]
    async fn test_reload_waits_for_dom_content_loaded() {
        let page = connect(|method, _| match method {
            "browsingContext.reload" => Reply::ok(json!({})).then(
                "browsingContext.domContentLoaded",
                json!({"tabId": 1, "url": "https://web.whatsapp.com/"}),
            ),
            _ => Reply::ok(json!({})),
        })
        .await;

        page.reload(Duration::from_secs(5)).await.expect("reload");
    }

    #[tokio::test]
    async fn test_reload_ignores_other_tabs_and_times_out() {
        let page = connect(|_, _| {
            Reply::ok(json!({})).then(
                "browsingContext.domContentLoaded",
                json!({"tabId": 9, "url": "about:blank"}),
            )
        })
        .await;

        let err = page
            .reload(Duration::from_millis(200))
            .await
            .expect_err("other tab's event must not count");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_reload_reports_navigation_failure() {
        let page = connect(|_, _| {
            Reply::ok(json!({})).then(
                "browsingContext.navigationFailed",
                json!({"tabId": 1, "url": "https://web.whatsapp.com/", "error": "NS_ERROR_OFFLINE"}),
            )
        })
        .await;

        let err = page.reload(Duration::from_secs(5)).await.expect_err("fails");
        assert!(err.to_string().contains("NS_ERROR_OFFLINE"));
    }
}
