//! Screenshot capture and extension log retrieval.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{BrowsingContextCommand, Command, SessionCommand};

use super::Page;

impl Page {
    /// Captures the visible tab as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response carries no valid image.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let command = Command::BrowsingContext(BrowsingContextCommand::CaptureScreenshot {
            format: "png".to_string(),
            quality: None,
        });
        let response = self.send_command(command).await?;

        let data = response.get_string("data");
        if data.is_empty() {
            return Err(Error::protocol("Screenshot response carried no data"));
        }

        let bytes = Base64Standard
            .decode(data.as_bytes())
            .map_err(|e| Error::protocol(format!("Invalid screenshot data: {e}")))?;

        debug!(tab_id = %self.tab_id(), size = bytes.len(), "Captured screenshot");
        Ok(bytes)
    }

    /// Takes and clears the extension's buffered logs.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn browser_logs(&self) -> Result<Vec<Value>> {
        let response = self
            .send_command(Command::Session(SessionCommand::StealLogs))
            .await?;

        Ok(response
            .result
            .as_ref()
            .and_then(|v| v.get("logs"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}
