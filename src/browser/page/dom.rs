//! DOM queries.

use serde_json::Value;
use tracing::trace;

use crate::browser::AttributeProbe;
use crate::error::{Error, Result};

use super::{Page, js_literal};

impl Page {
    /// Reads attribute `name` from the first element matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the page answers with an unexpected shape.
    pub async fn attribute(&self, selector: &str, name: &str) -> Result<AttributeProbe> {
        let script = format!(
            "const el = document.querySelector({}); \
             if (!el) return {{present: false, value: null}}; \
             return {{present: true, value: el.getAttribute({}) || null}};",
            js_literal(selector)?,
            js_literal(name)?,
        );

        let value = self.evaluate(&script).await?;
        let probe = parse_probe(&value)?;
        trace!(%selector, ?probe, "Attribute probed");
        Ok(probe)
    }
}

/// Parses `{present, value}` into an [`AttributeProbe`].
fn parse_probe(value: &Value) -> Result<AttributeProbe> {
    let present = value
        .get("present")
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::protocol(format!("Unexpected attribute probe result: {value}")))?;

    if !present {
        return Ok(AttributeProbe::Absent);
    }

    let attr = value
        .get("value")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(AttributeProbe::Present(attr))
}
