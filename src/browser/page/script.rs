//! JavaScript execution methods.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{Command, ScriptCommand};

use super::Page;

// ============================================================================
// Page - Script Execution
// ============================================================================

impl Page {
    /// Executes a synchronous script body in the page context.
    ///
    /// Use `return` to produce a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptError`] if the script throws.
    pub async fn evaluate(&self, script: &str) -> Result<Value> {
        trace!(tab_id = %self.tab_id(), script_len = script.len(), "Evaluating script");

        let command = Command::Script(ScriptCommand::Evaluate {
            script: script.to_string(),
            args: Vec::new(),
        });
        self.send_command(command).await?.into_value()
    }

    /// Calls the function at `path` with JSON arguments.
    ///
    /// `path` is evaluated as an expression, so `window.a.b` is invoked with
    /// `this` bound to `window.a`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptError`] if the function is missing or throws.
    pub async fn call_function(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        debug!(tab_id = %self.tab_id(), %path, argc = args.len(), "Calling page function");
        self.evaluate(&call_script(path, &args)?).await
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Serializes a value as a JavaScript literal.
pub(crate) fn js_literal<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::Json)
}

/// Builds `return path(arg0, arg1, ...);`.
fn call_script(path: &str, args: &[Value]) -> Result<String> {
    let args = args.iter().map(js_literal).collect::<Result<Vec<_>>>()?;
    Ok(format!("return {path}({});", args.join(", ")))
}

// ============================================================================
// Tests
// ============================================================================
