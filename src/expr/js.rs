//! JavaScript expression host.
//!
//! Each evaluation is a synchronous RPC to a one-shot `node` child process:
//! the context is serialized in full, the script writes its JSON result to
//! stdout, and nothing persists between invocations. The single entry point
//! [`evaluate_js`] keeps the host swappable for an embedded engine.

use crate::error::{CwlError, Result};
use serde_json::Value as JsonValue;
use std::process::{Command, Stdio};

/// The two evaluable JavaScript forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsKind {
    /// `$(expr)` — an ECMAScript expression.
    Expression,
    /// `${ body }` — an ECMAScript function body with an implicit return.
    FunctionBody,
}

/// Evaluate a JavaScript fragment against the serialized context.
///
/// `lib` snippets are prepended to the program in order. Exceptions thrown
/// by the script come back as inspection errors carrying the original
/// fragment text.
pub fn evaluate_js(
    lib: &[String],
    code: &str,
    kind: JsKind,
    inputs: &JsonValue,
    runtime: &JsonValue,
    self_value: &JsonValue,
) -> Result<JsonValue> {
    let script = build_script(lib, code, kind, inputs, runtime, self_value);

    let output = Command::new("node")
        .arg("--no-warnings")
        .arg("-e")
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            CwlError::inspection_error(format!("failed to invoke the JavaScript host: {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CwlError::inspection_error(format!(
            "expression `{}` failed: {}",
            code,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "undefined" {
        return Ok(JsonValue::Null);
    }
    serde_json::from_str(trimmed).map_err(|e| {
        CwlError::inspection_error(format!(
            "expression `{}` produced non-JSON output `{}`: {}",
            code, trimmed, e
        ))
    })
}

/// Assemble the script handed to the host.
fn build_script(
    lib: &[String],
    code: &str,
    kind: JsKind,
    inputs: &JsonValue,
    runtime: &JsonValue,
    self_value: &JsonValue,
) -> String {
    let body = match kind {
        JsKind::Expression => format!("return ({});", code),
        JsKind::FunctionBody => code.to_string(),
    };
    let mut script = String::new();
    script.push_str("\"use strict\";\n");
    script.push_str(&format!("var inputs = {};\n", inputs));
    script.push_str(&format!("var self = {};\n", self_value));
    script.push_str(&format!("var runtime = {};\n", runtime));
    for snippet in lib {
        script.push_str(snippet);
        script.push('\n');
    }
    script.push_str(&format!("var __out = (function() {{ {} }})();\n", body));
    script.push_str(
        "process.stdout.write(JSON.stringify(__out === undefined ? null : __out));\n",
    );
    script
}

/// Whether a `node` binary is reachable. Used by tests to skip when the
/// host is absent.
pub fn host_available() -> bool {
    Command::new("node")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
