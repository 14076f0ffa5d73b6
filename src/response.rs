//! Structured execution results.
//!
//! Every primitive command dispatched against a host produces exactly one
//! [`Response`], whether it ran, was filtered out by group membership, or
//! failed inside the transport. Synthetic responses (operation failures,
//! pre-built records yielded by operations) use the same shape, so a per-host
//! log is always a flat list of one type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

/// Outcome of one primitive command against one host.
///
/// The absence of [`error`](Self::error) means success; a non-zero
/// [`return_code`](Self::return_code) on its own does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Host the command was addressed to.
    pub host: String,

    /// Label carried over from the originating command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Echo of the command string, or a description of the local action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Captured standard output, lossily decoded as UTF-8.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    /// Captured standard error, lossily decoded as UTF-8.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,

    /// Exit code of the remote process, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,

    /// Whether the command may have altered host state.
    #[serde(default)]
    pub changed: bool,

    /// Failure description. `None` means the command succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// False when the command never reached the host (group filter, skipped
    /// work inside an operation).
    #[serde(default = "default_true")]
    pub executed: bool,

    /// Arbitrary payload: local action results, aggregated child responses.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl Response {
    /// Creates an executed, unchanged response with empty output.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: None,
            command: None,
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
            changed: false,
            error: None,
            executed: true,
            value: Value::Null,
        }
    }

    /// Creates a response for a command that was filtered out before
    /// reaching the host.
    pub fn skipped(host: impl Into<String>) -> Self {
        Self {
            executed: false,
            ..Self::new(host)
        }
    }

    /// Creates a response for a command that failed inside the transport.
    pub fn failure(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            return_code: Some(1),
            error: Some(message.into()),
            ..Self::new(host)
        }
    }

    /// Sets the label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the command echo.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Sets captured stdout and stderr.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Sets the remote exit code.
    pub fn with_return_code(mut self, code: i32) -> Self {
        self.return_code = Some(code);
        self
    }

    /// Sets the changed flag.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    /// Sets the failure description.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Sets the payload value.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Returns true if the command did not fail.
    ///
    /// A non-zero exit code without a transport or operation failure still
    /// counts as success; callers inspect [`return_code`](Self::return_code)
    /// themselves when exit status matters.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
