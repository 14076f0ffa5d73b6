//! Command dispatch against targets.
//!
//! A [`Transport`] serves exactly one host. Dispatch never returns an error:
//! connection problems, authentication failures and timeouts are folded into
//! the response's `error` field, so the traversal above keeps walking and a
//! broken host only affects itself.
//!
//! Every transport's first duty is the group filter: a command addressed at
//! a group the host does not belong to is answered with a skipped response
//! before any connection work happens.

mod sftp;
mod ssh;

pub use ssh::{SshTransport, SshTransportFactory};

use async_trait::async_trait;
use thiserror::Error;

use crate::command::Command;
use crate::inventory::InventoryItem;
use crate::response::Response;

/// Result type alias for transport internals.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failures inside a transport. Folded into responses, never raised past
/// [`Transport::dispatch`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {host} failed: {message}")]
    ConnectionFailed { host: String, message: String },

    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("session closed")]
    SessionClosed,

    #[error("command was not enriched with host details")]
    NotEnriched,

    #[error("{0}")]
    Unsupported(String),
}

impl TransportError {
    /// Creates a connection failure.
    pub fn connection_failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Creates an execution failure.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    /// Creates a transfer failure.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::TransferFailed(message.into())
    }
}

/// A per-host dispatch channel.
#[async_trait]
pub trait Transport: Send {
    /// Executes one command and reports its outcome. Failures fold into the
    /// response; a non-zero remote exit is not a failure.
    async fn dispatch(&mut self, command: &Command) -> Response;

    /// Releases any open session. Called once when the host driver exits.
    async fn close(&mut self);
}

/// Creates transports, one per host driver.
pub trait TransportFactory: Send + Sync {
    fn create(&self, item: &InventoryItem) -> Box<dyn Transport>;
}

/// Applies the group filter. Returns the skipped response to record when the
/// host is not a member of the command's group, `None` when the command
/// should proceed.
pub fn group_filtered(command: &Command) -> Option<Response> {
    let ctx = command.global_info.as_ref()?;
    if ctx.permits(&command.group) {
        return None;
    }
    let host = command
        .host_info
        .as_ref()
        .map_or("", |params| params.host.as_str());
    let mut response = Response::skipped(host);
    response.name = command.name.clone();
    response.command = command.describe();
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryItem;

    fn enriched(command: Command, item: &InventoryItem) -> Command {
        let mut command = command;
        command.host_info = Some(item.connection.clone());
        command.global_info = Some(item.context());
        command
    }

    #[test]
    fn member_hosts_pass_the_filter() {
        let item = InventoryItem::new("web-1").with_group("web");
        let command = enriched(Command::remote("uptime").with_group("web"), &item);
        assert!(group_filtered(&command).is_none());
    }

    #[test]
    fn the_all_group_always_passes() {
        let item = InventoryItem::new("web-1");
        let command = enriched(Command::remote("uptime"), &item);
        assert!(group_filtered(&command).is_none());
    }

    #[test]
    fn non_members_get_a_skipped_response() {
        let item = InventoryItem::new("db-1");
        let command = enriched(
            Command::remote("systemctl reload nginx")
                .with_group("web")
                .with_name("reload"),
            &item,
        );
        let skipped = group_filtered(&command).unwrap();
        assert_eq!(skipped.host, "db-1");
        assert!(!skipped.executed);
        assert!(!skipped.changed);
        assert_eq!(skipped.return_code, None);
        assert_eq!(skipped.name.as_deref(), Some("reload"));
        assert!(skipped.error.is_none());
    }

    #[test]
    fn unenriched_commands_are_not_filtered() {
        let command = Command::remote("uptime").with_group("web");
        assert!(group_filtered(&command).is_none());
    }
}
