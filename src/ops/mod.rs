//! The operation contract and the built-in operations.
//!
//! An operation is a resumable unit of work against a single host. Each
//! [`Operation::advance`] call receives the outcome of its previous step and
//! yields the next one: a command for the transport, a sub-operation to
//! descend into, a pre-built response, or `Done`. The traversal engine in
//! [`crate::engine`] drives the stepping; operations never talk to a
//! transport themselves.

pub mod apt;
pub mod files;
pub mod shell;

pub use apt::{AptPackages, PackageState};
pub use files::FileOp;
pub use shell::{Sequence, Shell};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::command::Command;
use crate::inventory::InventoryItem;
use crate::response::Response;

/// Result type alias for operation stepping.
pub type OpResult<T> = std::result::Result<T, OpError>;

/// Failure raised by an operation while stepping.
///
/// The traversal converts these into synthetic error responses against the
/// current host and keeps walking the rest of the tree; they never abort a
/// run.
#[derive(Debug, Error)]
pub enum OpError {
    /// The operation cannot make sense of the response it was resumed with.
    #[error("unexpected response: {0}")]
    BadResponse(String),

    /// The operation was resumed without the response it was waiting for.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// A step the operation depends on failed.
    #[error("{0}")]
    Failed(String),
}

impl OpError {
    /// Creates a failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates a bad-response failure.
    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::BadResponse(message.into())
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Terminal state of an operation, shaping the aggregate its parent sees.
#[derive(Debug, Clone, Default)]
pub struct Finished {
    /// Replaces the rolled-up response list as the aggregate value.
    pub value: Option<Value>,

    /// Overrides the aggregate's derived changed flag.
    pub changed: Option<bool>,
}

impl Finished {
    /// Finishes with the default aggregate: the ordered child responses and
    /// a changed flag derived from them.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit aggregate value.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Forces the aggregate's changed flag.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = Some(changed);
        self
    }
}

/// One step of an operation.
pub enum Step {
    /// Dispatch a command; the operation resumes with its response.
    Command(Command),

    /// Descend into a sub-operation; the operation resumes with the
    /// aggregate response of the whole subtree.
    Operation(Box<dyn Operation>),

    /// Record a pre-built response without dispatching anything; the
    /// operation resumes with it unchanged.
    Response(Response),

    /// Finish this operation.
    Done(Finished),
}

impl Step {
    /// Finishes with the default aggregate.
    pub fn done() -> Self {
        Step::Done(Finished::new())
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Step::Operation(op) => write!(f, "Operation({})", op.name()),
            Step::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Step::Done(finished) => f.debug_tuple("Done").field(finished).finish(),
        }
    }
}

// ============================================================================
// The operation trait
// ============================================================================

/// A resumable unit of work against a single host.
#[async_trait]
pub trait Operation: Send {
    /// Short name used in logs and aggregate responses.
    fn name(&self) -> &str;

    /// Advances to the next step.
    ///
    /// `prev` is `None` on the first call. After a [`Step::Command`] or
    /// [`Step::Response`] the next call receives that step's response; after
    /// a [`Step::Operation`] it receives the sub-operation's aggregate
    /// response.
    async fn advance(&mut self, prev: Option<Response>) -> OpResult<Step>;
}

/// Builds a fresh operation tree for each host.
///
/// The engine calls this once per inventory item, so trees can consult
/// `host_vars` and group memberships while being built, and per-host state
/// never leaks between hosts.
pub trait OperationFactory: Send + Sync {
    fn build(&self, item: &InventoryItem) -> Box<dyn Operation>;
}

impl<F> OperationFactory for F
where
    F: Fn(&InventoryItem) -> Box<dyn Operation> + Send + Sync,
{
    fn build(&self, item: &InventoryItem) -> Box<dyn Operation> {
        self(item)
    }
}
