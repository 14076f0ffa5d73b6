//! # opswalk - Operation Trees over SSH
//!
//! opswalk drives SSH sessions against a host inventory in parallel, walking
//! a caller-supplied operation tree on every host and collecting one ordered
//! response log per host. Operations are resumable state machines: each one
//! yields primitive commands, inspects the responses, and decides what to do
//! next, so conditional multi-step workflows (query, mutate, verify) read as
//! plain sequential code.
//!
//! ## Core Concepts
//!
//! - **Inventory**: ordered collection of hosts with connection parameters,
//!   authentication material, session options and group memberships
//! - **Command**: one primitive unit of work - a remote shell command, an
//!   SFTP action, or a passthrough marker
//! - **Response**: the structured result of one command on one host
//! - **Operation**: a resumable tree node that yields commands, child
//!   operations or prebuilt responses
//! - **Transport**: the per-host dispatch layer (SSH/SFTP) that turns
//!   commands into responses and never raises past its boundary
//! - **Engine**: the orchestrator fanning host drivers out in parallel and
//!   flattening their logs in inventory order
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │        (parallel fan-out, forks cap, cancellation)          │
//! └─────────────────────────────────────────────────────────────┘
//!                │                │                │
//!                ▼                ▼                ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   Host Driver    │ │   Host Driver    │ │   Host Driver    │
//! │  (one per host,  │ │                  │ │                  │
//! │   sequential)    │ │                  │ │                  │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │    Traversal     │ │    Traversal     │ │    Traversal     │
//! │ (DFS pre-order   │ │                  │ │                  │
//! │  op-tree walk)   │ │                  │ │                  │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │    Transport     │ │    Transport     │ │    Transport     │
//! │   (russh SSH +   │ │                  │ │                  │
//! │    SFTP session) │ │                  │ │                  │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use opswalk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let inventory = Inventory::load("inventory.json")?;
//!
//!     let engine = Engine::new(inventory)
//!         .with_config(EngineConfig { forks: Some(10), ..Default::default() });
//!
//!     let responses = engine
//!         .execute(|_item: &InventoryItem| -> Box<dyn Operation> {
//!             Box::new(Shell::new("uptime"))
//!         })
//!         .await;
//!
//!     for response in &responses {
//!         println!("{}: {}", response.host, response.stdout.trim());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! # Example
    //!
    //! ```rust,ignore
    //! use opswalk::prelude::*;
    //!
    //! #[tokio::main]
    //! async fn main() -> Result<()> {
    //!     let inventory = Inventory::load("inventory.json")?;
    //!     let responses = Engine::new(inventory)
    //!         .execute(|_item: &InventoryItem| -> Box<dyn Operation> {
    //!             Box::new(Shell::new("uptime"))
    //!         })
    //!         .await;
    //!     Ok(())
    //! }
    //! ```

    // Commands and responses
    pub use crate::command::{Command, CommandKind, Elevation, SftpAction};
    pub use crate::response::Response;

    // Error handling
    pub use crate::error::{Error, Result};

    // Engine
    pub use crate::engine::{Engine, EngineConfig};

    // Inventory
    pub use crate::inventory::{
        Authentication, ConnectionParams, HostContext, Inventory, InventoryItem, SessionOptions,
    };

    // Operations
    pub use crate::ops::{
        AptPackages, FileOp, Finished, OpError, OpResult, Operation, OperationFactory,
        PackageState, Sequence, Shell, Step,
    };

    // Transport layer
    pub use crate::transport::{
        SshTransport, SshTransportFactory, Transport, TransportError, TransportFactory,
        TransportResult,
    };
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// The top-level [`Error`](error::Error) covers the conditions that can stop
/// a run before drivers start; everything after that point folds into
/// responses instead of erroring.
pub mod error;

/// The primitive command model.
///
/// A [`Command`](command::Command) is one unit of work addressed at a group:
/// a remote shell command with optional elevation, an SFTP action, or a
/// passthrough marker that the transport answers without touching the host.
pub mod command;

/// The structured result model.
///
/// Every dispatched command produces exactly one
/// [`Response`](response::Response) capturing output, exit code, change
/// marker and error state.
pub mod response;

/// Host inventory management.
///
/// The inventory defines the target hosts, their connection parameters,
/// authentication material and group memberships, preserving insertion
/// order end to end.
pub mod inventory;

// ============================================================================
// Infrastructure
// ============================================================================

/// Transport layer for command dispatch.
///
/// Provides the [`Transport`](transport::Transport) trait and the
/// russh-backed SSH/SFTP implementation. Dispatch is total: failures fold
/// into the response's error field rather than propagating.
pub mod transport;

/// Operation trait and built-in operations.
///
/// Operations are resumable state machines yielding
/// [`Step`](ops::Step)s: primitive commands, child operations, prebuilt
/// responses, or completion. Built-ins cover shell commands, sequences,
/// apt package state and SFTP file management.
pub mod ops;

// ============================================================================
// Execution Engine
// ============================================================================

/// The execution engine.
///
/// [`Engine`](engine::Engine) fans one driver out per host, walks the
/// operation tree depth-first on each, and flattens the per-host response
/// logs in inventory order.
pub mod engine;

// ============================================================================
// CLI Support
// ============================================================================

/// Command-line interface definitions and output rendering.
pub mod cli;

/// Configuration file loading for the CLI.
pub mod config;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of opswalk.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
