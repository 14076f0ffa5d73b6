//! Run orchestration: parallel fan-out across hosts, ordered flattening.
//!
//! The [`Engine`] spawns one [`HostDriver`] task per inventory item. Hosts
//! run independently and in parallel (optionally capped by
//! [`EngineConfig::forks`]); within a host everything is strictly
//! sequential. The flattened log concatenates per-host logs in inventory
//! order, regardless of which host finished first, and a crashed driver is
//! reduced to a single synthetic error response so no host ever silently
//! disappears from a run.
//!
//! [`HostDriver`]: driver::HostDriver

mod driver;
mod traversal;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::inventory::Inventory;
use crate::ops::OperationFactory;
use crate::response::Response;
use crate::transport::{SshTransportFactory, TransportFactory};

use driver::HostDriver;

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cap on concurrently running host drivers. `None` runs every host at
    /// once.
    pub forks: Option<usize>,

    /// Per-command timeout applied by the SSH transport. Expiry folds into
    /// an error response; the host keeps walking its tree.
    pub command_timeout: Option<Duration>,

    /// TCP connect plus handshake timeout for new SSH sessions.
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forks: None,
            command_timeout: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Executes operation trees against every host of an inventory.
///
/// The engine is an explicit value holding everything a run needs: the
/// inventory, a transport factory and the tuning knobs. Nothing about a run
/// lives in global state.
pub struct Engine {
    inventory: Inventory,
    transports: Option<Arc<dyn TransportFactory>>,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl Engine {
    /// Creates an engine over `inventory` with the SSH transport and
    /// default configuration.
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            transports: None,
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the transport factory. Tests inject scripted transports
    /// here.
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    /// The inventory this engine runs against.
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Token that cancels every in-flight host driver when triggered.
    /// Cancelled drivers return their partial logs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the current run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn transport_factory(&self) -> Arc<dyn TransportFactory> {
        match &self.transports {
            Some(factory) => Arc::clone(factory),
            None => {
                let mut factory =
                    SshTransportFactory::new().with_connect_timeout(self.config.connect_timeout);
                if let Some(timeout) = self.config.command_timeout {
                    factory = factory.with_command_timeout(timeout);
                }
                Arc::new(factory)
            }
        }
    }

    /// Runs one operation tree per host and returns the flattened log.
    ///
    /// The factory is called once per host, in inventory order; each tree
    /// walks on its own task. Per-host logs are concatenated in inventory
    /// order.
    pub async fn execute<F>(&self, ops: F) -> Vec<Response>
    where
        F: OperationFactory + 'static,
    {
        let run_id = Uuid::new_v4();
        let ops: Arc<dyn OperationFactory> = Arc::new(ops);
        let transports = self.transport_factory();
        let semaphore = self
            .config
            .forks
            .map(|forks| Arc::new(Semaphore::new(forks.max(1))));

        info!(
            %run_id,
            hosts = self.inventory.len(),
            forks = ?self.config.forks,
            "run started"
        );

        let mut handles = Vec::with_capacity(self.inventory.len());
        for item in self.inventory.items() {
            let item = item.clone();
            let ops = Arc::clone(&ops);
            let transports = Arc::clone(&transports);
            let semaphore = semaphore.clone();
            let cancel = self.cancel.child_token();
            handles.push(tokio::spawn(async move {
                let _permit = match &semaphore {
                    Some(semaphore) => {
                        Some(Arc::clone(semaphore).acquire_owned().await.unwrap())
                    }
                    None => None,
                };
                let transport = transports.create(&item);
                HostDriver::new(item, transport, cancel).run(ops.as_ref()).await
            }));
        }

        let hosts: Vec<String> = self.inventory.hosts().map(String::from).collect();
        let results = join_all(handles).await;

        let mut flattened = Vec::new();
        for (host, result) in hosts.into_iter().zip(results) {
            match result {
                Ok(responses) => {
                    debug!(host = %host, responses = responses.len(), "host finished");
                    flattened.extend(responses);
                }
                Err(err) => {
                    error!(host = %host, error = %err, "host driver crashed");
                    flattened.push(
                        Response::skipped(&host)
                            .with_name("driver")
                            .with_error(format!("host driver crashed: {err}")),
                    );
                }
            }
        }

        info!(%run_id, responses = flattened.len(), "run finished");
        flattened
    }
}
