//! Per-host execution loop.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::traversal::{Emitted, Traversal};
use crate::inventory::InventoryItem;
use crate::ops::OperationFactory;
use crate::response::Response;
use crate::transport::Transport;

/// Drives one host: walks a fresh operation tree and dispatches every
/// command through the host's transport, strictly one at a time.
pub(crate) struct HostDriver {
    item: InventoryItem,
    transport: Box<dyn Transport>,
    cancel: CancellationToken,
}

impl HostDriver {
    pub(crate) fn new(
        item: InventoryItem,
        transport: Box<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            item,
            transport,
            cancel,
        }
    }

    /// Runs the tree to completion and returns the host's ordered response
    /// log. On cancellation the remaining traversal is discarded and the
    /// partial log is returned. The transport is released on every exit
    /// path.
    pub(crate) async fn run(mut self, factory: &dyn OperationFactory) -> Vec<Response> {
        let host = self.item.host().to_string();
        let root = factory.build(&self.item);
        let mut traversal = Traversal::new(&host, root);
        let mut log = Vec::new();
        debug!(host = %host, "driver started");

        loop {
            if self.cancel.is_cancelled() {
                debug!(host = %host, "cancelled, returning partial log");
                break;
            }
            let Some(emitted) = traversal.next_unit().await else {
                break;
            };
            let response = match emitted {
                Emitted::Command(mut command) => {
                    command.host_info = Some(self.item.connection.clone());
                    command.global_info = Some(self.item.context());
                    let dispatched = tokio::select! {
                        _ = self.cancel.cancelled() => None,
                        response = self.transport.dispatch(&command) => Some(response),
                    };
                    match dispatched {
                        Some(response) => response,
                        None => {
                            debug!(host = %host, "cancelled mid-dispatch");
                            break;
                        }
                    }
                }
                Emitted::Synthetic(response) => response,
            };
            log.push(response.clone());
            traversal.feed(response);
        }

        self.transport.close().await;
        debug!(host = %host, responses = log.len(), "driver finished");
        log
    }
}
