//! Shared test utilities for the opswalk test suite.
//!
//! This module provides:
//! - `MockTransportFactory` / `MockTransport`: a scripted transport that
//!   records every dispatch, answers remote commands from canned results,
//!   and can fail whole hosts or hang on chosen commands
//! - Inventory fixtures
//! - Operations with scripted behavior for driving the engine
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use opswalk::command::{Command, CommandKind};
use opswalk::inventory::{Inventory, InventoryItem};
use opswalk::ops::{OpResult, Operation, Step};
use opswalk::response::Response;
use opswalk::transport::{group_filtered, Transport, TransportFactory};

// ============================================================================
// Canned Results
// ============================================================================

/// One scripted result for a remote command.
#[derive(Debug, Clone)]
pub struct CannedResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    pub error: Option<String>,
}

impl CannedResult {
    /// A clean zero-exit result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            return_code: 0,
            error: None,
        }
    }

    /// A non-zero exit with stderr. Still a normal response, not an error.
    pub fn exit(return_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            return_code,
            error: None,
        }
    }

    /// A dispatch failure folded into the response's error field.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            return_code: 1,
            error: Some(message.into()),
        }
    }
}

impl Default for CannedResult {
    fn default() -> Self {
        Self::ok("")
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// A dispatch observed by the mock transport.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub host: String,
    pub command: Command,
    /// False when the group filter answered with a skipped response.
    pub executed: bool,
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<HashMap<String, VecDeque<CannedResult>>>,
    failing_hosts: Mutex<HashSet<String>>,
    hang_needle: Mutex<Option<String>>,
    records: Mutex<Vec<DispatchRecord>>,
    closed: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Builds scripted [`MockTransport`]s and collects what they observed.
///
/// Clones share state, so a test can keep one handle for assertions and hand
/// a clone to the engine.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    shared: Arc<Shared>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a result for remote commands containing `needle`. Queued
    /// results are consumed in order; the last one repeats.
    pub fn script(&self, needle: impl Into<String>, result: CannedResult) {
        self.shared
            .scripts
            .lock()
            .unwrap()
            .entry(needle.into())
            .or_default()
            .push_back(result);
    }

    /// Every dispatch on `host` produces a failure response.
    pub fn fail_host(&self, host: impl Into<String>) {
        self.shared.failing_hosts.lock().unwrap().insert(host.into());
    }

    /// Remote commands containing `needle` never complete. The driver's
    /// cancellation is the only way out.
    pub fn hang_on(&self, needle: impl Into<String>) {
        *self.shared.hang_needle.lock().unwrap() = Some(needle.into());
    }

    /// Every dispatch seen so far, in arrival order.
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.shared.records.lock().unwrap().clone()
    }

    /// Remote command strings executed on `host`, excluding skipped ones.
    pub fn executed_on(&self, host: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|record| record.host == host && record.executed)
            .filter_map(|record| record.command.remote_command().map(str::to_string))
            .collect()
    }

    /// Hosts whose transport was closed, one entry per close call.
    pub fn closed_hosts(&self) -> Vec<String> {
        self.shared.closed.lock().unwrap().clone()
    }

    /// Highest number of concurrently in-flight dispatches observed.
    pub fn max_active(&self) -> usize {
        self.shared.max_active.load(Ordering::SeqCst)
    }

    fn take_script(&self, command: &str) -> CannedResult {
        let mut scripts = self.shared.scripts.lock().unwrap();
        for (needle, queue) in scripts.iter_mut() {
            if command.contains(needle.as_str()) {
                return match queue.len() {
                    0 => CannedResult::default(),
                    1 => queue.front().cloned().unwrap_or_default(),
                    _ => queue.pop_front().unwrap_or_default(),
                };
            }
        }
        CannedResult::default()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, item: &InventoryItem) -> Box<dyn Transport> {
        Box::new(MockTransport {
            host: item.host().to_string(),
            factory: self.clone(),
        })
    }
}

/// Scripted per-host transport handed out by [`MockTransportFactory`].
pub struct MockTransport {
    host: String,
    factory: MockTransportFactory,
}

impl MockTransport {
    fn record(&self, command: &Command, executed: bool) {
        self.factory
            .shared
            .records
            .lock()
            .unwrap()
            .push(DispatchRecord {
                host: self.host.clone(),
                command: command.clone(),
                executed,
            });
    }

    fn stamp(command: &Command, mut response: Response) -> Response {
        response.name = command.name.clone();
        response.command = command.describe();
        response
    }

    async fn respond(&self, command: &Command) -> Response {
        if self
            .factory
            .shared
            .failing_hosts
            .lock()
            .unwrap()
            .contains(&self.host)
        {
            return Response::failure(&self.host, "mock connection failed");
        }

        match &command.kind {
            CommandKind::Passthrough => Response::new(&self.host),
            CommandKind::Remote {
                command: remote, ..
            } => {
                let hang = self
                    .factory
                    .shared
                    .hang_needle
                    .lock()
                    .unwrap()
                    .clone();
                if let Some(needle) = hang {
                    if remote.contains(&needle) {
                        std::future::pending::<()>().await;
                    }
                }

                let canned = self.factory.take_script(remote);
                match canned.error {
                    Some(message) => Response::failure(&self.host, message),
                    None => Response::new(&self.host)
                        .with_output(canned.stdout, canned.stderr)
                        .with_return_code(canned.return_code)
                        .with_changed(true),
                }
            }
            CommandKind::Local { .. } => Response::new(&self.host)
                .with_return_code(0)
                .with_changed(true),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn dispatch(&mut self, command: &Command) -> Response {
        if let Some(skipped) = group_filtered(command) {
            self.record(command, false);
            return skipped;
        }

        let shared = &self.factory.shared;
        let active = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_active.fetch_max(active, Ordering::SeqCst);

        // Let parallel drivers interleave.
        tokio::task::yield_now().await;

        let response = self.respond(command).await;
        shared.active.fetch_sub(1, Ordering::SeqCst);
        self.record(command, true);
        Self::stamp(command, response)
    }

    async fn close(&mut self) {
        self.factory
            .shared
            .closed
            .lock()
            .unwrap()
            .push(self.host.clone());
    }
}

// ============================================================================
// Inventory Fixtures
// ============================================================================

/// An inventory of plain hosts named in order.
pub fn inventory_of(hosts: &[&str]) -> Inventory {
    let mut inventory = Inventory::new();
    for host in hosts {
        inventory
            .add(InventoryItem::new(*host))
            .expect("fixture hosts are unique");
    }
    inventory
}

/// An inventory where each host carries the given groups.
pub fn inventory_with_groups(hosts: &[(&str, &[&str])]) -> Inventory {
    let mut inventory = Inventory::new();
    for (host, groups) in hosts {
        let mut item = InventoryItem::new(*host);
        for group in *groups {
            item = item.with_group(*group);
        }
        inventory.add(item).expect("fixture hosts are unique");
    }
    inventory
}

// ============================================================================
// Scripted Operations
// ============================================================================

/// An operation that panics when advanced. For driver-crash handling tests.
pub struct PanicOp;

#[async_trait]
impl Operation for PanicOp {
    fn name(&self) -> &str {
        "panic"
    }

    async fn advance(&mut self, _prev: Option<Response>) -> OpResult<Step> {
        panic!("operation blew up");
    }
}
