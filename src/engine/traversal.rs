//! Depth-first walk of one operation tree.
//!
//! The traversal owns a stack of frames, one per operation being stepped.
//! Commands surface in depth-first pre-order; when an operation finishes,
//! its results are rolled up into a single aggregate response and injected
//! into the parent. Operation failures become synthetic error responses and
//! never propagate as errors.

use serde_json::Value;
use tracing::{debug, trace};

use crate::command::Command;
use crate::ops::{Finished, Operation, Step};
use crate::response::Response;

/// A unit emitted by the traversal for the host driver to handle.
#[derive(Debug)]
pub(crate) enum Emitted {
    /// Dispatch through the transport, then feed the response back.
    Command(Command),
    /// Record in the log as-is, then feed back unchanged.
    Synthetic(Response),
}

struct Frame {
    op: Box<dyn Operation>,
    pending: Option<Response>,
    collected: Vec<Response>,
}

impl Frame {
    fn new(op: Box<dyn Operation>) -> Self {
        Self {
            op,
            pending: None,
            collected: Vec::new(),
        }
    }
}

/// Walks one operation tree for one host.
///
/// The driver alternates [`next_unit`](Self::next_unit) and
/// [`feed`](Self::feed): every emitted unit must be fed exactly one response
/// before the next unit is pulled.
pub(crate) struct Traversal {
    host: String,
    stack: Vec<Frame>,
    awaiting: bool,
}

impl Traversal {
    pub(crate) fn new(host: impl Into<String>, root: Box<dyn Operation>) -> Self {
        Self {
            host: host.into(),
            stack: vec![Frame::new(root)],
            awaiting: false,
        }
    }

    /// Pulls the next primitive unit, or `None` when the tree is exhausted.
    pub(crate) async fn next_unit(&mut self) -> Option<Emitted> {
        debug_assert!(
            !self.awaiting,
            "next_unit called with a response outstanding"
        );
        loop {
            let step = {
                let frame = self.stack.last_mut()?;
                let prev = frame.pending.take();
                frame.op.advance(prev).await
            };
            match step {
                Ok(Step::Command(command)) => {
                    trace!(host = %self.host, "yield command");
                    self.awaiting = true;
                    return Some(Emitted::Command(command));
                }
                Ok(Step::Operation(op)) => {
                    trace!(host = %self.host, child = op.name(), "descend");
                    self.stack.push(Frame::new(op));
                }
                Ok(Step::Response(response)) => {
                    self.awaiting = true;
                    return Some(Emitted::Synthetic(response));
                }
                Ok(Step::Done(finished)) => {
                    self.complete(finished);
                }
                Err(err) => {
                    // Pop the failing frame first so the error lands in the
                    // parent when it is fed back.
                    let Some(frame) = self.stack.pop() else {
                        return None;
                    };
                    debug!(
                        host = %self.host,
                        op = frame.op.name(),
                        error = %err,
                        "operation failed"
                    );
                    let response = Response::skipped(&self.host)
                        .with_name(frame.op.name())
                        .with_error(err.to_string());
                    self.awaiting = true;
                    return Some(Emitted::Synthetic(response));
                }
            }
        }
    }

    /// Records the response for the outstanding unit and hands it to the
    /// frame that will be advanced next.
    pub(crate) fn feed(&mut self, response: Response) {
        debug_assert!(self.awaiting, "feed called without an outstanding unit");
        self.awaiting = false;
        if let Some(frame) = self.stack.last_mut() {
            frame.collected.push(response.clone());
            frame.pending = Some(response);
        }
    }

    /// Pops the finished frame and injects its aggregate into the parent.
    fn complete(&mut self, finished: Finished) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let changed = finished
            .changed
            .unwrap_or_else(|| frame.collected.iter().any(|r| r.changed));
        let value = match finished.value {
            Some(value) => value,
            None => serde_json::to_value(&frame.collected).unwrap_or(Value::Null),
        };
        trace!(
            host = %self.host,
            op = frame.op.name(),
            responses = frame.collected.len(),
            changed,
            "operation complete"
        );
        if let Some(parent) = self.stack.last_mut() {
            parent.pending = Some(
                Response::new(&self.host)
                    .with_name(frame.op.name())
                    .with_changed(changed)
                    .with_value(value),
            );
            // Roll-up is transitive: everything the child saw counts toward
            // the ancestors' aggregates too.
            parent.collected.extend(frame.collected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{OpError, OpResult};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Plays back a fixed list of steps, recording every resume value.
    struct ScriptOp {
        name: String,
        steps: VecDeque<Step>,
        finish: Finished,
        seen: Arc<Mutex<Vec<Option<Response>>>>,
    }

    impl ScriptOp {
        fn new(name: &str, steps: Vec<Step>) -> Self {
            Self {
                name: name.to_string(),
                steps: steps.into(),
                finish: Finished::new(),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn finishing(mut self, finish: Finished) -> Self {
            self.finish = finish;
            self
        }

        fn seen(&self) -> Arc<Mutex<Vec<Option<Response>>>> {
            Arc::clone(&self.seen)
        }
    }

    #[async_trait]
    impl Operation for ScriptOp {
        fn name(&self) -> &str {
            &self.name
        }

        async fn advance(&mut self, prev: Option<Response>) -> OpResult<Step> {
            self.seen.lock().unwrap().push(prev);
            match self.steps.pop_front() {
                Some(step) => Ok(step),
                None => Ok(Step::Done(self.finish.clone())),
            }
        }
    }

    /// Fails on its first advance.
    struct FailOp;

    #[async_trait]
    impl Operation for FailOp {
        fn name(&self) -> &str {
            "doomed"
        }

        async fn advance(&mut self, _prev: Option<Response>) -> OpResult<Step> {
            Err(OpError::failed("boom"))
        }
    }

    fn cmd(text: &str) -> Step {
        Step::Command(Command::remote(text))
    }

    async fn drain(traversal: &mut Traversal) -> Vec<Response> {
        let mut log = Vec::new();
        while let Some(emitted) = traversal.next_unit().await {
            let response = match emitted {
                Emitted::Command(command) => Response::new("h1")
                    .with_command(command.remote_command().unwrap_or_default())
                    .with_changed(true),
                Emitted::Synthetic(response) => response,
            };
            log.push(response.clone());
            traversal.feed(response);
        }
        log
    }

    #[tokio::test]
    async fn commands_surface_in_pre_order() {
        let child = ScriptOp::new("child", vec![cmd("b"), cmd("c")]);
        let root = ScriptOp::new(
            "root",
            vec![cmd("a"), Step::Operation(Box::new(child)), cmd("d")],
        );
        let mut traversal = Traversal::new("h1", Box::new(root));

        let log = drain(&mut traversal).await;
        let order: Vec<_> = log.iter().map(|r| r.command.clone().unwrap()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn completed_child_injects_its_collected_responses() {
        let child = ScriptOp::new("child", vec![cmd("x"), cmd("y")]);
        let root = ScriptOp::new("root", vec![Step::Operation(Box::new(child))]);
        let seen = root.seen();
        let mut traversal = Traversal::new("h1", Box::new(root));

        drain(&mut traversal).await;

        let seen = seen.lock().unwrap();
        // First resume is the priming None, second is the child's aggregate.
        assert_eq!(seen.len(), 2);
        let aggregate = seen[1].as_ref().unwrap();
        assert_eq!(aggregate.name.as_deref(), Some("child"));
        assert!(aggregate.changed);
        let rolled: Vec<Response> =
            serde_json::from_value(aggregate.value.clone()).unwrap();
        assert_eq!(rolled.len(), 2);
        assert_eq!(rolled[0].command.as_deref(), Some("x"));
        assert_eq!(rolled[1].command.as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn explicit_return_value_replaces_the_roll_up() {
        let child = ScriptOp::new("child", vec![cmd("x")])
            .finishing(Finished::new().with_value(json!({"answer": 42})));
        let root = ScriptOp::new("root", vec![Step::Operation(Box::new(child))]);
        let seen = root.seen();
        let mut traversal = Traversal::new("h1", Box::new(root));

        drain(&mut traversal).await;

        let seen = seen.lock().unwrap();
        let aggregate = seen[1].as_ref().unwrap();
        assert_eq!(aggregate.value, json!({"answer": 42}));
        // The executed command still derives the changed flag.
        assert!(aggregate.changed);
    }

    #[tokio::test]
    async fn changed_override_downgrades_the_aggregate() {
        let child = ScriptOp::new("child", vec![cmd("x")])
            .finishing(Finished::new().with_changed(false));
        let root = ScriptOp::new("root", vec![Step::Operation(Box::new(child))]);
        let seen = root.seen();
        let mut traversal = Traversal::new("h1", Box::new(root));

        drain(&mut traversal).await;

        let seen = seen.lock().unwrap();
        assert!(!seen[1].as_ref().unwrap().changed);
    }

    #[tokio::test]
    async fn roll_up_is_transitive_through_nesting() {
        let inner = ScriptOp::new("inner", vec![cmd("deep")]);
        let middle = ScriptOp::new("middle", vec![Step::Operation(Box::new(inner))]);
        let root = ScriptOp::new("root", vec![Step::Operation(Box::new(middle))]);
        let seen = root.seen();
        let mut traversal = Traversal::new("h1", Box::new(root));

        drain(&mut traversal).await;

        let seen = seen.lock().unwrap();
        let aggregate = seen[1].as_ref().unwrap();
        assert_eq!(aggregate.name.as_deref(), Some("middle"));
        let rolled: Vec<Response> =
            serde_json::from_value(aggregate.value.clone()).unwrap();
        assert_eq!(rolled.len(), 1);
        assert_eq!(rolled[0].command.as_deref(), Some("deep"));
    }

    #[tokio::test]
    async fn failing_operation_becomes_a_synthetic_error() {
        let root = ScriptOp::new(
            "root",
            vec![Step::Operation(Box::new(FailOp)), cmd("after")],
        );
        let mut traversal = Traversal::new("h1", Box::new(root));

        let log = drain(&mut traversal).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].name.as_deref(), Some("doomed"));
        assert_eq!(log[0].error.as_deref(), Some("boom"));
        assert!(!log[0].executed);
        // The parent keeps walking after the failure.
        assert_eq!(log[1].command.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn failing_root_ends_the_traversal() {
        let mut traversal = Traversal::new("h1", Box::new(FailOp));
        let log = drain(&mut traversal).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].error.as_deref(), Some("boom"));
        assert!(traversal.next_unit().await.is_none());
    }

    #[tokio::test]
    async fn prebuilt_responses_are_fed_back_unchanged() {
        let synthetic = Response::new("h1").with_name("note").with_value(json!("hi"));
        let root = ScriptOp::new("root", vec![Step::Response(synthetic.clone())]);
        let seen = root.seen();
        let mut traversal = Traversal::new("h1", Box::new(root));

        let log = drain(&mut traversal).await;
        assert_eq!(log, vec![synthetic.clone()]);
        assert_eq!(seen.lock().unwrap()[1], Some(synthetic));
    }
}
