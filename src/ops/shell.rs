//! Shell command operations.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::command::Command;
use crate::ops::{OpResult, Operation, Step};
use crate::response::Response;

/// Runs one remote shell command and finishes.
///
/// The workhorse for ad-hoc execution: the CLI `run` subcommand wraps every
/// invocation in a `Shell`.
pub struct Shell {
    command: Command,
    yielded: bool,
}

impl Shell {
    /// Runs `command` on every host of the target group.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Command::remote(command),
            yielded: false,
        }
    }

    /// Wraps an already-built command.
    pub fn from_command(command: Command) -> Self {
        Self {
            command,
            yielded: false,
        }
    }

    /// Sets the command label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.command = self.command.with_name(name);
        self
    }

    /// Restricts execution to members of `group`.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.command = self.command.with_group(group);
        self
    }

    /// Escalates via sudo.
    pub fn with_sudo(mut self) -> Self {
        self.command = self.command.with_sudo();
        self
    }

    /// Escalates via su.
    pub fn with_su(mut self) -> Self {
        self.command = self.command.with_su();
        self
    }

    /// Requests a PTY.
    pub fn with_pty(mut self) -> Self {
        self.command = self.command.with_pty();
        self
    }
}

#[async_trait]
impl Operation for Shell {
    fn name(&self) -> &str {
        self.command.name.as_deref().unwrap_or("shell")
    }

    async fn advance(&mut self, _prev: Option<Response>) -> OpResult<Step> {
        if self.yielded {
            return Ok(Step::done());
        }
        self.yielded = true;
        Ok(Step::Command(self.command.clone()))
    }
}

/// Runs child operations one after another.
///
/// The aggregate the parent sees collects every response produced underneath,
/// in order, with `changed` derived from them.
pub struct Sequence {
    name: String,
    queue: VecDeque<Box<dyn Operation>>,
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: VecDeque::new(),
        }
    }

    /// Appends a child operation.
    pub fn then(mut self, op: Box<dyn Operation>) -> Self {
        self.queue.push_back(op);
        self
    }
}

#[async_trait]
impl Operation for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    async fn advance(&mut self, _prev: Option<Response>) -> OpResult<Step> {
        match self.queue.pop_front() {
            Some(op) => Ok(Step::Operation(op)),
            None => Ok(Step::done()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_yields_its_command_once() {
        let mut op = Shell::new("uptime").with_group("web").with_sudo();

        let step = op.advance(None).await.unwrap();
        let Step::Command(cmd) = step else {
            panic!("expected a command step");
        };
        assert_eq!(cmd.remote_command(), Some("uptime"));
        assert_eq!(cmd.group, "web");

        let step = op.advance(Some(Response::new("h1"))).await.unwrap();
        assert!(matches!(step, Step::Done(_)));
    }

    #[tokio::test]
    async fn sequence_descends_into_children_in_order() {
        let mut op = Sequence::new("deploy")
            .then(Box::new(Shell::new("first")))
            .then(Box::new(Shell::new("second")));

        let Step::Operation(child) = op.advance(None).await.unwrap() else {
            panic!("expected an operation step");
        };
        assert_eq!(child.name(), "shell");

        let resume = Response::new("h1").with_name("aggregate");
        let step = op.advance(Some(resume.clone())).await.unwrap();
        assert!(matches!(step, Step::Operation(_)));

        let step = op.advance(Some(resume)).await.unwrap();
        assert!(matches!(step, Step::Done(_)));
    }
}
