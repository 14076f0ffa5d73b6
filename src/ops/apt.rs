//! APT package management, ensure-style.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::json;

use crate::command::Command;
use crate::ops::{Finished, OpError, OpResult, Operation, Step};
use crate::response::Response;

/// Desired package state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Present,
    Absent,
}

impl PackageState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    CacheUpdated,
    Queried,
    Mutated,
    Verified,
}

/// Ensures APT packages are present or absent.
///
/// Queries the installed state first and mutates only when needed, so a run
/// against already-converged hosts reports `changed=false` after a single
/// query. Mutations are verified with a second query before the operation
/// reports success.
pub struct AptPackages {
    packages: Vec<String>,
    state: PackageState,
    update_cache: bool,
    sudo: bool,
    group: String,
    stage: Stage,
    pending: Vec<String>,
}

impl AptPackages {
    /// Ensures `packages` are in `state` on every host of the target group.
    pub fn new(
        packages: impl IntoIterator<Item = impl Into<String>>,
        state: PackageState,
    ) -> Self {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            state,
            update_cache: false,
            sudo: true,
            group: crate::inventory::ALL_GROUP.to_string(),
            stage: Stage::Start,
            pending: Vec::new(),
        }
    }

    /// Ensures `packages` are installed.
    pub fn present(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(packages, PackageState::Present)
    }

    /// Ensures `packages` are removed.
    pub fn absent(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(packages, PackageState::Absent)
    }

    /// Runs `apt-get update` before querying.
    pub fn with_update_cache(mut self) -> Self {
        self.update_cache = true;
        self
    }

    /// Skips sudo on the mutating commands, for root logins.
    pub fn without_sudo(mut self) -> Self {
        self.sudo = false;
        self
    }

    /// Restricts execution to members of `group`.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    fn elevated(&self, command: Command) -> Command {
        if self.sudo {
            command.with_sudo()
        } else {
            command
        }
    }

    fn query_command(&self, name: &str) -> Command {
        let cmd = format!(
            "dpkg-query -W -f='${{Package}} ${{Status}}\\n' {} 2>/dev/null",
            self.packages.join(" ")
        );
        Command::remote(cmd).with_group(&self.group).with_name(name)
    }

    fn mutate_command(&self) -> Command {
        let cmd = match self.state {
            PackageState::Present => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                self.pending.join(" ")
            ),
            PackageState::Absent => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y {}",
                self.pending.join(" ")
            ),
        };
        let name = match self.state {
            PackageState::Present => "apt install",
            PackageState::Absent => "apt remove",
        };
        self.elevated(Command::remote(cmd).with_group(&self.group).with_name(name))
    }

    /// Packages that still need work to reach the desired state.
    fn pending_from(&self, installed: &BTreeSet<String>) -> Vec<String> {
        self.packages
            .iter()
            .filter(|pkg| match self.state {
                PackageState::Present => !installed.contains(*pkg),
                PackageState::Absent => installed.contains(*pkg),
            })
            .cloned()
            .collect()
    }

    fn converged(&self, installed: &BTreeSet<String>) -> bool {
        self.pending_from(installed).is_empty()
    }

    fn result_value(&self, installed: &BTreeSet<String>) -> serde_json::Value {
        json!({
            "state": self.state.as_str(),
            "packages": self.packages,
            "modified": self.pending,
            "installed": installed,
        })
    }
}

/// Parses `dpkg-query -W -f='${Package} ${Status}\n'` output into the set of
/// installed package names.
fn installed_packages(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let status: Vec<&str> = parts.collect();
            (status.last() == Some(&"installed")).then(|| name.to_string())
        })
        .collect()
}

fn require(prev: Option<Response>, stage: &str) -> OpResult<Response> {
    prev.ok_or_else(|| OpError::MissingInput(format!("resumed at {stage} without a response")))
}

fn ensure_dispatched(response: &Response, what: &str) -> OpResult<()> {
    if let Some(error) = &response.error {
        return Err(OpError::failed(format!("{what} failed: {error}")));
    }
    Ok(())
}

#[async_trait]
impl Operation for AptPackages {
    fn name(&self) -> &str {
        "apt"
    }

    async fn advance(&mut self, prev: Option<Response>) -> OpResult<Step> {
        match self.stage {
            Stage::Start => {
                if self.packages.is_empty() {
                    return Ok(Step::Done(Finished::new().with_changed(false)));
                }
                if self.update_cache {
                    self.stage = Stage::CacheUpdated;
                    return Ok(Step::Command(self.elevated(
                        Command::remote("apt-get update")
                            .with_group(&self.group)
                            .with_name("apt update"),
                    )));
                }
                self.stage = Stage::Queried;
                Ok(Step::Command(self.query_command("apt query")))
            }
            Stage::CacheUpdated => {
                let prev = require(prev, "cache update")?;
                ensure_dispatched(&prev, "apt-get update")?;
                if prev.executed && prev.return_code.unwrap_or(0) != 0 {
                    return Err(OpError::failed(format!(
                        "apt-get update exited with {}: {}",
                        prev.return_code.unwrap_or(0),
                        prev.stderr.trim()
                    )));
                }
                self.stage = Stage::Queried;
                Ok(Step::Command(self.query_command("apt query")))
            }
            Stage::Queried => {
                let prev = require(prev, "package query")?;
                ensure_dispatched(&prev, "package query")?;
                if !prev.executed {
                    // The whole host was filtered out of the group; nothing
                    // to do and nothing changed.
                    return Ok(Step::Done(Finished::new().with_changed(false)));
                }
                let installed = installed_packages(&prev.stdout);
                self.pending = self.pending_from(&installed);
                if self.pending.is_empty() {
                    return Ok(Step::Done(
                        Finished::new()
                            .with_changed(false)
                            .with_value(self.result_value(&installed)),
                    ));
                }
                self.stage = Stage::Mutated;
                Ok(Step::Command(self.mutate_command()))
            }
            Stage::Mutated => {
                let prev = require(prev, "mutation")?;
                ensure_dispatched(&prev, "apt-get")?;
                if prev.return_code.unwrap_or(0) != 0 {
                    return Err(OpError::failed(format!(
                        "apt-get exited with {}: {}",
                        prev.return_code.unwrap_or(0),
                        prev.stderr.trim()
                    )));
                }
                self.stage = Stage::Verified;
                Ok(Step::Command(self.query_command("apt verify")))
            }
            Stage::Verified => {
                let prev = require(prev, "verification")?;
                ensure_dispatched(&prev, "verification query")?;
                let installed = installed_packages(&prev.stdout);
                if !self.converged(&installed) {
                    return Err(OpError::failed(format!(
                        "packages not {} after apt-get: {}",
                        self.state.as_str(),
                        self.pending_from(&installed).join(", ")
                    )));
                }
                Ok(Step::Done(
                    Finished::new()
                        .with_changed(true)
                        .with_value(self.result_value(&installed)),
                ))
            }
        }
    }
}
