//! Primitive work units yielded by operations.
//!
//! A [`Command`] is the only thing the traversal engine ever hands to a
//! transport: a remote shell command, a local SFTP action, or a passthrough.
//! Privilege escalation is an [`Elevation`] enum, so a command can never ask
//! for sudo and su at the same time, and local actions are a closed
//! [`SftpAction`] set, so every command serializes cleanly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::inventory::{ConnectionParams, HostContext, ALL_GROUP};

fn default_group() -> String {
    ALL_GROUP.to_string()
}

// ============================================================================
// Elevation
// ============================================================================

/// Privilege escalation applied to a remote command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// Run as the login user.
    #[default]
    None,
    /// Prefix with `sudo`, using the host's `sudo_password`/`sudo_user`.
    Sudo,
    /// Wrap in `su <user> -c`, using the host's `su_password`/`su_user`.
    Su,
}

// ============================================================================
// Local SFTP actions
// ============================================================================

/// Local primitives executed by the controller over an SFTP subchannel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SftpAction {
    /// Create a directory on the target.
    CreateDir { path: String },
    /// Remove an empty directory on the target.
    RemoveDir { path: String },
    /// Remove a file on the target.
    RemoveFile { path: String },
    /// Upload a controller-side file to the target.
    Upload { local: PathBuf, remote: String },
    /// Download a target file to the controller.
    Download { remote: String, local: PathBuf },
    /// Write literal contents to a target file.
    WriteFile { path: String, contents: String },
    /// Read a target file; contents land in the response value.
    ReadFile { path: String },
    /// Change the permission bits of a target path.
    SetPermissions { path: String, mode: u32 },
    /// Rename a target path.
    Rename { from: String, to: String },
    /// Stat a target path; metadata lands in the response value.
    Stat { path: String },
    /// List a target directory; entry names land in the response value.
    ListDir { path: String },
}

impl SftpAction {
    /// Human-readable description, echoed as the response's command string.
    pub fn describe(&self) -> String {
        match self {
            Self::CreateDir { path } => format!("sftp mkdir {path}"),
            Self::RemoveDir { path } => format!("sftp rmdir {path}"),
            Self::RemoveFile { path } => format!("sftp rm {path}"),
            Self::Upload { local, remote } => {
                format!("sftp put {} {remote}", local.display())
            }
            Self::Download { remote, local } => {
                format!("sftp get {remote} {}", local.display())
            }
            Self::WriteFile { path, .. } => format!("sftp write {path}"),
            Self::ReadFile { path } => format!("sftp read {path}"),
            Self::SetPermissions { path, mode } => format!("sftp chmod {mode:o} {path}"),
            Self::Rename { from, to } => format!("sftp rename {from} {to}"),
            Self::Stat { path } => format!("sftp stat {path}"),
            Self::ListDir { path } => format!("sftp ls {path}"),
        }
    }
}

// ============================================================================
// Command
// ============================================================================

/// What a command does when it reaches the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandKind {
    /// Shell command executed on the target over SSH.
    Remote {
        /// The shell command string, run verbatim (before elevation).
        command: String,
        #[serde(default)]
        elevation: Elevation,
        /// Request a PTY for the execution.
        #[serde(default)]
        get_pty: bool,
    },
    /// SFTP primitive executed by the controller against the target.
    Local { action: SftpAction },
    /// Acknowledged by the transport without touching the target.
    Passthrough,
}

/// One primitive unit of work yielded by an operation.
///
/// Operations build commands with the constructors below; the host driver
/// fills in [`host_info`](Self::host_info) and
/// [`global_info`](Self::global_info) before dispatch, so the transport can
/// act on the command alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Label echoed into the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Only hosts belonging to this group execute the command; everyone else
    /// records a skipped response.
    #[serde(default = "default_group")]
    pub group: String,

    /// The work itself.
    #[serde(flatten)]
    pub kind: CommandKind,

    /// Connection coordinates of the target. Populated by the host driver,
    /// never serialized.
    #[serde(skip)]
    pub host_info: Option<ConnectionParams>,

    /// Escalation secrets, session options, variables and groups of the
    /// target. Populated by the host driver, never serialized.
    #[serde(skip)]
    pub global_info: Option<HostContext>,
}

impl Command {
    fn new(kind: CommandKind) -> Self {
        Self {
            name: None,
            group: default_group(),
            kind,
            host_info: None,
            global_info: None,
        }
    }

    /// Creates a remote shell command addressed at the `all` group.
    pub fn remote(command: impl Into<String>) -> Self {
        Self::new(CommandKind::Remote {
            command: command.into(),
            elevation: Elevation::None,
            get_pty: false,
        })
    }

    /// Creates a local SFTP command addressed at the `all` group.
    pub fn local(action: SftpAction) -> Self {
        Self::new(CommandKind::Local { action })
    }

    /// Creates a passthrough command addressed at the `all` group.
    pub fn passthrough() -> Self {
        Self::new(CommandKind::Passthrough)
    }

    /// Sets the label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restricts the command to members of `group`.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Escalates a remote command via sudo. Replaces any earlier elevation.
    pub fn with_sudo(mut self) -> Self {
        if let CommandKind::Remote { elevation, .. } = &mut self.kind {
            *elevation = Elevation::Sudo;
        }
        self
    }

    /// Escalates a remote command via su. Replaces any earlier elevation.
    pub fn with_su(mut self) -> Self {
        if let CommandKind::Remote { elevation, .. } = &mut self.kind {
            *elevation = Elevation::Su;
        }
        self
    }

    /// Requests a PTY for a remote command.
    pub fn with_pty(mut self) -> Self {
        if let CommandKind::Remote { get_pty, .. } = &mut self.kind {
            *get_pty = true;
        }
        self
    }

    /// The shell command string, when this is a remote command.
    pub fn remote_command(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::Remote { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Echo string recorded in responses. Passthroughs have none.
    pub fn describe(&self) -> Option<String> {
        match &self.kind {
            CommandKind::Remote { command, .. } => Some(command.clone()),
            CommandKind::Local { action } => Some(action.describe()),
            CommandKind::Passthrough => None,
        }
    }
}
