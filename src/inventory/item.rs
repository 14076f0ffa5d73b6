//! Typed inventory entries.
//!
//! An [`InventoryItem`] bundles everything the engine knows about one host:
//! how to connect, which escalation secrets apply, session-level options,
//! group memberships and free-form variables. The host driver snapshots the
//! non-connection parts into a [`HostContext`] and attaches it to every
//! command addressed at the host.

use std::collections::BTreeSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The group every host belongs to.
pub const ALL_GROUP: &str = "all";

fn default_port() -> u16 {
    22
}

fn default_term_type() -> String {
    "xterm".to_string()
}

// ============================================================================
// Connection parameters
// ============================================================================

/// How to reach a host over SSH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Address the transport connects to. Required, unique per inventory.
    pub host: String,

    /// Login user. Falls back to the local user when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for password authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key files, tried in order before password authentication.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_keys: Vec<PathBuf>,

    /// Passphrase for the private key files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// Unrecognized keys, carried through to the transport untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionParams {
    /// Creates connection parameters for `host` with default port 22.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: None,
            password: None,
            port: default_port(),
            client_keys: Vec::new(),
            passphrase: None,
            extra: Map::new(),
        }
    }
}

// ============================================================================
// Escalation and session options
// ============================================================================

/// Privilege escalation secrets for sudo and su.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo_password: Option<String>,

    /// Target user for `sudo -u`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub su_password: Option<String>,

    /// Target user for `su`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub su_user: Option<String>,
}

impl Authentication {
    /// Returns true when no secret or target user is set.
    pub fn is_empty(&self) -> bool {
        self.sudo_password.is_none()
            && self.sudo_user.is_none()
            && self.su_password.is_none()
            && self.su_user.is_none()
    }
}

/// Session-level options applied to every remote command on the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Terminal type requested when a PTY is allocated.
    #[serde(default = "default_term_type")]
    pub term_type: String,

    /// Environment exported in front of each remote command.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Unrecognized keys, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            term_type: default_term_type(),
            env: IndexMap::new(),
            extra: Map::new(),
        }
    }
}

impl SessionOptions {
    fn is_default(options: &SessionOptions) -> bool {
        options == &SessionOptions::default()
    }
}

// ============================================================================
// Inventory item
// ============================================================================

/// One host entry in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Connection coordinates. `connection.host` is the inventory key.
    pub connection: ConnectionParams,

    /// Escalation secrets used by sudo/su commands.
    #[serde(default, skip_serializing_if = "Authentication::is_empty")]
    pub authentication: Authentication,

    /// Session options for remote commands.
    #[serde(default, skip_serializing_if = "SessionOptions::is_default")]
    pub session: SessionOptions,

    /// Group memberships. Always contains [`ALL_GROUP`].
    #[serde(default)]
    pub groups: BTreeSet<String>,

    /// Free-form variables, visible to operations and transports.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub host_vars: Map<String, Value>,
}

impl InventoryItem {
    /// Creates an item for `host` that is a member of `all` only.
    pub fn new(host: impl Into<String>) -> Self {
        let mut groups = BTreeSet::new();
        groups.insert(ALL_GROUP.to_string());
        Self {
            connection: ConnectionParams::new(host),
            authentication: Authentication::default(),
            session: SessionOptions::default(),
            groups,
            host_vars: Map::new(),
        }
    }

    /// The inventory key.
    pub fn host(&self) -> &str {
        &self.connection.host
    }

    /// Group membership query. Membership in [`ALL_GROUP`] always holds.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Restores the implicit `all` membership after deserialization or
    /// mutation.
    pub(crate) fn normalize(&mut self) {
        self.groups.insert(ALL_GROUP.to_string());
    }

    /// Snapshots the enrichment payload the driver attaches to commands.
    pub fn context(&self) -> HostContext {
        HostContext {
            authentication: self.authentication.clone(),
            session: self.session.clone(),
            vars: self.host_vars.clone(),
            groups: self.groups.clone(),
        }
    }

    /// Sets the login user.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.connection.username = Some(username.into());
        self
    }

    /// Sets the login password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.connection.password = Some(password.into());
        self
    }

    /// Sets the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.connection.port = port;
        self
    }

    /// Adds a private key file.
    pub fn with_client_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection.client_keys.push(path.into());
        self
    }

    /// Adds a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Sets the sudo password.
    pub fn with_sudo_password(mut self, password: impl Into<String>) -> Self {
        self.authentication.sudo_password = Some(password.into());
        self
    }

    /// Sets the sudo target user.
    pub fn with_sudo_user(mut self, user: impl Into<String>) -> Self {
        self.authentication.sudo_user = Some(user.into());
        self
    }

    /// Sets the su password.
    pub fn with_su_password(mut self, password: impl Into<String>) -> Self {
        self.authentication.su_password = Some(password.into());
        self
    }

    /// Sets the su target user.
    pub fn with_su_user(mut self, user: impl Into<String>) -> Self {
        self.authentication.su_user = Some(user.into());
        self
    }

    /// Sets a host variable.
    pub fn with_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.host_vars.insert(key.into(), value);
        self
    }

    /// Sets a session environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.env.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Host context
// ============================================================================

/// Everything about a target beyond its connection coordinates.
///
/// Attached to commands as `global_info` by the host driver; the transport
/// reads escalation secrets, session options and group memberships from it.
#[derive(Debug, Clone, PartialEq)]
pub struct HostContext {
    pub authentication: Authentication,
    pub session: SessionOptions,
    pub vars: Map<String, Value>,
    pub groups: BTreeSet<String>,
}

impl HostContext {
    /// Returns true when a command addressed at `group` applies to this host.
    pub fn permits(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}
