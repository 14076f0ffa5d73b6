//! Configuration loading for the opswalk CLI.
//!
//! Configuration is merged from, in order of increasing precedence:
//! - built-in defaults
//! - system configuration (/etc/opswalk/opswalk.toml)
//! - user configuration (~/.config/opswalk/config.toml, ~/.opswalk.toml)
//! - project configuration (./opswalk.toml)
//! - environment variables (OPSWALK_INVENTORY, OPSWALK_FORKS)
//!
//! Command-line flags override everything here; that merge happens in the
//! CLI layer where the flags live.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run defaults.
    pub defaults: Defaults,

    /// SSH connection settings.
    pub connection: ConnectionConfig,
}

/// Default settings for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Inventory file used when no `--inventory` flag is given.
    pub inventory: Option<PathBuf>,

    /// Cap on concurrently driven hosts. Unset means every host at once.
    pub forks: Option<usize>,

    /// Default group filter for shell commands.
    pub group: Option<String>,
}

/// SSH connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP connect timeout per host.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Per-command execution timeout. Unset means commands may run forever.
    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
        }
    }
}

impl Config {
    /// Loads configuration from all standard sources.
    ///
    /// An explicit path short-circuits the search and must exist; the
    /// standard locations are each optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            config = config.merge_from_file(path)?;
        } else {
            for path in Self::search_paths() {
                if path.exists() {
                    config = config.merge_from_file(&path)?;
                }
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a single file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/opswalk/opswalk.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("opswalk").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".opswalk.toml"));
        }
        paths.push(PathBuf::from("opswalk.toml"));

        if let Ok(env_path) = std::env::var("OPSWALK_CONFIG") {
            paths.push(PathBuf::from(env_path));
        }

        paths
    }

    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file_config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(self.merge(file_config))
    }

    /// Merges another config over this one. Set fields win; the nested
    /// connection block is taken wholesale when it differs from default.
    fn merge(&self, other: Config) -> Config {
        let default_connection = ConnectionConfig::default();
        Config {
            defaults: Defaults {
                inventory: other.defaults.inventory.or_else(|| self.defaults.inventory.clone()),
                forks: other.defaults.forks.or(self.defaults.forks),
                group: other.defaults.group.or_else(|| self.defaults.group.clone()),
            },
            connection: ConnectionConfig {
                connect_timeout: if other.connection.connect_timeout
                    != default_connection.connect_timeout
                {
                    other.connection.connect_timeout
                } else {
                    self.connection.connect_timeout
                },
                command_timeout: other
                    .connection
                    .command_timeout
                    .or(self.connection.command_timeout),
            },
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(inventory) = std::env::var("OPSWALK_INVENTORY") {
            self.defaults.inventory = Some(PathBuf::from(inventory));
        }
        if let Ok(forks) = std::env::var("OPSWALK_FORKS") {
            let forks: usize = forks
                .parse()
                .context("OPSWALK_FORKS must be a positive integer")?;
            self.defaults.forks = Some(forks);
        }
        Ok(())
    }
}
