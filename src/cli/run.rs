//! Run command - execute an ad-hoc command across the inventory.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::warn;

use crate::cli::{print_human, Cli, OutputFormat};
use crate::config::Config;
use crate::engine::{Engine, EngineConfig};
use crate::inventory::{Inventory, InventoryItem};
use crate::ops::{Operation, Shell};

/// Arguments for the run command.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Command to execute on each host, given after `--`
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,

    /// Only run on hosts in this group
    #[arg(short = 'g', long)]
    pub group: Option<String>,

    /// Elevate with sudo
    #[arg(long, conflicts_with = "su")]
    pub sudo: bool,

    /// Elevate with su
    #[arg(long)]
    pub su: bool,

    /// Request a PTY for the command
    #[arg(long)]
    pub pty: bool,

    /// Name recorded on the responses
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Cap on concurrently driven hosts
    #[arg(short = 'f', long)]
    pub forks: Option<usize>,
}

impl RunArgs {
    /// Execute the run command.
    pub async fn execute(&self, cli: &Cli, config: &Config) -> Result<i32> {
        let Some(inventory_path) = cli
            .inventory
            .clone()
            .or_else(|| config.defaults.inventory.clone())
        else {
            eprintln!(
                "{}",
                "no inventory given; pass --inventory or set defaults.inventory".red()
            );
            return Ok(2);
        };

        let inventory = match Inventory::load(&inventory_path) {
            Ok(inventory) => inventory,
            Err(e) => {
                eprintln!("{}", format!("invalid inventory: {}", e).red());
                return Ok(2);
            }
        };

        let engine_config = EngineConfig {
            forks: self.forks.or(config.defaults.forks),
            command_timeout: self
                .timeout
                .map(Duration::from_secs)
                .or(config.connection.command_timeout),
            connect_timeout: config.connection.connect_timeout,
        };
        let engine = Engine::new(inventory).with_config(engine_config);

        // Ctrl-C cancels the run; drivers keep what they already logged.
        let cancel = engine.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        });

        let command_line = self.command.join(" ");
        let group = self.group.clone().or_else(|| config.defaults.group.clone());
        let name = self.name.clone();
        let (sudo, su, pty) = (self.sudo, self.su, self.pty);

        let factory = move |_item: &InventoryItem| -> Box<dyn Operation> {
            let mut shell = Shell::new(command_line.clone());
            if let Some(group) = &group {
                shell = shell.with_group(group.clone());
            }
            if let Some(name) = &name {
                shell = shell.with_name(name.clone());
            }
            if sudo {
                shell = shell.with_sudo();
            }
            if su {
                shell = shell.with_su();
            }
            if pty {
                shell = shell.with_pty();
            }
            Box::new(shell)
        };

        let responses = engine.execute(factory).await;

        match cli.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&responses)?),
            OutputFormat::Human => print_human(&responses, cli.verbosity()),
        }

        Ok(0)
    }
}
