//! Inventory command - inspect and validate inventory files.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;

use crate::cli::Cli;
use crate::config::Config;
use crate::inventory::Inventory;

/// Arguments for the inventory command.
#[derive(Parser, Debug, Clone)]
pub struct InventoryArgs {
    #[command(subcommand)]
    pub command: InventoryCommands,
}

/// Inventory subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum InventoryCommands {
    /// List hosts, optionally limited to a group
    List {
        /// Only list hosts in this group
        #[arg(short = 'g', long)]
        group: Option<String>,
    },

    /// Parse the inventory and report problems
    Validate,
}

impl InventoryArgs {
    /// Execute the inventory command.
    pub async fn execute(&self, cli: &Cli, config: &Config) -> Result<i32> {
        let Some(path) = cli
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

        match &self.command {
            InventoryCommands::List { group } => self.list(cli, &path, group.as_deref()),
            InventoryCommands::Validate => self.validate(&path),
        }
    }

    fn list(&self, cli: &Cli, path: &PathBuf, group: Option<&str>) -> Result<i32> {
        let inventory = match Inventory::load(path) {
            Ok(inventory) => inventory,
            Err(e) => {
                eprintln!("{}", format!("invalid inventory: {}", e).red());
                return Ok(2);
            }
        };

        let items: Vec<_> = match group {
            Some(group) => inventory.hosts_in_group(group).collect(),
            None => inventory.items().collect(),
        };

        if cli.is_json() {
            let entries: Vec<_> = items
                .iter()
                .map(|item| {
                    json!({
                        "host": item.host(),
                        "groups": item.groups,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else {
            for item in &items {
                let groups: Vec<&str> = item.groups.iter().map(String::as_str).collect();
                println!("{} {}", item.host().bold(), groups.join(",").dimmed());
            }
        }

        Ok(0)
    }

    fn validate(&self, path: &PathBuf) -> Result<i32> {
        match Inventory::load(path) {
            Ok(inventory) => {
                println!(
                    "{} {} hosts",
                    "inventory ok:".green(),
                    inventory.len()
                );
                Ok(0)
            }
            Err(e) => {
                eprintln!("{}", format!("invalid inventory: {}", e).red());
                Ok(2)
            }
        }
    }
}
