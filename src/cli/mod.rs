//! Command-line interface.
//!
//! Argument parsing with clap derive, plus the human-readable rendering of
//! response lists. Subcommand bodies live in their own modules.

pub mod inventory;
pub mod run;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::response::Response;

/// opswalk - walk operation trees over SSH inventories
#[derive(Parser, Debug, Clone)]
#[command(name = "opswalk")]
#[command(version)]
#[command(about = "Run operation trees against SSH inventories", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON inventory file
    #[arg(short = 'i', long, global = true, env = "OPSWALK_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "OPSWALK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Per-host lines with colored status
    Human,
    /// The raw response array as JSON
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Human
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run an ad-hoc command across the inventory
    Run(run::RunArgs),

    /// Inspect or validate an inventory file
    Inventory(inventory::InventoryArgs),
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-4).
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(4)
    }

    /// Check if JSON output is requested.
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

// ============================================================================
// Human Output
// ============================================================================

/// Status of one response, for rendering.
fn status_label(response: &Response) -> String {
    if response.error.is_some() {
        "failed".red().bold().to_string()
    } else if !response.executed {
        "skipped".cyan().to_string()
    } else if response.changed {
        "changed".yellow().to_string()
    } else {
        "ok".green().to_string()
    }
}

/// Prints the flattened response list in per-host lines, then a recap.
pub fn print_human(responses: &[Response], verbosity: u8) {
    for response in responses {
        let label = response
            .name
            .as_deref()
            .or(response.command.as_deref())
            .unwrap_or("-");
        println!(
            "{} | {} | {}",
            response.host.bold(),
            status_label(response),
            label
        );

        if let Some(error) = &response.error {
            println!("  {}", error.red());
        }
        if verbosity >= 1 || response.error.is_some() {
            for line in response.stdout.lines() {
                println!("  {}", line);
            }
            for line in response.stderr.lines() {
                println!("  {}", line.dimmed());
            }
        }
    }

    print_recap(responses);
}

/// Ansible-style per-host recap counts.
fn print_recap(responses: &[Response]) {
    let mut per_host: BTreeMap<&str, (usize, usize, usize, usize)> = BTreeMap::new();
    for response in responses {
        let entry = per_host.entry(response.host.as_str()).or_default();
        if response.error.is_some() {
            entry.2 += 1;
        } else if !response.executed {
            entry.3 += 1;
        } else if response.changed {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
    }

    println!();
    for (host, (ok, changed, failed, skipped)) in per_host {
        println!(
            "{} : {} {} {} {}",
            host.bold(),
            format!("ok={}", ok).green(),
            format!("changed={}", changed).yellow(),
            format!("failed={}", failed).red(),
            format!("skipped={}", skipped).cyan(),
        );
    }
}
