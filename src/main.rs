//! opswalk binary entry point.
//!
//! Parses arguments, initializes logging, loads configuration and hands off
//! to the subcommand handlers. Exit codes: 0 when the requested work ran,
//! 2 for configuration or inventory problems.

use anyhow::Result;
use opswalk::cli::{Cli, Commands};
use opswalk::config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    init_logging(cli.verbosity());

    if cli.verbosity() >= 2 {
        eprintln!("opswalk v{}", opswalk::version());
    }

    // An explicit config file must parse; the standard locations are
    // best-effort.
    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(2);
            }
        },
        None => Config::load(None).unwrap_or_else(|e| {
            if cli.verbosity() >= 1 {
                eprintln!("Warning: failed to load config: {:#}", e);
            }
            Config::default()
        }),
    };

    let exit_code = match &cli.command {
        Commands::Run(args) => args.execute(&cli, &config).await?,
        Commands::Inventory(args) => args.execute(&cli, &config).await?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
