//! stratum: inspect and follow layered configuration from the command line.

use anyhow::{Result, bail};
use clap::Parser;
use stratum_config::cli::{Cli, Command, dump, get, watch};
use stratum_config::logging::{self, LogTarget};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let manager = cli.manager()?;
    for source in manager.sources() {
        info!(source = %source.name, priority = source.priority, "Using source");
    }

    match &cli.command {
        Command::Dump(args) => {
            manager.load().await?;
            println!("{}", dump::render(&manager.config(), args)?);
        }
        Command::Get(args) => {
            manager.load().await?;
            match get::render(&manager.config(), args) {
                Some(text) => println!("{text}"),
                None => bail!("key not found: {}", args.key),
            }
        }
        Command::Watch(args) => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
                }
            };
            watch::run(&manager, args, shutdown).await?;
        }
    }

    Ok(())
}
