//! Dump subcommand: print the merged snapshot.

use super::OutputFormat;
use crate::config::Config;
use anyhow::Result;
use clap::Args;

/// Arguments for the dump subcommand
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Only print keys under this prefix (stripped from output)
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,
}

/// Render `config` the way `dump` prints it.
pub fn render(config: &Config, args: &DumpArgs) -> Result<String> {
    let scoped;
    let config = match &args.prefix {
        Some(prefix) => {
            scoped = config.subset(prefix);
            &scoped
        }
        None => config,
    };

    match args.format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        OutputFormat::Text => Ok(config
            .keys()
            .into_iter()
            .map(|key| format!("{key} = {}", config.get_string(&key, "")))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}
