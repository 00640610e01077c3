//! CLI command definitions for stratum
//!
//! This module defines the CLI structure using clap's derive macros.
//! Global options describe which sources to stack; subcommands decide what to
//! do with the merged result.

pub mod dump;
pub mod get;
pub mod watch;

use crate::config::{Manager, Source, Value};
use crate::sources::{EnvSource, FileSource, MemorySource, SqliteSource};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use dump::DumpArgs;
use get::GetArgs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use watch::WatchArgs;

/// Output encoding shared by `dump` and `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One `key = value` line per entry
    #[default]
    Text,
    /// A single JSON document
    Json,
}

/// Layered configuration inspector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read environment variables with this prefix (e.g. APP_)
    #[arg(long, global = true, value_name = "PREFIX")]
    pub env_prefix: Option<String>,

    /// JSON or YAML config file (repeatable, later files override earlier)
    #[arg(short, long = "file", global = true, value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// SQLite database holding a key/value table
    #[arg(long, global = true, value_name = "PATH")]
    pub sqlite: Option<PathBuf>,

    /// Table to read from --sqlite
    #[arg(long, global = true, default_value = crate::sources::sqlite::DEFAULT_TABLE)]
    pub table: String,

    /// Poll interval for --sqlite when watching (e.g. 5s)
    #[arg(long, global = true, value_parser = parse_interval, default_value = "5s")]
    pub poll: Duration,

    /// Default value as key=value (repeatable, lowest priority)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub defaults: Vec<(String, String)>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merged configuration
    Dump(DumpArgs),

    /// Print one coerced value; exits non-zero if the key is missing
    Get(GetArgs),

    /// Print a change report for every reload until interrupted
    Watch(WatchArgs),
}

impl Cli {
    /// Build the source stack described by the global options, lowest
    /// priority first.
    pub fn sources(&self) -> Result<Vec<Arc<dyn Source>>> {
        let mut sources: Vec<Arc<dyn Source>> = Vec::new();

        if !self.defaults.is_empty() {
            let defaults = MemorySource::defaults().with_values(
                self.defaults
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::new(v.clone()))),
            );
            sources.push(Arc::new(defaults));
        }

        for path in &self.files {
            sources.push(Arc::new(FileSource::new(path)?));
        }

        if let Some(path) = &self.sqlite {
            let source = SqliteSource::open(path)?
                .with_table(self.table.clone())?
                .with_poll_interval(self.poll);
            sources.push(Arc::new(source));
        }

        if let Some(prefix) = &self.env_prefix {
            sources.push(Arc::new(EnvSource::new().with_prefix(prefix.clone())));
        }

        Ok(sources)
    }

    /// A manager with every configured source registered.
    pub fn manager(&self) -> Result<Manager> {
        let manager = Manager::new();
        manager.add_sources(self.sources()?);
        Ok(manager)
    }
}

fn parse_key_value(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {arg:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty key in {arg:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_interval(arg: &str) -> Result<Duration> {
    crate::config::parse_duration(arg)
        .filter(|d| !d.is_zero())
        .with_context(|| format!("invalid interval {arg:?}"))
}
