//! Watch subcommand: print a change report for every processed event.

use super::OutputFormat;
use crate::config::{Config, Event, Manager};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Arguments for the watch subcommand
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// What one callback invocation observed.
#[derive(Debug, Serialize)]
pub struct ChangeReport {
    pub event: String,
    pub source: String,
    pub timestamp: String,
    pub changed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeReport {
    /// Summarize one callback, diffing the snapshots when both are present.
    pub fn new(
        event: &Event,
        previous: Option<&Arc<Config>>,
        current: Option<&Arc<Config>>,
    ) -> Self {
        let changed = match (previous, current) {
            (Some(previous), Some(current)) => previous.changed_keys(current),
            _ => Vec::new(),
        };
        Self {
            event: event.kind.to_string(),
            source: event.source.clone(),
            timestamp: event.timestamp.to_rfc3339(),
            changed,
            error: event.error.as_ref().map(|e| format!("{e:#}")),
        }
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string(self).unwrap_or_default(),
            OutputFormat::Text => match &self.error {
                Some(error) => format!("[{}] {} error: {error}", self.timestamp, self.source),
                None if self.changed.is_empty() => {
                    format!("[{}] {} {}: no changes", self.timestamp, self.source, self.event)
                }
                None => format!(
                    "[{}] {} {}: {}",
                    self.timestamp,
                    self.source,
                    self.event,
                    self.changed.join(", ")
                ),
            },
        }
    }
}

/// Load, start watching, print reports until `shutdown` resolves, then close.
pub async fn run<F>(manager: &Manager, args: &WatchArgs, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    manager.load().await?;

    let format = args.format;
    manager.on_change(move |event, previous, current| {
        println!("{}", ChangeReport::new(event, previous, current).render(format));
    });

    let started = manager.watch().await?;
    info!(watchers = started, "Watching for changes; press Ctrl-C to stop");

    shutdown.await;
    manager.close().await?;
    Ok(())
}
