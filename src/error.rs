//! Error types for the configuration manager.
//!
//! Coercion mismatches are never errors; typed getters degrade to the caller's
//! default. Only loading, watching and shutdown surface failures here.

use std::fmt;
use thiserror::Error;

/// A watcher that failed to stop during [`Manager::close`](crate::config::Manager::close).
#[derive(Debug)]
pub struct StopFailure {
    pub source_name: String,
    pub cause: anyhow::Error,
}

impl fmt::Display for StopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_name, self.cause)
    }
}

#[derive(Debug, Error)]
/// Errors surfaced by the [`Manager`](crate::Manager).
pub enum ConfigError {
    /// A source's `load` failed; the published snapshot is unchanged.
    #[error("failed to load from source {name}: {cause}")]
    SourceLoad {
        name: String,
        #[source]
        cause: anyhow::Error,
    },

    /// A watcher's `start` failed; watchers started by the same call were
    /// rolled back.
    #[error("failed to start watcher for source {name}: {cause}")]
    WatchStart {
        name: String,
        #[source]
        cause: anyhow::Error,
    },

    /// One or more watchers failed to stop.
    #[error("errors while stopping watchers: {}", join_failures(.0))]
    Shutdown(Vec<StopFailure>),

    #[error("configuration manager is closed")]
    Closed,
}

impl ConfigError {
    /// Name of the source the error is attributed to, if any.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            ConfigError::SourceLoad { name, .. } | ConfigError::WatchStart { name, .. } => {
                Some(name.as_str())
            }
            ConfigError::Shutdown(_) | ConfigError::Closed => None,
        }
    }
}

fn join_failures(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for manager operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
