//! Change events emitted by source watchers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of change a watcher observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// New keys appeared
    Create,
    /// Existing keys changed
    Update,
    /// Keys were removed
    Delete,
    /// The whole source should be re-read
    Reload,
    /// The watcher hit a fault; carries a cause
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Create => write!(f, "create"),
            EventKind::Update => write!(f, "update"),
            EventKind::Delete => write!(f, "delete"),
            EventKind::Reload => write!(f, "reload"),
            EventKind::Error => write!(f, "error"),
        }
    }
}

/// A change notification from one source.
///
/// Each event is consumed exactly once by the manager's monitoring task for
/// the source that produced it.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// Name of the originating source.
    pub source: String,
    /// Affected keys. Empty means "unknown, re-read everything".
    pub keys: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Failure cause, set for [`EventKind::Error`].
    pub error: Option<Arc<anyhow::Error>>,
}

impl Event {
    /// An event with no keys, stamped now.
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            keys: Vec::new(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// An error event carrying `cause`.
    pub fn error(source: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            error: Some(Arc::new(cause.into())),
            ..Self::new(EventKind::Error, source)
        }
    }

    /// Set the affected keys.
    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Override the timestamp, e.g. to keep the one from a triggering event.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// True for [`EventKind::Error`].
    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }

    /// Returns true if this event should trigger a reload.
    pub fn requires_reload(&self) -> bool {
        !self.is_error()
    }
}
