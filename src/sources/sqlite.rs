//! SQLite key/value table connector.

use super::poll::PollWatcher;
use super::priority;
use crate::config::{Source, Value, ValueMap, Watcher};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "app_config";
pub const DEFAULT_KEY_COLUMN: &str = "key";
pub const DEFAULT_VALUE_COLUMN: &str = "value";

/// Reads `key`/`value` rows from a SQLite table.
///
/// The query runs on the blocking pool. Polling is opt-in through
/// [`with_poll_interval`](Self::with_poll_interval).
#[derive(Clone)]
pub struct SqliteSource {
    conn: Arc<Mutex<Connection>>,
    query: Query,
    priority: i32,
    poll_interval: Option<Duration>,
    retry_backoff: Option<Duration>,
}

#[derive(Debug, Clone)]
struct Query {
    table: String,
    key_column: String,
    value_column: String,
}

impl Query {
    fn sql(&self) -> String {
        format!(
            "SELECT \"{}\", \"{}\" FROM \"{}\"",
            self.key_column, self.value_column, self.table
        )
    }

    fn run(&self, conn: &Connection) -> Result<ValueMap> {
        let mut stmt = conn
            .prepare(&self.sql())
            .with_context(|| format!("Failed to prepare query on table {}", self.table))?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value = to_value(row.get_ref(1)?);
            Ok((key, value))
        })?;

        let mut values = ValueMap::new();
        for row in rows {
            let (key, value) =
                row.with_context(|| format!("Failed to read row from {}", self.table))?;
            values.insert(key, value);
        }
        Ok(values)
    }
}

impl SqliteSource {
    /// Open the database file at `path`. The file must already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("SQLite database not found: {}", path.display());
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        conn.execute_batch("PRAGMA busy_timeout=5000;")?;
        Ok(Self::from_connection(conn))
    }

    /// Use an already-open connection with the default table and columns.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            query: Query {
                table: DEFAULT_TABLE.to_string(),
                key_column: DEFAULT_KEY_COLUMN.to_string(),
                value_column: DEFAULT_VALUE_COLUMN.to_string(),
            },
            priority: priority::DATABASE,
            poll_interval: None,
            retry_backoff: None,
        }
    }

    /// Read from `table`. Fails unless the name is a plain identifier.
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self> {
        self.query.table = identifier(table.into())?;
        Ok(self)
    }

    /// Key and value column names, validated like the table name.
    pub fn with_columns(
        mut self,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Result<Self> {
        self.query.key_column = identifier(key_column.into())?;
        self.query.value_column = identifier(value_column.into())?;
        Ok(self)
    }

    /// Override the default `priority::DATABASE`.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Expose a polling watcher that re-reads the table every `interval`.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Delay after a failed poll before retrying.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    async fn fetch(conn: Arc<Mutex<Connection>>, query: Query) -> Result<ValueMap> {
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
            query.run(&conn)
        })
        .await
        .context("SQLite query task failed")?
    }
}

#[async_trait]
impl Source for SqliteSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn load(&self) -> Result<ValueMap> {
        Self::fetch(Arc::clone(&self.conn), self.query.clone()).await
    }

    fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        let interval = self.poll_interval?;
        let conn = Arc::clone(&self.conn);
        let query = self.query.clone();
        let mut watcher = PollWatcher::new(self.name(), interval, move || {
            Self::fetch(Arc::clone(&conn), query.clone())
        });
        if let Some(backoff) = self.retry_backoff {
            watcher = watcher.with_retry_backoff(backoff);
        }
        Some(Arc::new(watcher))
    }
}

fn to_value(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*` so identifiers can be quoted safely.
fn identifier(name: String) -> Result<String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(anyhow!("Invalid SQL identifier: {name:?}"))
    }
}
