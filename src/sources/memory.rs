//! In-process configuration, typically used for defaults and tests.

use super::priority;
use crate::config::{Event, EventKind, EventStream, Source, Value, ValueMap, Watcher};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the watcher's event buffer.
pub const EVENT_BUFFER: usize = 64;

/// A mutable in-memory map exposed as a source.
///
/// Mutations made through [`set`](Self::set), [`remove`](Self::remove) and
/// [`replace`](Self::replace) are reported on the [`MemoryWatcher`] while one
/// is running.
#[derive(Clone)]
pub struct MemorySource {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    priority: i32,
    values: RwLock<ValueMap>,
    watcher: Arc<MemoryWatcher>,
}

impl MemorySource {
    /// An empty source.
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(Inner {
                watcher: Arc::new(MemoryWatcher::new(name.clone())),
                name,
                priority,
                values: RwLock::new(ValueMap::new()),
            }),
        }
    }

    /// Lowest-priority source named `defaults`.
    pub fn defaults() -> Self {
        Self::new("defaults", priority::DEFAULTS)
    }

    /// Seed values without emitting events.
    pub fn with_values<I, K, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Current value of `key` in this source only.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert or overwrite `key` and emit an `Update` event.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value.into());
        self.inner
            .watcher
            .emit(Event::new(EventKind::Update, &self.inner.name).with_keys([key]));
    }

    /// Remove a key. Emits nothing if the key was absent.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self
            .inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.inner
                .watcher
                .emit(Event::new(EventKind::Delete, &self.inner.name).with_keys([key]));
        }
        removed
    }

    /// Swap the whole map.
    pub fn replace(&self, values: ValueMap) {
        let mut keys: Vec<String> = values.keys().cloned().collect();
        let previous = std::mem::replace(
            &mut *self
                .inner
                .values
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            values,
        );
        keys.extend(previous.into_keys());
        keys.sort();
        keys.dedup();
        self.inner
            .watcher
            .emit(Event::new(EventKind::Reload, &self.inner.name).with_keys(keys));
    }

    /// Push an arbitrary event, such as a simulated fault, to the watcher.
    pub fn emit(&self, event: Event) {
        self.inner.watcher.emit(event);
    }
}

#[async_trait]
impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn priority(&self) -> i32 {
        self.inner.priority
    }

    async fn load(&self) -> Result<ValueMap> {
        Ok(self
            .inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        Some(self.inner.watcher.clone())
    }
}

/// Channel-backed watcher for a [`MemorySource`].
pub struct MemoryWatcher {
    source: String,
    active: Mutex<Option<(mpsc::Sender<Event>, CancellationToken)>>,
}

impl MemoryWatcher {
    fn new(source: String) -> Self {
        Self {
            source,
            active: Mutex::new(None),
        }
    }

    fn emit(&self, event: Event) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((tx, token)) = active.as_ref() else {
            return;
        };
        if token.is_cancelled() {
            *active = None;
            return;
        }
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    source = %self.source,
                    kind = %event.kind,
                    "Event buffer full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                *active = None;
            }
        }
    }
}

#[async_trait]
impl Watcher for MemoryWatcher {
    async fn start(&self, cancel: CancellationToken) -> Result<EventStream> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|(_, token)| !token.is_cancelled()) {
            bail!("Watcher for {} already started", self.source);
        }
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        *active = Some((tx, cancel));
        debug!(source = %self.source, "Memory watcher started");
        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        // Dropping the sender closes the stream.
        if self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!(source = %self.source, "Memory watcher stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_returns_current_values() {
        let source = MemorySource::defaults().with_values([("a", "1"), ("b", "2")]);
        assert_eq!(source.name(), "defaults");
        assert_eq!(source.priority(), priority::DEFAULTS);

        source.set("c", 3i64);
        assert_eq!(source.remove("a"), Some(Value::from("1")));

        let values = source.load().await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["c"], Value::Int(3));
    }

    #[tokio::test]
    async fn test_mutations_emit_events() {
        let source = MemorySource::new("mem", 10).with_values([("old", "x")]);
        let watcher = source.watcher().unwrap();
        let mut events = watcher.start(CancellationToken::new()).await.unwrap();

        source.set("k", "v");
        source.remove("k");
        source.remove("absent");
        source.replace([("new".to_string(), Value::from("y"))].into());

        let update = events.recv().await.unwrap();
        assert_eq!(update.kind, EventKind::Update);
        assert_eq!(update.keys, vec!["k"]);

        let delete = events.recv().await.unwrap();
        assert_eq!(delete.kind, EventKind::Delete);

        let reload = events.recv().await.unwrap();
        assert_eq!(reload.kind, EventKind::Reload);
        assert_eq!(reload.keys, vec!["new", "old"]);
        assert_eq!(reload.source, "mem");

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_events_before_start_and_stream_closes_on_stop() {
        let source = MemorySource::new("mem", 0);
        source.set("ignored", "x");

        let watcher = source.watcher().unwrap();
        let mut events = watcher.start(CancellationToken::new()).await.unwrap();
        assert!(events.try_recv().is_err());

        watcher.stop().await.unwrap();
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_events() {
        let source = MemorySource::new("mem", 0);
        let watcher = source.watcher().unwrap();
        let mut events = watcher.start(CancellationToken::new()).await.unwrap();

        for i in 0..EVENT_BUFFER + 10 {
            source.set(format!("k{i}"), "v");
        }

        let mut received = 0;
        while events.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, EVENT_BUFFER);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_emission() {
        let source = MemorySource::new("mem", 0);
        let token = CancellationToken::new();
        let mut events = source.watcher().unwrap().start(token.clone()).await.unwrap();

        token.cancel();
        source.set("k", "v");
        assert!(events.recv().await.is_none());
    }
}
