//! Interval-driven watcher for sources without native change notification.
//!
//! Each tick re-fetches the full map and diffs it against the previous one.
//! A failed fetch is reported as an `Error` event and the next attempt waits
//! the retry backoff instead of the normal interval.

use crate::config::{Event, EventKind, EventStream, ValueMap, Watcher};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay before the next poll after a failed fetch.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

const EVENT_BUFFER: usize = 16;

type FetchFuture = Pin<Box<dyn Future<Output = Result<ValueMap>> + Send>>;
type Fetch = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Watcher that calls a fetch closure on an interval and emits the diff
/// between consecutive results.
pub struct PollWatcher {
    source: String,
    interval: Duration,
    retry_backoff: Duration,
    fetch: Fetch,
    running: Mutex<Option<CancellationToken>>,
}

impl PollWatcher {
    /// Poll `fetch` every `interval`, tagging events with `source`.
    pub fn new<F, Fut>(source: impl Into<String>, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ValueMap>> + Send + 'static,
    {
        Self {
            source: source.into(),
            interval,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            fetch: Arc::new(move || Box::pin(fetch()) as FetchFuture),
            running: Mutex::new(None),
        }
    }

    /// Override [`DEFAULT_RETRY_BACKOFF`].
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

#[async_trait]
impl Watcher for PollWatcher {
    async fn start(&self, cancel: CancellationToken) -> Result<EventStream> {
        let token = cancel.child_token();
        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if running.as_ref().is_some_and(|t| !t.is_cancelled()) {
                bail!("Watcher for {} already started", self.source);
            }
            *running = Some(token.clone());
        }

        let baseline = match (self.fetch)().await {
            Ok(values) => values,
            Err(e) => {
                token.cancel();
                return Err(e.context(format!("Initial poll of {} failed", self.source)));
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let poller = Poller {
            source: self.source.clone(),
            interval: self.interval,
            retry_backoff: self.retry_backoff,
            fetch: Arc::clone(&self.fetch),
            last: baseline,
        };
        tokio::spawn(poller.run(tx, token));
        debug!(source = %self.source, interval = ?self.interval, "Poll watcher started");
        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        if let Some(token) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
        Ok(())
    }
}

struct Poller {
    source: String,
    interval: Duration,
    retry_backoff: Duration,
    fetch: Fetch,
    last: ValueMap,
}

impl Poller {
    async fn run(mut self, tx: mpsc::Sender<Event>, cancel: CancellationToken) {
        let mut delay = self.interval;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = (self.fetch)() => fetched,
            };

            let event = match fetched {
                Ok(current) => {
                    delay = self.interval;
                    let event = diff(&self.source, &self.last, &current);
                    self.last = current;
                    match event {
                        Some(event) => event,
                        None => continue,
                    }
                }
                Err(e) => {
                    warn!(
                        source = %self.source,
                        error = %e,
                        retry_in = ?self.retry_backoff,
                        "Poll failed"
                    );
                    delay = self.retry_backoff;
                    Event::error(self.source.clone(), e)
                }
            };

            if tx.send(event).await.is_err() {
                break;
            }
        }
        debug!(source = %self.source, "Poll watcher stopped");
    }
}

/// Describe the change between two fetches, or `None` if nothing changed.
fn diff(source: &str, previous: &ValueMap, current: &ValueMap) -> Option<Event> {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for (key, value) in current {
        match previous.get(key) {
            None => added.push(key.clone()),
            Some(old) if old != value => changed.push(key.clone()),
            Some(_) => {}
        }
    }
    removed.extend(previous.keys().filter(|k| !current.contains_key(*k)).cloned());

    let kind = match (added.is_empty(), removed.is_empty(), changed.is_empty()) {
        (true, true, true) => return None,
        (false, true, true) => EventKind::Create,
        (true, false, true) => EventKind::Delete,
        _ => EventKind::Update,
    };

    let mut keys: Vec<String> = added.into_iter().chain(removed).chain(changed).collect();
    keys.sort();
    Some(Event::new(kind, source).with_keys(keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn map(entries: &[(&str, &str)]) -> ValueMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_diff_classification() {
        let base = map(&[("a", "1"), ("b", "2")]);

        assert!(diff("s", &base, &base.clone()).is_none());

        let created = diff("s", &base, &map(&[("a", "1"), ("b", "2"), ("c", "3")])).unwrap();
        assert_eq!(created.kind, EventKind::Create);
        assert_eq!(created.keys, vec!["c"]);

        let deleted = diff("s", &base, &map(&[("a", "1")])).unwrap();
        assert_eq!(deleted.kind, EventKind::Delete);
        assert_eq!(deleted.keys, vec!["b"]);

        let mixed = diff("s", &base, &map(&[("b", "9"), ("z", "0")])).unwrap();
        assert_eq!(mixed.kind, EventKind::Update);
        assert_eq!(mixed.keys, vec!["a", "b", "z"]);
    }

    #[tokio::test]
    async fn test_emits_on_change_and_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let watcher = PollWatcher::new("poll", Duration::from_millis(10), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Ok(map(&[("k", "v1")])),
                    1 => Ok(map(&[("k", "v2")])),
                    2 => Err(anyhow::anyhow!("backend unavailable")),
                    _ => Ok(map(&[("k", "v2")])),
                }
            }
        })
        .with_retry_backoff(Duration::from_millis(10));

        let mut events = watcher.start(CancellationToken::new()).await.unwrap();

        let update = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.kind, EventKind::Update);
        assert_eq!(update.keys, vec!["k"]);

        let error = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(error.is_error());

        watcher.stop().await.unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_start_fails_when_baseline_fails() {
        let watcher = PollWatcher::new("poll", Duration::from_secs(1), || async {
            Err::<ValueMap, _>(anyhow::anyhow!("no connection"))
        });
        let err = watcher.start(CancellationToken::new()).await.unwrap_err();
        assert!(format!("{err:#}").contains("no connection"));
    }
}
