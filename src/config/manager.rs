//! Configuration manager.
//!
//! Owns the priority-sorted source registry, the published snapshot, the
//! started watchers and the change callbacks.
//!
//! ## Concurrency
//! - Registry, watcher list, callbacks and the closed flag sit behind one
//!   `RwLock` that is never held across an `.await`.
//! - The snapshot lives in an `ArcSwap`, so [`Manager::config`] is lock-free
//!   and a new snapshot is published with a single pointer swap.
//! - Reloads are serialized by an async mutex, so concurrent loads publish in
//!   a total order without blocking readers or `add_source`.
//! - Every monitoring task observes one lifetime `CancellationToken`, fired
//!   by [`Manager::close`] or on drop.

use super::event::Event;
use super::merge::{DefaultMerger, Merger};
use super::snapshot::Config;
use super::source::{EventStream, Source, Watcher};
use crate::error::{ConfigError, Result, StopFailure};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Callback invoked for every processed event with the previous and new
/// snapshots. Both snapshots are `None` for error events.
pub type ChangeCallback =
    Arc<dyn Fn(&Event, Option<&Arc<Config>>, Option<&Arc<Config>>) + Send + Sync>;

/// Name and priority of a registered source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub priority: i32,
}

struct Registered {
    id: u64,
    source: Arc<dyn Source>,
}

struct ActiveWatcher {
    source_name: String,
    watcher: Arc<dyn Watcher>,
}

struct StartedWatcher {
    id: u64,
    source_name: String,
    watcher: Arc<dyn Watcher>,
    events: EventStream,
}

#[derive(Default)]
struct State {
    /// Sorted ascending by priority; ties keep registration order.
    sources: Vec<Registered>,
    next_id: u64,
    watched: HashSet<u64>,
    watchers: Vec<ActiveWatcher>,
    callbacks: Vec<ChangeCallback>,
    closed: bool,
}

struct Shared {
    state: RwLock<State>,
    snapshot: ArcSwap<Config>,
    merger: Box<dyn Merger>,
    reload_lock: AsyncMutex<()>,
    watch_lock: AsyncMutex<()>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

/// Builder for [`Manager`].
pub struct ManagerBuilder {
    merger: Box<dyn Merger>,
    sources: Vec<Arc<dyn Source>>,
}

impl ManagerBuilder {
    /// Builder with the default merger and no sources.
    pub fn new() -> Self {
        Self {
            merger: Box::new(DefaultMerger),
            sources: Vec::new(),
        }
    }

    /// Replace the default last-writer-wins merge strategy.
    pub fn with_merger(mut self, merger: impl Merger + 'static) -> Self {
        self.merger = Box::new(merger);
        self
    }

    /// Register a source on the built manager.
    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Build the manager. Nothing is loaded until [`Manager::load`].
    pub fn build(self) -> Manager {
        let manager = Manager {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                snapshot: ArcSwap::from_pointee(Config::empty()),
                merger: self.merger,
                reload_lock: AsyncMutex::new(()),
                watch_lock: AsyncMutex::new(()),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        };
        if !self.sources.is_empty() {
            manager.add_sources(self.sources);
        }
        manager
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates loading, merging and watching of configuration sources.
///
/// One manager per logical application configuration; [`close`](Self::close)
/// is its explicit teardown.
pub struct Manager {
    shared: Arc<Shared>,
}

impl Manager {
    /// A manager with the default merger and no sources.
    pub fn new() -> Self {
        ManagerBuilder::new().build()
    }

    /// Start a [`ManagerBuilder`] for a custom merger or preset sources.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Register a source. The registry is re-sorted by priority.
    pub fn add_source(&self, source: impl Source + 'static) -> &Self {
        self.add_sources([Arc::new(source) as Arc<dyn Source>])
    }

    /// Register several sources at once, sorting the registry a single time.
    pub fn add_sources<I>(&self, sources: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn Source>>,
    {
        let mut state = self.shared.write_state();
        for source in sources {
            let id = state.next_id;
            state.next_id += 1;
            debug!(source = source.name(), priority = source.priority(), "Registered source");
            state.sources.push(Registered { id, source });
        }
        // Stable: equal priorities keep registration order, so the later
        // registration overrides on conflicting keys.
        state.sources.sort_by_key(|r| r.source.priority());
        self
    }

    /// Registered sources in merge order (lowest priority first).
    pub fn sources(&self) -> Vec<SourceInfo> {
        self.shared
            .read_state()
            .sources
            .iter()
            .map(|r| SourceInfo {
                name: r.source.name().to_string(),
                priority: r.source.priority(),
            })
            .collect()
    }

    /// Load every source in priority order, merge, and publish the result.
    ///
    /// Fails fast on the first source error and leaves the published
    /// snapshot untouched. Dropping the future before it resolves also
    /// leaves the snapshot untouched.
    pub async fn load(&self) -> Result<()> {
        self.shared.reload().await.map(|_| ())
    }

    /// Start watchers for every registered source that has one and is not
    /// already watched. Returns the number of watchers started.
    ///
    /// If any watcher fails to start, the watchers started by this call are
    /// stopped again before the error is returned.
    pub async fn watch(&self) -> Result<usize> {
        let _serial = self.shared.watch_lock.lock().await;

        let pending: Vec<(u64, Arc<dyn Source>)> = {
            let state = self.shared.read_state();
            if state.closed {
                return Err(ConfigError::Closed);
            }
            state
                .sources
                .iter()
                .filter(|r| !state.watched.contains(&r.id))
                .map(|r| (r.id, Arc::clone(&r.source)))
                .collect()
        };

        let batch = self.shared.cancel.child_token();
        let mut started: Vec<StartedWatcher> = Vec::new();

        for (id, source) in pending {
            let Some(watcher) = source.watcher() else {
                debug!(source = source.name(), "Source does not support watching");
                continue;
            };

            match watcher.start(batch.clone()).await {
                Ok(events) => {
                    debug!(source = source.name(), "Watcher started");
                    started.push(StartedWatcher {
                        id,
                        source_name: source.name().to_string(),
                        watcher,
                        events,
                    });
                }
                Err(cause) => {
                    let name = source.name().to_string();
                    warn!(
                        source = %name,
                        error = %cause,
                        rolled_back = started.len(),
                        "Failed to start watcher; rolling back watchers started by this call"
                    );
                    rollback(&batch, started).await;
                    return Err(ConfigError::WatchStart { name, cause });
                }
            }
        }

        let count = started.len();
        let closed = {
            let mut state = self.shared.write_state();
            if state.closed {
                true
            } else {
                for entry in started.drain(..) {
                    state.watched.insert(entry.id);
                    state.watchers.push(ActiveWatcher {
                        source_name: entry.source_name.clone(),
                        watcher: Arc::clone(&entry.watcher),
                    });
                    let shared = Arc::clone(&self.shared);
                    let cancel = batch.clone();
                    self.shared.tasks.spawn(async move {
                        shared.monitor(entry.source_name, entry.events, cancel).await;
                    });
                }
                false
            }
        };

        if closed {
            rollback(&batch, started).await;
            return Err(ConfigError::Closed);
        }

        info!(watchers = count, "Watching configuration sources");
        Ok(count)
    }

    /// Register a change callback. Callbacks run in registration order.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&Event, Option<&Arc<Config>>, Option<&Arc<Config>>) + Send + Sync + 'static,
    {
        self.shared.write_state().callbacks.push(Arc::new(callback));
    }

    /// The currently published snapshot.
    pub fn config(&self) -> Arc<Config> {
        self.shared.snapshot.load_full()
    }

    /// Whether [`Manager::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.shared.read_state().closed
    }

    /// Cancel every monitoring task, stop every started watcher once, and
    /// wait for the tasks to finish.
    ///
    /// Stop failures are collected rather than short-circuiting. Calling
    /// `close` again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let watchers = {
            let mut state = self.shared.write_state();
            state.closed = true;
            std::mem::take(&mut state.watchers)
        };

        self.shared.cancel.cancel();

        let mut failures = Vec::new();
        for active in watchers {
            if let Err(cause) = active.watcher.stop().await {
                warn!(source = %active.source_name, error = %cause, "Failed to stop watcher");
                failures.push(StopFailure {
                    source_name: active.source_name,
                    cause,
                });
            }
        }

        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        info!("Configuration manager closed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Shutdown(failures))
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl Shared {
    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load, merge and publish. Returns the (previous, new) snapshots.
    async fn reload(&self) -> Result<(Arc<Config>, Arc<Config>)> {
        let _serial = self.reload_lock.lock().await;

        let sources: Vec<Arc<dyn Source>> = self
            .read_state()
            .sources
            .iter()
            .map(|r| Arc::clone(&r.source))
            .collect();

        let mut maps = Vec::with_capacity(sources.len());
        for source in &sources {
            match source.load().await {
                Ok(values) => {
                    debug!(
                        source = source.name(),
                        priority = source.priority(),
                        keys = values.len(),
                        "Loaded source"
                    );
                    maps.push(values);
                }
                Err(cause) => {
                    warn!(
                        source = source.name(),
                        error = %cause,
                        "Source load failed; keeping current snapshot"
                    );
                    return Err(ConfigError::SourceLoad {
                        name: source.name().to_string(),
                        cause,
                    });
                }
            }
        }

        let next = Arc::new(Config::new(self.merger.merge(maps)));
        let previous = self.snapshot.swap(Arc::clone(&next));
        info!(
            sources = sources.len(),
            keys = next.len(),
            "Published configuration snapshot"
        );
        Ok((previous, next))
    }

    /// Consume one source's events until the stream closes or `cancel` fires.
    async fn monitor(
        &self,
        source_name: String,
        mut events: EventStream,
        cancel: CancellationToken,
    ) {
        debug!(source = %source_name, "Monitoring task started");

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!(source = %source_name, "Event stream closed");
                        break;
                    }
                },
            };

            if !event.requires_reload() {
                warn!(
                    source = %source_name,
                    error = ?event.error.as_deref().map(ToString::to_string),
                    "Watcher reported an error"
                );
                self.notify(&event, None, None);
                continue;
            }

            debug!(
                source = %source_name,
                kind = %event.kind,
                keys = event.keys.len(),
                "Change event received; reloading"
            );
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.reload() => outcome,
            };

            match outcome {
                Ok((previous, current)) => self.notify(&event, Some(&previous), Some(&current)),
                Err(err) => {
                    let failure =
                        Event::error(source_name.clone(), err).with_timestamp(event.timestamp);
                    self.notify(&failure, None, None);
                }
            }
        }

        debug!(source = %source_name, "Monitoring task stopped");
    }

    fn notify(&self, event: &Event, previous: Option<&Arc<Config>>, current: Option<&Arc<Config>>) {
        let callbacks = self.read_state().callbacks.clone();
        for callback in &callbacks {
            callback(event, previous, current);
        }
    }
}

/// Cancel and stop watchers that never made it into the registry.
async fn rollback(batch: &CancellationToken, started: Vec<StartedWatcher>) {
    batch.cancel();
    for entry in started {
        if let Err(cause) = entry.watcher.stop().await {
            warn!(
                source = %entry.source_name,
                error = %cause,
                "Failed to stop watcher during rollback"
            );
        }
    }
}
