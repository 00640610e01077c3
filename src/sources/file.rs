//! JSON/YAML file connector with a debounced file-system watcher.

use super::codec::{Format, flatten};
use super::priority;
use crate::config::{Event, EventKind, EventStream, Source, ValueMap, Watcher};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, Debouncer, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, mpsc as std_mpsc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default debounce window for coalescing rapid writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

const EVENT_BUFFER: usize = 16;

/// Configuration loaded from a single JSON or YAML file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    format: Format,
    priority: i32,
    debounce: Duration,
}

impl FileSource {
    /// Open `path`, detecting the format from its extension.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = Format::from_path(&path).ok_or_else(|| {
            anyhow!(
                "Unsupported config file extension: {} (expected .json, .yaml or .yml)",
                path.display()
            )
        })?;
        Self::with_format(path, format)
    }

    /// Open `path` with an explicit format, ignoring its extension.
    pub fn with_format(path: impl Into<PathBuf>, format: Format) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            format,
            priority: priority::FILE,
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    /// Override the default `priority::FILE`.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Debounce window for watchers created by this source.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The file as given, not canonicalized.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The decoding format in use.
    pub fn format(&self) -> Format {
        self.format
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn load(&self) -> Result<ValueMap> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;
        let doc = self
            .format
            .decode(&content)
            .with_context(|| format!("Failed to decode config file: {}", self.path.display()))?;
        Ok(flatten(&doc))
    }

    fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        Some(Arc::new(
            FileWatcher::new(&self.path, self.name.clone()).with_debounce(self.debounce),
        ))
    }
}

/// Watches one file through its parent directory and emits `Update` events
/// after each debounced change.
pub struct FileWatcher {
    path: PathBuf,
    source: String,
    debounce: Duration,
    running: Arc<Mutex<Option<Running>>>,
}

struct Running {
    _debouncer: Debouncer<RecommendedWatcher>,
    token: CancellationToken,
}

impl FileWatcher {
    /// Watch `path`, tagging events with `source`.
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            debounce: DEFAULT_DEBOUNCE,
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Canonical (directory, target) pair. Watching the directory survives
    /// editors that replace the file by rename.
    fn resolve(&self) -> Result<(PathBuf, PathBuf)> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| anyhow!("Not a file path: {}", self.path.display()))?;
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let dir = parent
            .canonicalize()
            .with_context(|| format!("Failed to resolve directory: {}", parent.display()))?;
        let target = dir.join(file_name);
        Ok((dir, target))
    }
}

#[async_trait]
impl Watcher for FileWatcher {
    async fn start(&self, cancel: CancellationToken) -> Result<EventStream> {
        let (dir, target) = self.resolve()?;
        let (notify_tx, notify_rx) = std_mpsc::channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            let _ = notify_tx.send(result);
        })
        .context("Failed to create file watcher")?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

        let token = cancel.child_token();
        {
            let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                bail!("Watcher for {} already started", self.source);
            }
            *slot = Some(Running {
                _debouncer: debouncer,
                token: token.clone(),
            });
        }
        info!(source = %self.source, dir = %dir.display(), "Watching config file");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let source = self.source.clone();
        // The notify channel closes once the debouncer is dropped, which ends
        // the forwarding loop and with it the event stream.
        tokio::task::spawn_blocking(move || forward_events(notify_rx, tx, &target, &source));

        let slot = Arc::clone(&self.running);
        tokio::spawn(async move {
            token.cancelled().await;
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        });

        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.token.cancel();
            debug!(source = %self.source, "File watcher stopped");
        }
        Ok(())
    }
}

fn forward_events(
    rx: std_mpsc::Receiver<DebounceEventResult>,
    tx: mpsc::Sender<Event>,
    target: &Path,
    source: &str,
) {
    while let Ok(result) = rx.recv() {
        let event = match result {
            Ok(events) => {
                let touched = events.iter().any(|e| {
                    matches!(
                        e.kind,
                        DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                    ) && e.path == target
                });
                if !touched {
                    continue;
                }
                debug!(source, path = %target.display(), "Config file changed");
                Event::new(EventKind::Update, source)
            }
            Err(e) => {
                warn!(source, error = %e, "File watcher error");
                Event::error(source, e)
            }
        };

        if tx.blocking_send(event).is_err() {
            debug!(source, "Event receiver dropped, stopping file watcher");
            return;
        }
    }
}
