//! Capability contracts implemented by configuration connectors.

use super::event::Event;
use super::value::ValueMap;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Stream of change events handed out by [`Watcher::start`].
pub type EventStream = mpsc::Receiver<Event>;

/// A provider of flat configuration data.
///
/// Sources are merged in ascending [`priority`](Source::priority) order, so a
/// higher-priority source overrides a lower one on shared keys.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier used in logs and error attribution.
    fn name(&self) -> &str;

    /// Merge precedence; higher wins.
    fn priority(&self) -> i32;

    /// Full read of the source's current data, already flattened to
    /// dot-delimited keys.
    async fn load(&self) -> anyhow::Result<ValueMap>;

    /// Change watcher, or `None` if this source cannot report changes.
    fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        None
    }
}

/// Asynchronous change reporting for one source.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Begin emitting events. Emission must stop once `cancel` fires.
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<EventStream>;

    /// Request shutdown. The stream returned by `start` must eventually close.
    async fn stop(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<S: Source + ?Sized> Source for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn priority(&self) -> i32 {
        (**self).priority()
    }

    async fn load(&self) -> anyhow::Result<ValueMap> {
        (**self).load().await
    }

    fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        (**self).watcher()
    }
}
