//! Configuration aggregation core.
//!
//! Sources hand over flat `key -> Value` maps, the [`Merger`] folds them in
//! ascending priority order, and the [`Manager`] publishes the result as an
//! immutable [`Config`] snapshot.
//!
//! ## Layers
//! 1. **Value** - type-erased datum with total, default-on-failure coercions
//! 2. **Merge** - last-writer-wins fold over priority-sorted maps
//! 3. **Snapshot** - immutable merged view with typed getters
//! 4. **Manager** - registry, load, watch, callbacks and shutdown
//!
//! The core never depends on a concrete connector; see [`crate::sources`].

mod event;
mod manager;
mod merge;
mod snapshot;
mod source;
mod value;

pub use event::{Event, EventKind};
pub use manager::{ChangeCallback, Manager, ManagerBuilder, SourceInfo};
pub use merge::{DefaultMerger, Merger, merge_all};
pub use snapshot::Config;
pub use source::{EventStream, Source, Watcher};
pub use value::{Value, ValueMap, format_duration, parse_duration};
