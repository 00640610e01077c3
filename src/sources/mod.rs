//! Concrete configuration connectors.
//!
//! Each connector implements [`Source`](crate::config::Source) and, where
//! the backing store can report changes, a [`Watcher`](crate::config::Watcher).

pub mod codec;
pub mod env;
pub mod file;
pub mod memory;
pub mod poll;
pub mod sqlite;

pub use codec::{Format, flatten};
pub use env::EnvSource;
pub use file::{FileSource, FileWatcher};
pub use memory::{MemorySource, MemoryWatcher};
pub use poll::PollWatcher;
pub use sqlite::SqliteSource;

/// Conventional priority bands. Higher overrides lower.
pub mod priority {
    pub const ENV: i32 = 100;
    pub const REMOTE: i32 = 80;
    pub const DATABASE: i32 = 70;
    pub const FILE: i32 = 60;
    pub const DEFAULTS: i32 = 0;
}
