//! Layered configuration aggregation.
//!
//! Configuration is gathered from prioritized [`Source`](config::Source)s,
//! merged into an immutable [`Config`](config::Config) snapshot, and
//! republished whenever a source's watcher reports a change.
//!
//! ```no_run
//! use stratum_config::config::Manager;
//! use stratum_config::sources::{EnvSource, FileSource};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manager = Manager::new();
//! manager
//!     .add_source(FileSource::new("config.yaml")?)
//!     .add_source(EnvSource::new().with_prefix("APP_"));
//! manager.load().await?;
//! manager.watch().await?;
//!
//! let port = manager.config().get_int("server.port", 8080);
//! # let _ = port;
//! manager.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod sources;

pub use config::{Config, Manager, Value};
pub use error::{ConfigError, Result};
