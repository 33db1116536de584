//! SQLite backend for Sediment: live-table ingestion plus the storage tiering
//! engine (rotation, activation/rollback, crash recovery).
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every process of a deployment opens the
//! same database file; only the worker process constructs an [`Archiver`].

mod activation;
mod archiver;
mod catalog;
mod ddl;
mod recovery;
mod resolve;
mod rotation;
mod scheduler;
mod schema;
mod store;
mod timers;

pub mod error;

pub use activation::{ActivationHandle, ActivationReport};
pub use archiver::Archiver;
pub use catalog::{Catalog, Listing, parse_listing};
pub use error::{Error, Result};
pub use recovery::RecoveryReport;
pub use resolve::resolve_tables_for_range;
pub use rotation::RotationReport;
pub use scheduler::{RotationScheduler, Scheduled, debounce_delay};
pub use store::SqliteStore;
pub use timers::RollbackTimers;
