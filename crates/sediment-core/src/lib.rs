//! Core types and trait definitions for the Sediment telemetry tiering engine.
//!
//! This crate is free of database and network dependencies. Everything that
//! decides *where* a monitoring row lives (table names, bucket windows,
//! rotation policies) is expressed here as plain data and pure functions; the
//! storage and coordination crates depend on it.

pub mod control;
pub mod error;
pub mod naming;
pub mod period;
pub mod policy;
pub mod reading;
pub mod site;

pub use control::{ArchiveControl, Classify, ErrorClass};
pub use error::{Error, Result};
pub use naming::{ArchiveTable, TableStatus};
pub use period::{Period, Window};
pub use policy::{Role, RotationPolicy, SitePolicies};
pub use reading::{ColumnValue, Reading};
pub use site::{DataKind, SiteId};
