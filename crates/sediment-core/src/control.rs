//! The `ArchiveControl` trait: the four tiering entry points.
//!
//! The worker process implements it by running the tiering logic directly;
//! follower processes implement it by forwarding each call to the worker.
//! Callers (ingestion, the admin API, query resolution) do not know which.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{DataKind, SiteId};

/// Coarse classification of a control failure, stable across processes so a
/// forwarded refusal keeps its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
  /// Rotation or activation already in progress, bucket already activated.
  Precondition,
  NotFound,
  InvalidInput,
  /// The worker could not be reached or did not answer in time.
  Unavailable,
  Internal,
}

pub trait Classify {
  fn class(&self) -> ErrorClass;
}

pub trait ArchiveControl: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// Request a rotation pass for every configured kind of `site`. When
  /// `immediate` is false the request is debounced.
  fn trigger_rotation(
    &self,
    site: SiteId,
    immediate: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Promote the archive bucket `table` back into a queryable table.
  fn activate_archive(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Reset the rollback countdown for an activated bucket of `(site, kind)`.
  fn trigger_archive_rollback(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Drop the cached table catalog entry for `(site, kind)`.
  fn clear_archive_table(
    &self,
    site: SiteId,
    kind: DataKind,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

impl<A: ArchiveControl> ArchiveControl for Arc<A> {
  type Error = A::Error;

  fn trigger_rotation(
    &self,
    site: SiteId,
    immediate: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    (**self).trigger_rotation(site, immediate)
  }

  fn activate_archive(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    (**self).activate_archive(site, kind, table)
  }

  fn trigger_archive_rollback(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    (**self).trigger_archive_rollback(site, kind, table)
  }

  fn clear_archive_table(
    &self,
    site: SiteId,
    kind: DataKind,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    (**self).clear_archive_table(site, kind)
  }
}
