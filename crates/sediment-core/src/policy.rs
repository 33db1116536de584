//! Rotation policies and process role.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{DataKind, Period, SiteId};

pub const DEFAULT_BATCH_SIZE: u32 = 5000;
pub const DEFAULT_REACTIVATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How one site's stream of one [`DataKind`] is tiered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
  pub kind:                 DataKind,
  /// How far back rows may stay in the live table.
  pub active_period:        Period,
  /// Width of archive buckets.
  pub archive_period:       Period,
  #[serde(default = "default_batch_size")]
  pub batch_size:           u32,
  /// Idle time after which an activated bucket is rolled back.
  #[serde(
    rename = "reactivation_timeout_secs",
    with = "duration_secs",
    default = "default_reactivation_timeout"
  )]
  pub reactivation_timeout: Duration,
}

fn default_batch_size() -> u32 { DEFAULT_BATCH_SIZE }

fn default_reactivation_timeout() -> Duration { DEFAULT_REACTIVATION_TIMEOUT }

impl RotationPolicy {
  pub fn new(kind: DataKind, active_period: Period, archive_period: Period) -> Self {
    Self {
      kind,
      active_period,
      archive_period,
      batch_size: DEFAULT_BATCH_SIZE,
      reactivation_timeout: DEFAULT_REACTIVATION_TIMEOUT,
    }
  }

  pub fn with_batch_size(mut self, batch_size: u32) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_reactivation_timeout(mut self, timeout: Duration) -> Self {
    self.reactivation_timeout = timeout;
    self
  }
}

mod duration_secs {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
  }
}

// ─── SitePolicies ─────────────────────────────────────────────────────────────

/// Policies for every configured site. Loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitePolicies(BTreeMap<SiteId, Vec<RotationPolicy>>);

impl SitePolicies {
  pub fn new() -> Self { Self::default() }

  /// Add or replace the policy for `(site, policy.kind)`.
  pub fn insert(&mut self, site: SiteId, policy: RotationPolicy) {
    let entry = self.0.entry(site).or_default();
    entry.retain(|p| p.kind != policy.kind);
    entry.push(policy);
    entry.sort_by_key(|p| p.kind);
  }

  pub fn with(mut self, site: SiteId, policy: RotationPolicy) -> Self {
    self.insert(site, policy);
    self
  }

  pub fn for_site(&self, site: &SiteId) -> &[RotationPolicy] {
    self.0.get(site).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn get(&self, site: &SiteId, kind: DataKind) -> Option<&RotationPolicy> {
    self.for_site(site).iter().find(|p| p.kind == kind)
  }

  pub fn sites(&self) -> impl Iterator<Item = &SiteId> { self.0.keys() }

  pub fn iter(&self) -> impl Iterator<Item = (&SiteId, &RotationPolicy)> {
    self.0.iter().flat_map(|(site, ps)| ps.iter().map(move |p| (site, p)))
  }
}

// ─── Role ─────────────────────────────────────────────────────────────────────

/// Whether this process runs the tiering logic or forwards to the process
/// that does. Exactly one process per deployment is the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Worker,
  Follower,
}

impl Role {
  pub fn from_flag(is_archive_worker: bool) -> Self {
    if is_archive_worker { Role::Worker } else { Role::Follower }
  }

  pub fn is_worker(self) -> bool { self == Role::Worker }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn policy_defaults_apply() {
    let p: RotationPolicy = serde_json::from_str(
      r#"{"kind":"hourly","active_period":"month","archive_period":"quarter"}"#,
    )
    .unwrap();
    assert_eq!(p.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(p.reactivation_timeout, DEFAULT_REACTIVATION_TIMEOUT);
    assert_eq!(p.archive_period, Period::Quarter);
  }

  #[test]
  fn insert_replaces_same_kind() {
    let site = SiteId::new("s1").unwrap();
    let mut policies = SitePolicies::new();
    policies.insert(site.clone(), RotationPolicy::new(DataKind::Hourly, Period::Month, Period::Month));
    policies.insert(site.clone(), RotationPolicy::new(DataKind::Hourly, Period::Year, Period::Year));
    policies.insert(site.clone(), RotationPolicy::new(DataKind::Daily, Period::Year, Period::Year));

    assert_eq!(policies.for_site(&site).len(), 2);
    assert_eq!(policies.get(&site, DataKind::Hourly).unwrap().active_period, Period::Year);
    assert!(policies.for_site(&SiteId::new("other").unwrap()).is_empty());
  }
}
