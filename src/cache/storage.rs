//! In-memory entry storage for the query cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::ApiError;
use crate::query::{QuerySnapshot, QueryState};

use super::data::QueryData;
use super::key::QueryKey;

/// One cached key: last good data, last failure and fetch bookkeeping.
#[derive(Debug, Clone)]
pub struct Entry {
  pub data: Option<Arc<QueryData>>,
  /// Failure of the latest fetch; cleared when a new fetch starts
  pub error: Option<ApiError>,
  /// When `data` was last written
  pub updated_at: Option<Instant>,
  /// Id of the fetch currently in flight
  pub in_flight: Option<u64>,
  /// Marked stale explicitly, regardless of age
  pub invalidated: bool,
  /// Stale-time override from the latest resolve
  pub stale_time: Option<Duration>,
  pub last_used: Instant,
}

impl Entry {
  pub fn new(now: Instant) -> Self {
    Self {
      data: None,
      error: None,
      updated_at: None,
      in_flight: None,
      invalidated: false,
      stale_time: None,
      last_used: now,
    }
  }

  /// The stale time this entry was last resolved with, else `default`
  pub fn effective_stale_time(&self, default: Duration) -> Duration {
    self.stale_time.unwrap_or(default)
  }

  pub fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
    self.invalidated
      || self
        .updated_at
        .map(|t| now.saturating_duration_since(t) >= stale_time)
        .unwrap_or(true)
  }

  /// A fetch is due when nothing is in flight and the entry is missing data,
  /// failed last time, or is stale.
  pub fn needs_fetch(&self, stale_time: Duration, now: Instant) -> bool {
    self.in_flight.is_none()
      && (self.data.is_none() || self.error.is_some() || self.is_stale(stale_time, now))
  }

  pub fn state(&self) -> QueryState {
    if self.error.is_some() {
      QueryState::Error
    } else if self.data.is_some() {
      QueryState::Success
    } else if self.in_flight.is_some() {
      QueryState::Loading
    } else {
      QueryState::Idle
    }
  }

  pub fn snapshot(&self, key: &QueryKey, stale_time: Duration, now: Instant) -> QuerySnapshot {
    QuerySnapshot {
      key: key.clone(),
      state: self.state(),
      data: self.data.clone(),
      error: self.error.clone(),
      is_fetching: self.in_flight.is_some(),
      is_stale: self.data.is_some() && self.is_stale(stale_time, now),
    }
  }
}

/// Keyed entry map
#[derive(Debug, Default)]
pub struct CacheStorage {
  entries: HashMap<QueryKey, Entry>,
}

impl CacheStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &QueryKey) -> Option<&Entry> {
    self.entries.get(key)
  }

  pub fn get_mut(&mut self, key: &QueryKey) -> Option<&mut Entry> {
    self.entries.get_mut(key)
  }

  pub fn get_or_insert(&mut self, key: QueryKey, now: Instant) -> &mut Entry {
    self.entries.entry(key).or_insert_with(|| Entry::new(now))
  }

  pub fn keys_matching<P>(&self, mut predicate: P) -> Vec<QueryKey>
  where
    P: FnMut(&QueryKey) -> bool,
  {
    self
      .entries
      .keys()
      .filter(|k| predicate(k))
      .cloned()
      .collect()
  }

  /// Remove entries that are idle, unobserved and unused for `gc_time`.
  pub fn evict_unused(&mut self, gc_time: Duration, active: &[QueryKey], now: Instant) -> Vec<QueryKey> {
    let expired = self.keys_matching(|_| true);
    let mut evicted = Vec::new();
    for key in expired {
      let Some(entry) = self.entries.get(&key) else {
        continue;
      };
      if entry.in_flight.is_none()
        && !active.contains(&key)
        && now.saturating_duration_since(entry.last_used) >= gc_time
      {
        self.entries.remove(&key);
        evicted.push(key);
      }
    }
    evicted
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{Filters, Resource};

  fn key(page: u32) -> QueryKey {
    QueryKey::page(Resource::Links, page, 10, Filters::new())
  }

  #[test]
  fn test_new_entry_needs_fetch() {
    let now = Instant::now();
    let entry = Entry::new(now);
    assert!(entry.needs_fetch(Duration::from_secs(30), now));
    assert_eq!(entry.state(), QueryState::Idle);
  }

  #[test]
  fn test_in_flight_entry_never_needs_fetch() {
    let now = Instant::now();
    let mut entry = Entry::new(now);
    entry.in_flight = Some(1);
    entry.invalidated = true;
    assert!(!entry.needs_fetch(Duration::ZERO, now));
    assert_eq!(entry.state(), QueryState::Loading);
  }

  #[test]
  fn test_fresh_entry_does_not_need_fetch() {
    let now = Instant::now();
    let mut entry = Entry::new(now);
    entry.data = Some(Arc::new(QueryData::LinkStats(Default::default())));
    entry.updated_at = Some(now);
    assert!(!entry.needs_fetch(Duration::from_secs(30), now));
    assert!(entry.needs_fetch(Duration::ZERO, now));

    entry.invalidated = true;
    assert!(entry.needs_fetch(Duration::from_secs(30), now));
  }

  #[test]
  fn test_failed_entry_keeps_data_and_reports_error() {
    let now = Instant::now();
    let mut entry = Entry::new(now);
    entry.data = Some(Arc::new(QueryData::LinkStats(Default::default())));
    entry.updated_at = Some(now);
    entry.error = Some(ApiError::Timeout);
    assert_eq!(entry.state(), QueryState::Error);
    assert!(entry.needs_fetch(Duration::from_secs(30), now));
  }

  #[test]
  fn test_effective_stale_time_prefers_override() {
    let now = Instant::now();
    let mut entry = Entry::new(now);
    assert_eq!(entry.effective_stale_time(Duration::from_secs(30)), Duration::from_secs(30));

    entry.stale_time = Some(Duration::from_secs(5));
    assert_eq!(entry.effective_stale_time(Duration::from_secs(30)), Duration::from_secs(5));
  }

  #[test]
  fn test_evict_skips_active_and_in_flight() {
    let start = Instant::now();
    let mut storage = CacheStorage::new();
    storage.get_or_insert(key(1), start);
    storage.get_or_insert(key(2), start);
    storage.get_or_insert(key(3), start).in_flight = Some(9);

    let later = start + Duration::from_secs(10);
    let evicted = storage.evict_unused(Duration::from_secs(5), &[key(2)], later);

    assert_eq!(evicted, vec![key(1)]);
    assert_eq!(storage.len(), 2);
  }
}
