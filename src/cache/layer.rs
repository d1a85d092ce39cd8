//! Query cache that orchestrates cached entries with network fetching.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::notify::Notifier;
use crate::query::{QueryOptions, QuerySnapshot};

use super::data::QueryData;
use super::key::{QueryKey, Resource};
use super::storage::CacheStorage;

/// Result of a fetch function
pub type FetchResult = Result<QueryData, ApiError>;

/// Change notifications published by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// A fetch for the key landed (success or failure) or data was seeded
  Updated(QueryKey),
  /// The key was marked stale
  Invalidated(QueryKey),
  /// The key was dropped by garbage collection
  Evicted(QueryKey),
}

struct FetchOutcome {
  key: QueryKey,
  fetch_id: u64,
  result: FetchResult,
}

/// Cache changes that follow a completed server write: resources whose
/// pages are now out of date, and entries whose value is already known.
#[derive(Debug, Default)]
pub struct CacheWrite {
  invalidate: Vec<Resource>,
  seed: Vec<(QueryKey, QueryData)>,
}

impl CacheWrite {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn invalidate(mut self, resource: Resource) -> Self {
    self.invalidate.push(resource);
    self
  }

  pub fn seed(mut self, key: QueryKey, data: QueryData) -> Self {
    self.seed.push((key, data));
    self
  }
}

/// Sending half for `CacheWrite`s, usable from spawned tasks.
///
/// Writes are queued on the cache itself, so they are applied on the next
/// `poll()`/`recv()` even if whoever started the write is gone by then.
#[derive(Clone)]
pub struct CacheWriter {
  tx: mpsc::UnboundedSender<Delivery>,
}

impl CacheWriter {
  pub fn send(&self, write: CacheWrite) {
    // Ignore send errors - the cache may have been dropped
    let _ = self.tx.send(Delivery::Write(write));
  }
}

enum Delivery {
  Fetch(FetchOutcome),
  Write(CacheWrite),
}

/// Keyed, de-duplicated, time-aware cache of server responses.
///
/// Owned by the UI task and passed explicitly to controllers. Fetches run as
/// spawned tasks; their results are applied only when the owner calls
/// `poll()` or `recv()`, so every state change happens on the owner's task.
pub struct QueryCache {
  entries: CacheStorage,
  /// How long before fetched data is considered stale
  stale_time: Duration,
  /// How long an unobserved entry is kept
  gc_time: Duration,
  next_fetch_id: u64,
  tx: mpsc::UnboundedSender<Delivery>,
  rx: mpsc::UnboundedReceiver<Delivery>,
  events: Notifier<CacheEvent>,
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

impl QueryCache {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      entries: CacheStorage::new(),
      stale_time: Duration::from_secs(30),
      gc_time: Duration::from_secs(300),
      next_fetch_id: 0,
      tx,
      rx,
      events: Notifier::new(),
    }
  }

  /// Set the default stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Set how long unobserved entries survive garbage collection.
  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }

  pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CacheEvent> {
    self.events.subscribe()
  }

  pub fn writer(&self) -> CacheWriter {
    CacheWriter {
      tx: self.tx.clone(),
    }
  }

  /// Return the freshest known value for `key`, starting a fetch when the
  /// entry is missing, failed or stale.
  ///
  /// - Stale data is returned immediately while the refetch runs.
  /// - At most one fetch per key is in flight; a call that finds one running
  ///   attaches to it and `fetcher` is never invoked.
  /// - With `enabled == false` nothing is fetched and the snapshot is never
  ///   in a loading state.
  pub fn resolve<F, Fut>(&mut self, key: QueryKey, fetcher: F, options: QueryOptions) -> QuerySnapshot
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    let now = Instant::now();

    if !options.enabled {
      return self.disabled_snapshot(key, options.stale_time, now);
    }

    let entry = self.entries.get_or_insert(key.clone(), now);
    entry.last_used = now;
    entry.stale_time = options.stale_time;
    let stale_time = entry.effective_stale_time(self.stale_time);

    if entry.needs_fetch(stale_time, now) {
      self.next_fetch_id += 1;
      let fetch_id = self.next_fetch_id;

      entry.in_flight = Some(fetch_id);
      entry.error = None;
      entry.invalidated = false;

      debug!(key = %key, fetch_id, "starting fetch");
      let future = fetcher();
      let tx = self.tx.clone();
      let outcome_key = key.clone();
      tokio::spawn(async move {
        let result = future.await;
        // Ignore send errors - the cache may have been dropped
        let _ = tx.send(Delivery::Fetch(FetchOutcome {
          key: outcome_key,
          fetch_id,
          result,
        }));
      });
    } else if entry.in_flight.is_some() {
      debug!(key = %key, "joining in-flight fetch");
    }

    entry.snapshot(&key, stale_time, now)
  }

  /// Current snapshot without starting a fetch, judged by the stale time
  /// the key was last resolved with.
  pub fn peek(&self, key: &QueryKey) -> QuerySnapshot {
    match self.entries.get(key) {
      Some(entry) => {
        let stale_time = entry.effective_stale_time(self.stale_time);
        entry.snapshot(key, stale_time, Instant::now())
      }
      None => QuerySnapshot::idle(key.clone()),
    }
  }

  fn disabled_snapshot(
    &self,
    key: QueryKey,
    stale_time: Option<Duration>,
    now: Instant,
  ) -> QuerySnapshot {
    match self.entries.get(&key) {
      Some(entry) if entry.data.is_some() => {
        let stale_time = stale_time.unwrap_or_else(|| entry.effective_stale_time(self.stale_time));
        let mut snapshot = entry.snapshot(&key, stale_time, now);
        snapshot.is_fetching = false;
        snapshot
      }
      _ => QuerySnapshot::idle(key),
    }
  }

  /// Apply all results that have arrived, without waiting.
  ///
  /// Returns `true` if any entry changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(delivery) = self.rx.try_recv() {
      changed |= self.deliver(delivery);
    }
    changed
  }

  /// Wait for the next result to arrive and apply it.
  ///
  /// Returns `true` if it changed an entry, `false` if it was discarded.
  pub async fn recv(&mut self) -> bool {
    match self.rx.recv().await {
      Some(delivery) => self.deliver(delivery),
      None => false,
    }
  }

  fn deliver(&mut self, delivery: Delivery) -> bool {
    match delivery {
      Delivery::Fetch(outcome) => self.apply(outcome),
      Delivery::Write(write) => {
        self.reconcile(write);
        true
      }
    }
  }

  fn reconcile(&mut self, write: CacheWrite) {
    for resource in write.invalidate {
      self.invalidate_resource(resource);
    }
    for (key, data) in write.seed {
      self.set_data(key, data);
    }
  }

  fn apply(&mut self, outcome: FetchOutcome) -> bool {
    let FetchOutcome {
      key,
      fetch_id,
      result,
    } = outcome;

    let Some(entry) = self.entries.get_mut(&key) else {
      debug!(key = %key, fetch_id, "discarding response for unknown entry");
      return false;
    };
    if entry.in_flight != Some(fetch_id) {
      debug!(key = %key, fetch_id, "discarding superseded response");
      return false;
    }

    entry.in_flight = None;
    match result {
      Ok(data) => {
        entry.data = Some(Arc::new(data));
        entry.error = None;
        entry.updated_at = Some(Instant::now());
      }
      Err(e) => {
        warn!(key = %key, error = %e, "fetch failed");
        entry.error = Some(e);
      }
    }

    self.events.publish(CacheEvent::Updated(key));
    true
  }

  /// Mark every key matching `predicate` as stale so the next `resolve`
  /// refetches it. In-flight fetches are left running; the entry stays
  /// stale after they land.
  pub fn invalidate_where<P>(&mut self, predicate: P) -> usize
  where
    P: FnMut(&QueryKey) -> bool,
  {
    let keys = self.entries.keys_matching(predicate);
    for key in &keys {
      if let Some(entry) = self.entries.get_mut(key) {
        entry.invalidated = true;
      }
      self.events.publish(CacheEvent::Invalidated(key.clone()));
    }
    keys.len()
  }

  /// Invalidate everything under one resource.
  pub fn invalidate_resource(&mut self, resource: Resource) -> usize {
    let count = self.invalidate_where(|k| k.resource() == resource);
    info!(resource = resource.name(), count, "invalidated resource");
    count
  }

  pub fn invalidate(&mut self, key: &QueryKey) -> bool {
    self.invalidate_where(|k| k == key) > 0
  }

  /// Seed an entry with known-good data, as if a fetch had just returned it.
  pub fn set_data(&mut self, key: QueryKey, data: QueryData) {
    let now = Instant::now();
    let entry = self.entries.get_or_insert(key.clone(), now);
    entry.data = Some(Arc::new(data));
    entry.error = None;
    entry.updated_at = Some(now);
    entry.invalidated = false;
    entry.last_used = now;
    self.events.publish(CacheEvent::Updated(key));
  }

  /// Evict entries unused for longer than the gc time, except those in
  /// `active` and those with a fetch in flight.
  pub fn collect_garbage(&mut self, active: &[QueryKey]) -> usize {
    let evicted = self
      .entries
      .evict_unused(self.gc_time, active, Instant::now());
    let count = evicted.len();
    for key in evicted {
      debug!(key = %key, "evicted");
      self.events.publish(CacheEvent::Evicted(key));
    }
    count
  }

  #[cfg(test)]
  pub fn contains(&self, key: &QueryKey) -> bool {
    self.entries.get(key).is_some()
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.entries.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::LinkStats;
  use crate::cache::Filters;
  use crate::query::QueryState;
  use std::sync::atomic::{AtomicU32, Ordering};
  use tokio::sync::Semaphore;

  fn stats_key(id: i64) -> QueryKey {
    QueryKey::entity(Resource::LinkStats, id)
  }

  fn stats(total: u64) -> QueryData {
    QueryData::LinkStats(LinkStats {
      total_clicks: total,
      bot_clicks: 0,
      country_stats: Vec::new(),
    })
  }

  /// Fetcher that counts invocations and waits on a gate before answering
  fn gated(
    calls: &Arc<AtomicU32>,
    gate: &Arc<Semaphore>,
    result: FetchResult,
  ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = FetchResult> + Send>> {
    let calls = calls.clone();
    let gate = gate.clone();
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move {
        let _permit = gate.acquire().await;
        result
      })
    }
  }

  #[tokio::test]
  async fn test_resolve_fetches_and_stores() {
    let mut cache = QueryCache::new();
    let snapshot = cache.resolve(stats_key(1), || async { Ok(stats(5)) }, QueryOptions::default());
    assert!(snapshot.is_loading());
    assert!(snapshot.is_fetching);

    assert!(cache.recv().await);

    let snapshot = cache.peek(&stats_key(1));
    assert!(snapshot.is_success());
    assert_eq!(
      snapshot.data().and_then(|d| d.as_link_stats()).map(|s| s.total_clicks),
      Some(5)
    );
  }

  #[tokio::test]
  async fn test_equal_keys_share_one_fetch() {
    let mut cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let mut filters_a = Filters::new();
    filters_a.set(crate::cache::FilterField::IsBot, Some(crate::cache::FilterValue::Flag(true)));
    let filters_b = filters_a.clone();

    let key_a = QueryKey::page(Resource::Clicks, 1, 10, filters_a);
    let key_b = QueryKey::page(Resource::Clicks, 1, 10, filters_b);

    cache.resolve(key_a, gated(&calls, &gate, Ok(stats(1))), QueryOptions::default());
    let second = cache.resolve(key_b, gated(&calls, &gate, Ok(stats(2))), QueryOptions::default());

    assert!(second.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.add_permits(1);
    assert!(cache.recv().await);
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn test_disabled_query_never_fetches() {
    let mut cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(1));

    let snapshot = cache.resolve(
      stats_key(1),
      gated(&calls, &gate, Ok(stats(1))),
      QueryOptions::enabled(false),
    );

    assert_eq!(snapshot.state, QueryState::Idle);
    assert!(!snapshot.is_loading());
    assert!(snapshot.data().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!cache.contains(&stats_key(1)));
  }

  #[tokio::test]
  async fn test_stale_data_is_served_while_refetching() {
    let mut cache = QueryCache::new().with_stale_time(Duration::ZERO);
    cache.resolve(stats_key(1), || async { Ok(stats(1)) }, QueryOptions::default());
    cache.recv().await;

    let snapshot = cache.resolve(stats_key(1), || async { Ok(stats(2)) }, QueryOptions::default());
    assert!(snapshot.is_success());
    assert!(snapshot.is_fetching);
    assert_eq!(
      snapshot.data().and_then(|d| d.as_link_stats()).map(|s| s.total_clicks),
      Some(1)
    );

    cache.recv().await;
    assert_eq!(
      cache
        .peek(&stats_key(1))
        .data()
        .and_then(|d| d.as_link_stats())
        .map(|s| s.total_clicks),
      Some(2)
    );
  }

  #[tokio::test]
  async fn test_fresh_data_is_not_refetched() {
    let mut cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(10));

    cache.resolve(stats_key(1), gated(&calls, &gate, Ok(stats(1))), QueryOptions::default());
    cache.recv().await;
    let snapshot = cache.resolve(stats_key(1), gated(&calls, &gate, Ok(stats(2))), QueryOptions::default());

    assert!(!snapshot.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failure_is_exposed_then_retried() {
    let mut cache = QueryCache::new();
    cache.resolve(
      stats_key(1),
      || async { Err(ApiError::Network("connection refused".into())) },
      QueryOptions::default(),
    );
    cache.recv().await;

    let snapshot = cache.peek(&stats_key(1));
    assert!(snapshot.is_error());
    assert_eq!(
      snapshot.error(),
      Some(&ApiError::Network("connection refused".into()))
    );

    // Next resolve retries instead of returning the failure forever
    let snapshot = cache.resolve(stats_key(1), || async { Ok(stats(3)) }, QueryOptions::default());
    assert!(snapshot.is_loading());
    cache.recv().await;
    assert!(cache.peek(&stats_key(1)).is_success());
  }

  #[tokio::test]
  async fn test_failure_does_not_touch_other_keys() {
    let mut cache = QueryCache::new();
    cache.resolve(stats_key(1), || async { Ok(stats(1)) }, QueryOptions::default());
    cache.recv().await;
    cache.resolve(stats_key(2), || async { Err(ApiError::Timeout) }, QueryOptions::default());
    cache.recv().await;

    assert!(cache.peek(&stats_key(1)).is_success());
    assert!(cache.peek(&stats_key(2)).is_error());
  }

  #[tokio::test]
  async fn test_invalidate_resource_forces_refetch() {
    let mut cache = QueryCache::new();
    let links = QueryKey::page(Resource::Links, 1, 10, Filters::new());
    let calls = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(10));

    cache.resolve(links.clone(), gated(&calls, &gate, Ok(stats(1))), QueryOptions::default());
    cache.resolve(stats_key(1), || async { Ok(stats(1)) }, QueryOptions::default());
    cache.recv().await;
    cache.recv().await;

    let mut events = cache.subscribe();
    assert_eq!(cache.invalidate_resource(Resource::Links), 1);
    assert_eq!(events.try_recv().ok(), Some(CacheEvent::Invalidated(links.clone())));

    let snapshot = cache.resolve(links, gated(&calls, &gate, Ok(stats(2))), QueryOptions::default());
    assert!(snapshot.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!cache.peek(&stats_key(1)).is_stale);
  }

  #[tokio::test]
  async fn test_invalidation_during_fetch_keeps_entry_stale() {
    let mut cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(0));

    cache.resolve(stats_key(1), gated(&calls, &gate, Ok(stats(1))), QueryOptions::default());
    cache.invalidate(&stats_key(1));

    // Still only one fetch in flight
    cache.resolve(stats_key(1), gated(&calls, &gate, Ok(stats(2))), QueryOptions::default());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.add_permits(1);
    cache.recv().await;
    assert!(cache.peek(&stats_key(1)).is_stale);

    gate.add_permits(1);
    cache.resolve(stats_key(1), gated(&calls, &gate, Ok(stats(2))), QueryOptions::default());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_peek_uses_resolved_stale_time() {
    let mut cache = QueryCache::new();
    let options = QueryOptions::default().with_stale_time(Duration::ZERO);
    cache.resolve(stats_key(1), || async { Ok(stats(1)) }, options);
    cache.recv().await;

    // The cache-wide 30s would call this fresh
    assert!(cache.peek(&stats_key(1)).is_stale);

    cache.resolve(stats_key(2), || async { Ok(stats(2)) }, QueryOptions::default());
    cache.recv().await;
    assert!(!cache.peek(&stats_key(2)).is_stale);
  }

  #[tokio::test]
  async fn test_write_from_dropped_owner_still_applies() {
    let mut cache = QueryCache::new();
    let links = QueryKey::page(Resource::Links, 1, 10, Filters::new());
    cache.resolve(links.clone(), || async { Ok(stats(1)) }, QueryOptions::default());
    cache.recv().await;

    let writer = cache.writer();
    let task = tokio::spawn(async move {
      writer.send(
        CacheWrite::new()
          .invalidate(Resource::Links)
          .seed(stats_key(7), stats(7)),
      );
    });
    task.await.unwrap();

    assert!(cache.recv().await);
    assert!(cache.peek(&links).is_stale);
    assert!(cache.peek(&stats_key(7)).is_success());
  }

  #[tokio::test]
  async fn test_set_data_seeds_entry() {
    let mut cache = QueryCache::new();
    let mut events = cache.subscribe();
    cache.set_data(stats_key(9), stats(9));

    assert_eq!(events.try_recv().ok(), Some(CacheEvent::Updated(stats_key(9))));
    let snapshot = cache.resolve(
      stats_key(9),
      || async { Err(ApiError::Timeout) },
      QueryOptions::default(),
    );
    assert!(snapshot.is_success());
    assert!(!snapshot.is_fetching);
  }

  #[tokio::test]
  async fn test_garbage_collection_keeps_active_keys() {
    let mut cache = QueryCache::new().with_gc_time(Duration::ZERO);
    cache.set_data(stats_key(1), stats(1));
    cache.set_data(stats_key(2), stats(2));

    assert_eq!(cache.collect_garbage(&[stats_key(2)]), 1);
    assert!(!cache.contains(&stats_key(1)));
    assert!(cache.contains(&stats_key(2)));
  }

  #[tokio::test]
  async fn test_poll_without_results_is_noop() {
    let mut cache = QueryCache::new();
    assert!(!cache.poll());
  }
}
