//! Server-paginated, server-filtered table state.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::types::AvailableFilters;
use crate::api::ApiClient;
use crate::cache::{CacheEvent, FilterField, FilterValue, Filters, QueryCache, QueryKey, Resource};
use crate::notify::Notifier;
use crate::query::{QueryOptions, QuerySnapshot};

/// Page sizes offered by the size selector
pub const PAGE_SIZE_OPTIONS: [u32; 4] = [10, 20, 50, 100];

/// What happens to the page index when the page size changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSizePolicy {
  /// Keep the current page index
  #[default]
  KeepPage,
  /// Return to page 1
  ResetPage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
  /// Page, page size or filters changed the derived key
  KeyChanged(QueryKey),
  /// The server offered a different set of filter values
  FilterOptionsChanged(AvailableFilters),
}

/// Owns page, page size and filters for one collection and derives the
/// query key from them.
#[derive(Debug)]
pub struct TableController {
  resource: Resource,
  page: u32,
  page_size: u32,
  filters: Filters,
  policy: PageSizePolicy,
  available: AvailableFilters,
  /// Overrides the cache-wide stale time for this table's pages
  stale_time: Option<Duration>,
  events: Notifier<TableEvent>,
}

impl TableController {
  pub fn new(resource: Resource, page_size: u32) -> Self {
    Self {
      resource,
      page: 1,
      page_size: page_size.max(1),
      filters: Filters::new(),
      policy: PageSizePolicy::default(),
      available: AvailableFilters::default(),
      stale_time: None,
      events: Notifier::new(),
    }
  }

  pub fn with_policy(mut self, policy: PageSizePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TableEvent> {
    self.events.subscribe()
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  pub fn filters(&self) -> &Filters {
    &self.filters
  }

  /// Filter values from the most recent page result for the current key
  pub fn available_filters(&self) -> &AvailableFilters {
    &self.available
  }

  pub fn key(&self) -> QueryKey {
    QueryKey::page(self.resource, self.page, self.page_size, self.filters.clone())
  }

  /// Apply a state change and publish the new key if it differs.
  fn update<F: FnOnce(&mut Self)>(&mut self, change: F) {
    let before = self.key();
    change(self);
    let after = self.key();
    if before != after {
      self.events.publish(TableEvent::KeyChanged(after));
    }
  }

  /// Set or remove one filter and return to page 1.
  pub fn set_filter(&mut self, field: FilterField, value: Option<FilterValue>) {
    self.update(|t| {
      t.filters.set(field, value);
      t.page = 1;
    });
  }

  pub fn clear_filters(&mut self) {
    self.update(|t| {
      t.filters = Filters::new();
      t.page = 1;
    });
  }

  /// Change the page index; filters are untouched.
  pub fn set_page(&mut self, page: u32) {
    self.update(|t| t.page = page.max(1));
  }

  /// Change the page size, keeping or resetting the page per policy.
  pub fn set_page_size(&mut self, page_size: u32) {
    self.update(|t| {
      let page_size = page_size.max(1);
      if t.page_size != page_size && t.policy == PageSizePolicy::ResetPage {
        t.page = 1;
      }
      t.page_size = page_size;
    });
  }

  /// Step to the next entry of `PAGE_SIZE_OPTIONS`, wrapping around.
  pub fn cycle_page_size(&mut self) {
    let next = PAGE_SIZE_OPTIONS
      .iter()
      .copied()
      .find(|size| *size > self.page_size)
      .unwrap_or(PAGE_SIZE_OPTIONS[0]);
    self.set_page_size(next);
  }

  /// Number of pages for a server `total`; never less than 1.
  pub fn page_count(&self, total: u64) -> u32 {
    let pages = total.div_ceil(u64::from(self.page_size));
    u32::try_from(pages).unwrap_or(u32::MAX).max(1)
  }

  /// Advance one page if `total` allows it.
  pub fn next_page(&mut self, total: u64) -> bool {
    if self.page < self.page_count(total) {
      self.set_page(self.page + 1);
      true
    } else {
      false
    }
  }

  pub fn prev_page(&mut self) -> bool {
    if self.page > 1 {
      self.set_page(self.page - 1);
      true
    } else {
      false
    }
  }

  /// Resolve the current key through the cache.
  pub fn resolve(&mut self, cache: &mut QueryCache, api: &ApiClient) -> QuerySnapshot {
    let key = self.key();
    let mut options = QueryOptions::default();
    if let Some(stale_time) = self.stale_time {
      options = options.with_stale_time(stale_time);
    }
    let snapshot = cache.resolve(key.clone(), api.fetcher(key), options);
    self.absorb(&snapshot);
    snapshot
  }

  /// Mark the current key stale and refetch it.
  pub fn refresh(&mut self, cache: &mut QueryCache, api: &ApiClient) -> QuerySnapshot {
    cache.invalidate(&self.key());
    self.resolve(cache, api)
  }

  /// Current snapshot without fetching
  pub fn snapshot(&self, cache: &QueryCache) -> QuerySnapshot {
    cache.peek(&self.key())
  }

  /// React to a cache change. Events for keys other than the current one are
  /// ignored, so a late response for an old page never reaches this table.
  ///
  /// Returns true if the event concerned this table.
  pub fn handle_cache_event(
    &mut self,
    event: &CacheEvent,
    cache: &mut QueryCache,
    api: &ApiClient,
  ) -> bool {
    let current = self.key();
    match event {
      CacheEvent::Updated(key) if *key == current => {
        let snapshot = cache.peek(key);
        self.absorb(&snapshot);
        true
      }
      CacheEvent::Invalidated(key) if *key == current => {
        self.resolve(cache, api);
        true
      }
      _ => false,
    }
  }

  fn absorb(&mut self, snapshot: &QuerySnapshot) {
    if snapshot.key != self.key() {
      return;
    }
    let Some(filters) = snapshot.data().and_then(|d| d.available_filters()) else {
      return;
    };
    if *filters != self.available {
      self.available = filters.clone();
      self
        .events
        .publish(TableEvent::FilterOptionsChanged(self.available.clone()));
    }
  }
}
