//! On-demand detail fetch gated on the current selection.

use tokio::sync::mpsc;
use tracing::debug;

use crate::api::types::{LinkId, LinkStats};
use crate::api::ApiClient;
use crate::cache::{CacheEvent, QueryCache, QueryData, QueryKey, Resource};
use crate::notify::Notifier;
use crate::query::{QueryOptions, QuerySnapshot, QueryState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailEvent {
  SelectionChanged(Option<LinkId>),
  VisibilityChanged(bool),
}

/// The selection together with the cache state of its key.
///
/// Data is only handed out for the id it was fetched for.
#[derive(Debug, Clone)]
pub struct DetailSnapshot {
  pub selected: Option<LinkId>,
  /// None while nothing is selected
  pub query: Option<QuerySnapshot>,
}

impl DetailSnapshot {
  fn none() -> Self {
    Self {
      selected: None,
      query: None,
    }
  }

  pub fn state(&self) -> QueryState {
    self
      .query
      .as_ref()
      .map(|q| q.state)
      .unwrap_or(QueryState::Idle)
  }

  pub fn is_loading(&self) -> bool {
    self.state() == QueryState::Loading
  }

  pub fn is_error(&self) -> bool {
    self.state() == QueryState::Error
  }

  /// Payload for `id`, only if `id` is the current selection and the
  /// payload was fetched under that id's key.
  pub fn data_for(&self, id: LinkId) -> Option<&QueryData> {
    if self.selected != Some(id) {
      return None;
    }
    let query = self.query.as_ref()?;
    match &query.key {
      QueryKey::Entity { id: key_id, .. } if *key_id == id => query.data(),
      _ => None,
    }
  }

  pub fn stats_for(&self, id: LinkId) -> Option<&LinkStats> {
    self.data_for(id).and_then(|d| d.as_link_stats())
  }

  /// Stats for whatever is selected right now
  pub fn current_stats(&self) -> Option<(LinkId, &LinkStats)> {
    let id = self.selected?;
    self.stats_for(id).map(|s| (id, s))
  }
}

/// Owns "which entity is selected" and derives a query that only runs while
/// a selection exists.
///
/// Visibility is tracked separately; only the selection affects the key.
#[derive(Debug)]
pub struct DetailController {
  resource: Resource,
  selected: Option<LinkId>,
  visible: bool,
  events: Notifier<DetailEvent>,
}

impl DetailController {
  pub fn new(resource: Resource) -> Self {
    Self {
      resource,
      selected: None,
      visible: false,
      events: Notifier::new(),
    }
  }

  pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DetailEvent> {
    self.events.subscribe()
  }

  pub fn selected(&self) -> Option<LinkId> {
    self.selected
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }

  /// Key for the current selection; None disables the query
  pub fn key(&self) -> Option<QueryKey> {
    self.selected.map(|id| QueryKey::entity(self.resource, id))
  }

  /// Select an entity. Returns true if the selection changed.
  pub fn select(&mut self, id: LinkId) -> bool {
    self.set_selected(Some(id))
  }

  pub fn clear(&mut self) -> bool {
    self.set_selected(None)
  }

  fn set_selected(&mut self, selected: Option<LinkId>) -> bool {
    if self.selected == selected {
      return false;
    }
    debug!(resource = self.resource.name(), ?selected, "selection changed");
    self.selected = selected;
    self
      .events
      .publish(DetailEvent::SelectionChanged(selected));
    true
  }

  pub fn show(&mut self) {
    self.set_visible(true);
  }

  pub fn hide(&mut self) {
    self.set_visible(false);
  }

  fn set_visible(&mut self, visible: bool) {
    if self.visible != visible {
      self.visible = visible;
      self.events.publish(DetailEvent::VisibilityChanged(visible));
    }
  }

  /// Resolve the selection's key; nothing is fetched without a selection.
  pub fn resolve(&self, cache: &mut QueryCache, api: &ApiClient) -> DetailSnapshot {
    match self.key() {
      Some(key) => {
        let options = QueryOptions::enabled(self.selected.is_some());
        let query = cache.resolve(key.clone(), api.fetcher(key), options);
        DetailSnapshot {
          selected: self.selected,
          query: Some(query),
        }
      }
      None => DetailSnapshot::none(),
    }
  }

  /// Current snapshot without fetching
  pub fn snapshot(&self, cache: &QueryCache) -> DetailSnapshot {
    match self.key() {
      Some(key) => DetailSnapshot {
        selected: self.selected,
        query: Some(cache.peek(&key)),
      },
      None => DetailSnapshot::none(),
    }
  }

  /// React to a cache change for the selection's key; everything else,
  /// including responses for earlier selections, is ignored.
  pub fn handle_cache_event(
    &mut self,
    event: &CacheEvent,
    cache: &mut QueryCache,
    api: &ApiClient,
  ) -> bool {
    let Some(current) = self.key() else {
      return false;
    };
    match event {
      CacheEvent::Updated(key) => *key == current,
      CacheEvent::Invalidated(key) if *key == current => {
        self.resolve(cache, api);
        true
      }
      _ => false,
    }
  }
}
