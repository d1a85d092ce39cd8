//! What callers observe when they ask the query cache for a key.
//!
//! Modeled on TanStack Query: a snapshot carries the last known data for the
//! key together with loading/error flags, and a separate `is_fetching` flag
//! for background refetches of data that is already on screen.
//!
//! # Example
//!
//! ```ignore
//! let snapshot = cache.resolve(key.clone(), fetcher, QueryOptions::default());
//!
//! match snapshot.view_status() {
//!     ViewStatus::Loading => render_spinner(),
//!     ViewStatus::Error(e) => render_error(e),
//!     ViewStatus::Empty => render_empty(),
//!     ViewStatus::Ready => render_rows(snapshot.data()),
//!     ViewStatus::Idle => {}
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::api::ApiError;
use crate::cache::{QueryData, QueryKey};

/// The state of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
  /// Query is disabled or has never been started
  Idle,
  /// First fetch in flight, nothing to show yet
  Loading,
  /// Data is available
  Success,
  /// The latest fetch failed
  Error,
}

/// Per-call options for `QueryCache::resolve`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
  /// When false no fetch is started and no foreign data is reported
  pub enabled: bool,
  /// Overrides the cache-wide stale time
  pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_time: None,
    }
  }
}

impl QueryOptions {
  pub fn enabled(enabled: bool) -> Self {
    Self {
      enabled,
      ..Self::default()
    }
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }
}

/// Which of the mutually exclusive list presentations applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
  Idle,
  Loading,
  Error(String),
  Empty,
  Ready,
}

/// Point-in-time view of one cache entry
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
  pub key: QueryKey,
  pub state: QueryState,
  pub data: Option<Arc<QueryData>>,
  pub error: Option<ApiError>,
  /// A fetch for this key is in flight (initial or background)
  pub is_fetching: bool,
  pub is_stale: bool,
}

impl QuerySnapshot {
  /// Neutral snapshot for a key that has no entry or is disabled
  pub fn idle(key: QueryKey) -> Self {
    Self {
      key,
      state: QueryState::Idle,
      data: None,
      error: None,
      is_fetching: false,
      is_stale: false,
    }
  }

  pub fn data(&self) -> Option<&QueryData> {
    self.data.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.state == QueryState::Loading
  }

  pub fn is_success(&self) -> bool {
    self.state == QueryState::Success
  }

  pub fn is_error(&self) -> bool {
    self.state == QueryState::Error
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  /// Loading, error, empty and ready are mutually exclusive; error wins over
  /// previously cached rows.
  pub fn view_status(&self) -> ViewStatus {
    match self.state {
      QueryState::Idle => ViewStatus::Idle,
      QueryState::Loading => ViewStatus::Loading,
      QueryState::Error => ViewStatus::Error(
        self
          .error
          .as_ref()
          .map(|e| e.to_string())
          .unwrap_or_else(|| "unknown error".to_string()),
      ),
      QueryState::Success => match self.data().and_then(|d| d.row_count()) {
        Some(0) => ViewStatus::Empty,
        _ => ViewStatus::Ready,
      },
    }
  }
}
