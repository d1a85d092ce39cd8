//! Closed set of payload shapes the cache can hold, one per endpoint.

use crate::api::types::{AvailableFilters, Click, Link, LinkStats, Page};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
  Links(Page<Link>),
  Clicks(Page<Click>),
  Link(Link),
  LinkStats(LinkStats),
}

impl QueryData {
  pub fn as_links(&self) -> Option<&Page<Link>> {
    match self {
      QueryData::Links(page) => Some(page),
      _ => None,
    }
  }

  pub fn as_clicks(&self) -> Option<&Page<Click>> {
    match self {
      QueryData::Clicks(page) => Some(page),
      _ => None,
    }
  }

  #[cfg(test)]
  pub fn as_link(&self) -> Option<&Link> {
    match self {
      QueryData::Link(link) => Some(link),
      _ => None,
    }
  }

  pub fn as_link_stats(&self) -> Option<&LinkStats> {
    match self {
      QueryData::LinkStats(stats) => Some(stats),
      _ => None,
    }
  }

  /// Row count for paged payloads
  pub fn row_count(&self) -> Option<usize> {
    match self {
      QueryData::Links(page) => Some(page.data.len()),
      QueryData::Clicks(page) => Some(page.data.len()),
      _ => None,
    }
  }

  /// Filter values the server embedded in a page result
  pub fn available_filters(&self) -> Option<&AvailableFilters> {
    match self {
      QueryData::Links(page) => page.filters.as_ref(),
      QueryData::Clicks(page) => page.filters.as_ref(),
      _ => None,
    }
  }

  /// Server total for paged payloads
  pub fn total(&self) -> Option<u64> {
    match self {
      QueryData::Links(page) => Some(page.pagination.total),
      QueryData::Clicks(page) => Some(page.pagination.total),
      _ => None,
    }
  }
}
