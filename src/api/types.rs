use chrono::{DateTime, Utc};

/// Server-assigned identity of a link
pub type LinkId = i64;

/// Tracking link: a public code mapped to a white and a black destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
  pub id: LinkId,
  pub code: String,
  /// Destination for normal visitors
  pub white_url: String,
  /// Destination for traffic flagged as bot
  pub black_url: String,
  pub created_at: DateTime<Utc>,
}

/// One observed visit against a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Click {
  pub id: i64,
  pub ip: String,
  pub user_agent: String,
  /// Resolved country code, empty when unknown
  pub country: String,
  pub is_bot: bool,
  pub link_id: LinkId,
  pub created_at: DateTime<Utc>,
}

/// Clicks for one country value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryStat {
  pub country: String,
  pub count: u64,
}

impl CountryStat {
  /// Display label, with the empty country shown as its own bucket
  pub fn label(&self) -> &str {
    country_label(&self.country)
  }
}

/// Per-link analytics computed by the server
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkStats {
  pub total_clicks: u64,
  pub bot_clicks: u64,
  pub country_stats: Vec<CountryStat>,
}

impl LinkStats {
  pub fn human_clicks(&self) -> u64 {
    self.total_clicks.saturating_sub(self.bot_clicks)
  }

  /// True when the bot count fits inside the total
  pub fn is_consistent(&self) -> bool {
    self.bot_clicks <= self.total_clicks
  }

  /// Sum of all country buckets; ideally equal to `total_clicks`
  pub fn country_total(&self) -> u64 {
    self.country_stats.iter().map(|c| c.count).sum()
  }
}

/// Pagination metadata; the server is authoritative for `total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
  pub total: u64,
  pub page: u32,
  pub page_size: u32,
}

/// Filter values the server observed, offered to filter controls
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvailableFilters {
  pub countries: Vec<String>,
}

/// One server page of entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
  pub data: Vec<T>,
  pub pagination: Pagination,
  pub filters: Option<AvailableFilters>,
}

/// Input for the create-link write
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewLink {
  pub white_url: String,
  pub black_url: String,
}

pub fn country_label(country: &str) -> &str {
  if country.is_empty() {
    "Unknown"
  } else {
    country
  }
}
