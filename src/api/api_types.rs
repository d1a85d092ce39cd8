//! Serde-deserializable types matching the link service's JSON responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::types::{
  AvailableFilters, Click, CountryStat, Link, LinkStats, NewLink, Page, Pagination,
};

/// The server encodes empty sequences as `null`
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiLink {
  pub id: i64,
  pub code: String,
  pub white_url: String,
  pub black_url: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ApiClick {
  pub id: i64,
  #[serde(default)]
  pub ip: String,
  #[serde(default)]
  pub user_agent: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub country: String,
  #[serde(default)]
  pub is_bot: bool,
  pub link_id: i64,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCountryStat {
  #[serde(default, deserialize_with = "null_as_default")]
  pub country: String,
  pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiLinkStats {
  #[serde(default)]
  pub total_clicks: u64,
  #[serde(default)]
  pub bot_clicks: u64,
  #[serde(default, deserialize_with = "null_as_default")]
  pub country_stats: Vec<ApiCountryStat>,
}

// ============================================================================
// Paged list responses
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ApiPagination {
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub page: u32,
  #[serde(default, rename = "pageSize")]
  pub page_size: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiFilters {
  /// `null` when the server could not list countries, which is not the same
  /// as an empty list
  #[serde(default)]
  pub countries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiPage<T> {
  #[serde(default, deserialize_with = "null_as_default")]
  pub data: Vec<T>,
  #[serde(default)]
  pub pagination: ApiPagination,
  pub filters: Option<ApiFilters>,
}

/// Error body the server sends with non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub error: String,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiCreateLink<'a> {
  pub white_url: &'a str,
  pub black_url: &'a str,
}

impl<'a> From<&'a NewLink> for ApiCreateLink<'a> {
  fn from(input: &'a NewLink) -> Self {
    ApiCreateLink {
      white_url: &input.white_url,
      black_url: &input.black_url,
    }
  }
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiLink> for Link {
  fn from(link: ApiLink) -> Self {
    Link {
      id: link.id,
      code: link.code,
      white_url: link.white_url,
      black_url: link.black_url,
      created_at: link.created_at,
    }
  }
}

impl From<ApiClick> for Click {
  fn from(click: ApiClick) -> Self {
    Click {
      id: click.id,
      ip: click.ip,
      user_agent: click.user_agent,
      country: click.country,
      is_bot: click.is_bot,
      link_id: click.link_id,
      created_at: click.created_at,
    }
  }
}

impl From<ApiLinkStats> for LinkStats {
  fn from(stats: ApiLinkStats) -> Self {
    LinkStats {
      total_clicks: stats.total_clicks,
      bot_clicks: stats.bot_clicks,
      country_stats: stats
        .country_stats
        .into_iter()
        .map(|c| CountryStat {
          country: c.country,
          count: c.count,
        })
        .collect(),
    }
  }
}

impl<A> ApiPage<A> {
  pub fn into_page<T: From<A>>(self) -> Page<T> {
    Page {
      data: self.data.into_iter().map(T::from).collect(),
      pagination: Pagination {
        total: self.pagination.total,
        page: self.pagination.page,
        page_size: self.pagination.page_size,
      },
      filters: self
        .filters
        .and_then(|f| f.countries)
        .map(|countries| AvailableFilters { countries }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clicks_page_decodes() {
    let json = r#"{
      "data": [{
        "id": 7, "ip": "10.0.0.1", "user_agent": "curl/8.0", "country": "US",
        "is_bot": true, "link_id": 3, "created_at": "2024-05-01T10:00:00.123456+02:00"
      }],
      "pagination": {"total": 41, "page": 2, "pageSize": 20},
      "filters": {"countries": ["", "DE", "US"]}
    }"#;

    let page: Page<Click> = serde_json::from_str::<ApiPage<ApiClick>>(json)
      .unwrap()
      .into_page();

    assert_eq!(page.data.len(), 1);
    assert!(page.data[0].is_bot);
    assert_eq!(page.data[0].link_id, 3);
    assert_eq!(page.pagination.total, 41);
    assert_eq!(page.pagination.page_size, 20);
    assert_eq!(
      page.filters.unwrap().countries,
      vec!["".to_string(), "DE".to_string(), "US".to_string()]
    );
  }

  #[test]
  fn test_null_sequences_decode_as_empty() {
    let json = r#"{"data": null, "pagination": {"total": 0, "page": 1, "pageSize": 10}, "filters": {"countries": null}}"#;
    let page: Page<Click> = serde_json::from_str::<ApiPage<ApiClick>>(json)
      .unwrap()
      .into_page();
    assert!(page.data.is_empty());
    // No option list at all, so the previous one stays in use
    assert!(page.filters.is_none());

    let json = r#"{"data": [], "pagination": {"total": 0}, "filters": {"countries": []}}"#;
    let page: Page<Click> = serde_json::from_str::<ApiPage<ApiClick>>(json)
      .unwrap()
      .into_page();
    assert_eq!(page.filters.map(|f| f.countries), Some(Vec::new()));

    let stats: LinkStats =
      serde_json::from_str::<ApiLinkStats>(r#"{"total_clicks": 0, "bot_clicks": 0, "country_stats": null}"#)
        .unwrap()
        .into();
    assert!(stats.country_stats.is_empty());
  }

  #[test]
  fn test_links_page_without_filters() {
    let json = r#"{"data": [{"id": 1, "code": "aB3xYz", "white_url": "https://a.example",
      "black_url": "https://b.example", "created_at": "2024-05-01T08:00:00Z"}],
      "pagination": {"total": 1, "page": 1, "pageSize": 10}}"#;
    let page: Page<Link> = serde_json::from_str::<ApiPage<ApiLink>>(json)
      .unwrap()
      .into_page();
    assert_eq!(page.data[0].code, "aB3xYz");
    assert!(page.filters.is_none());
  }
}
