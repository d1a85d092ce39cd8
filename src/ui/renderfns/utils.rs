use chrono::{DateTime, Local, Utc};
use ratatui::prelude::Color;

use crate::api::types::country_label;

/// Truncate a string to a maximum number of characters, adding "..." if
/// truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Local time, minute precision
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn bot_color(is_bot: bool) -> Color {
  if is_bot {
    Color::Red
  } else {
    Color::Green
  }
}

pub fn bot_label(is_bot: bool) -> &'static str {
  if is_bot {
    "Yes"
  } else {
    "No"
  }
}

/// Country cell text, padded
pub fn country_cell(country: &str, width: usize) -> String {
  format!("{:<width$}", truncate(country_label(country), width), width = width)
}

/// "page 2/5 · 42 rows · 10/page"
pub fn pager_label(page: u32, page_count: u32, total: u64, page_size: u32) -> String {
  format!(
    "page {}/{} · {} rows · {}/page",
    page, page_count, total, page_size
  )
}
