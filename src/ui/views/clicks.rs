use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Row, Table, TableState};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{CacheEvent, FilterField, FilterValue, QueryCache, QueryKey, Resource};
use crate::config::Config;
use crate::controllers::{TableController, TableEvent};
use crate::ui::renderfns::{bot_color, bot_label, country_cell, format_timestamp, pager_label};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::{draw_status_body, ensure_valid_selection, table_block};

/// Bot filter cycle: any -> bots -> humans -> any
fn next_bot_filter(current: Option<bool>) -> Option<bool> {
  match current {
    None => Some(true),
    Some(true) => Some(false),
    Some(false) => None,
  }
}

/// Country filter cycle over the server-offered values, then back to any.
/// The unknown bucket can't be filtered on, so it is skipped.
fn next_country_filter(current: Option<&str>, offered: &[String]) -> Option<String> {
  let choices: Vec<&String> = offered.iter().filter(|c| !c.is_empty()).collect();
  let next = match current {
    None => 0,
    Some(c) => match choices.iter().position(|o| o.as_str() == c) {
      Some(i) => i + 1,
      None => 0,
    },
  };
  choices.get(next).map(|c| c.to_string())
}

/// Click log with country and bot filters
pub struct ClicksView {
  table: TableController,
  table_events: mpsc::UnboundedReceiver<TableEvent>,
  table_state: TableState,
}

impl ClicksView {
  pub fn new(config: &Config) -> Self {
    let mut table = TableController::new(Resource::Clicks, config.page_size())
      .with_policy(config.page_size_policy())
      .with_stale_time(config.clicks_stale_time());
    Self {
      table_events: table.subscribe(),
      table,
      table_state: TableState::default(),
    }
  }

  /// Follow the table's published changes: a new key starts at row 0.
  fn sync(&mut self, ctx: &mut ViewContext) {
    let mut moved = false;
    while let Ok(event) = self.table_events.try_recv() {
      match event {
        TableEvent::KeyChanged(key) => {
          debug!(key = %key, "clicks table moved");
          moved = true;
        }
        TableEvent::FilterOptionsChanged(filters) => {
          debug!(countries = filters.countries.len(), "country options changed");
        }
      }
    }
    if moved {
      self.table_state.select(Some(0));
      self.table.resolve(ctx.cache, ctx.api);
    }
  }

  fn bot_filter(&self) -> Option<bool> {
    match self.table.filters().get(FilterField::IsBot) {
      Some(FilterValue::Flag(b)) => Some(*b),
      _ => None,
    }
  }

  fn country_filter(&self) -> Option<&str> {
    match self.table.filters().get(FilterField::Country) {
      Some(FilterValue::Text(c)) => Some(c.as_str()),
      _ => None,
    }
  }

  fn filter_line(&self) -> Line<'static> {
    let label = |s: &str| Span::styled(s.to_string(), Style::default().fg(Color::DarkGray));
    let value = |s: String| Span::styled(s, Style::default().fg(Color::Yellow));
    let bots = match self.bot_filter() {
      None => "all".to_string(),
      Some(true) => "bots only".to_string(),
      Some(false) => "real users".to_string(),
    };
    Line::from(vec![
      label(" Country [f]: "),
      value(self.country_filter().unwrap_or("any").to_string()),
      label("   Traffic [b]: "),
      value(bots),
      label("   [x] clear"),
    ])
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let snapshot = self.table.snapshot(cache);
    let total = snapshot.data().and_then(|d| d.total()).unwrap_or(0);
    let fetching = if snapshot.is_fetching { " ⟳" } else { "" };
    let title = format!(
      " Clicks ({}){} ",
      pager_label(
        self.table.page(),
        self.table.page_count(total),
        total,
        self.table.page_size()
      ),
      fetching
    );
    let block = table_block(title);

    let empty_hint = if self.table.filters().is_empty() {
      "No clicks recorded yet."
    } else {
      "No clicks match the current filters. Press 'x' to clear them."
    };
    if draw_status_body(
      frame,
      area,
      block.clone(),
      &snapshot.view_status(),
      "clicks",
      empty_hint,
    ) {
      return;
    }

    let clicks = snapshot
      .data()
      .and_then(|d| d.as_clicks())
      .map(|p| p.data.as_slice())
      .unwrap_or(&[]);
    ensure_valid_selection(&mut self.table_state, clicks.len());

    let rows: Vec<Row> = clicks
      .iter()
      .map(|click| {
        Row::new(vec![
          Span::raw(click.id.to_string()),
          Span::raw(click.ip.clone()),
          Span::styled(country_cell(&click.country, 10), Style::default().fg(Color::Blue)),
          Span::styled(bot_label(click.is_bot), Style::default().fg(bot_color(click.is_bot))),
          Span::raw(click.link_id.to_string()),
          Span::raw(click.user_agent.clone()),
          Span::raw(format_timestamp(&click.created_at)),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Length(6),
        Constraint::Length(16),
        Constraint::Length(10),
        Constraint::Length(4),
        Constraint::Length(8),
        Constraint::Fill(1),
        Constraint::Length(17),
      ],
    )
    .header(
      Row::new(vec!["ID", "IP", "Country", "Bot", "Link ID", "User Agent", "Date"])
        .style(Style::default().fg(Color::Yellow).bold()),
    )
    .block(block)
    .row_highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }
}

impl View for ClicksView {
  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('n') | KeyCode::Right => {
        let total = self
          .table
          .snapshot(ctx.cache)
          .data()
          .and_then(|d| d.total())
          .unwrap_or(0);
        self.table.next_page(total);
      }
      KeyCode::Char('p') | KeyCode::Left => {
        self.table.prev_page();
      }
      KeyCode::Char('z') => self.table.cycle_page_size(),
      KeyCode::Char('b') => {
        let next = next_bot_filter(self.bot_filter()).map(FilterValue::Flag);
        self.table.set_filter(FilterField::IsBot, next);
      }
      KeyCode::Char('f') => {
        let next = next_country_filter(
          self.country_filter(),
          &self.table.available_filters().countries,
        )
        .map(FilterValue::Text);
        self.table.set_filter(FilterField::Country, next);
      }
      KeyCode::Char('x') => self.table.clear_filters(),
      KeyCode::Char('r') => {
        self.table.refresh(ctx.cache, ctx.api);
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }

    self.sync(ctx);
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(1)])
      .split(area);
    frame.render_widget(Paragraph::new(self.filter_line()), chunks[0]);
    self.render_table(frame, chunks[1], cache);
  }

  fn breadcrumb_label(&self) -> String {
    "Clicks".to_string()
  }

  fn activate(&mut self, ctx: &mut ViewContext) {
    self.table.resolve(ctx.cache, ctx.api);
  }

  fn on_cache_event(&mut self, event: &CacheEvent, ctx: &mut ViewContext) {
    self.table.handle_cache_event(event, ctx.cache, ctx.api);
    self.sync(ctx);
  }

  fn active_keys(&self) -> Vec<QueryKey> {
    vec![self.table.key()]
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("f", "country").with_priority(20),
      ShortcutInfo::new("b", "bots").with_priority(30),
      ShortcutInfo::new("n/p", "page").with_priority(40),
      ShortcutInfo::new("z", "page size").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::FakeTransport;
  use crate::api::ApiClient;
  use crossterm::event::KeyModifiers;
  use std::sync::Arc;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_bot_filter_cycle() {
    assert_eq!(next_bot_filter(None), Some(true));
    assert_eq!(next_bot_filter(Some(true)), Some(false));
    assert_eq!(next_bot_filter(Some(false)), None);
  }

  #[test]
  fn test_country_filter_cycle_skips_unknown() {
    let offered = vec!["".to_string(), "DE".to_string(), "US".to_string()];
    assert_eq!(next_country_filter(None, &offered), Some("DE".to_string()));
    assert_eq!(next_country_filter(Some("DE"), &offered), Some("US".to_string()));
    assert_eq!(next_country_filter(Some("US"), &offered), None);
    assert_eq!(next_country_filter(Some("FR"), &offered), Some("DE".to_string()));
    assert_eq!(next_country_filter(None, &[]), None);
  }

  #[tokio::test]
  async fn test_filter_keys_use_offered_countries() {
    let api = ApiClient::new(Arc::new(FakeTransport::seeded()));
    let mut cache = QueryCache::new();
    let mut events = cache.subscribe();
    let mut view = ClicksView::new(&Config::default());
    let mut ctx = ViewContext {
      cache: &mut cache,
      api: &api,
    };

    view.activate(&mut ctx);
    ctx.cache.recv().await;
    let event = events.recv().await.unwrap();
    view.on_cache_event(&event, &mut ctx);

    view.handle_key(key(KeyCode::Char('f')), &mut ctx);
    view.handle_key(key(KeyCode::Char('b')), &mut ctx);
    assert_eq!(view.country_filter(), Some("DE"));
    assert_eq!(view.bot_filter(), Some(true));
    assert_eq!(view.table.page(), 1);

    view.handle_key(key(KeyCode::Char('x')), &mut ctx);
    assert!(view.table.filters().is_empty());
  }

  #[tokio::test]
  async fn test_click_pages_use_configured_stale_time() {
    let api = ApiClient::new(Arc::new(FakeTransport::seeded()));
    let mut cache = QueryCache::new();
    let mut config = Config::default();
    config.cache.clicks_stale_time_secs = 0;
    let mut view = ClicksView::new(&config);
    let mut ctx = ViewContext {
      cache: &mut cache,
      api: &api,
    };

    view.activate(&mut ctx);
    ctx.cache.recv().await;
    // Stale under the clicks setting even though the cache default is 30s
    assert!(ctx.cache.peek(&view.table.key()).is_stale);
  }
}
