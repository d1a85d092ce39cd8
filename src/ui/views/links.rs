use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table, TableState};
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::types::{Link, LinkId};
use crate::cache::{CacheEvent, QueryCache, QueryKey, Resource};
use crate::config::Config;
use crate::controllers::{DetailController, DetailEvent, DetailSnapshot, TableController, TableEvent};
use crate::query::QuerySnapshot;
use crate::ui::renderfns::{format_timestamp, pager_label, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::CreateLinkView;
use crate::ui::{centered_rect, draw_status_body, ensure_valid_selection, table_block};

/// Paged list of short links with a per-link stats overlay
pub struct LinksView {
  table: TableController,
  stats: DetailController,
  table_events: mpsc::UnboundedReceiver<TableEvent>,
  stats_events: mpsc::UnboundedReceiver<DetailEvent>,
  table_state: TableState,
}

impl LinksView {
  pub fn new(config: &Config) -> Self {
    let mut table = TableController::new(Resource::Links, config.page_size())
      .with_policy(config.page_size_policy());
    let mut stats = DetailController::new(Resource::LinkStats);
    Self {
      table_events: table.subscribe(),
      stats_events: stats.subscribe(),
      table,
      stats,
      table_state: TableState::default(),
    }
  }

  /// React to what the controllers published since the last call.
  ///
  /// A new table key starts at row 0 and drops the stats selection, since the
  /// selected link may not be on the new page. Stats are fetched when the
  /// overlay opens or its selection moves.
  fn sync(&mut self, ctx: &mut ViewContext) {
    let mut table_moved = false;
    while let Ok(event) = self.table_events.try_recv() {
      if let TableEvent::KeyChanged(key) = event {
        debug!(key = %key, "links table moved");
        table_moved = true;
      }
    }
    if table_moved {
      self.table_state.select(Some(0));
      self.stats.clear();
      self.table.resolve(ctx.cache, ctx.api);
    }

    let mut wants_stats = false;
    while let Ok(event) = self.stats_events.try_recv() {
      wants_stats |= matches!(
        event,
        DetailEvent::SelectionChanged(Some(_)) | DetailEvent::VisibilityChanged(true)
      );
    }
    if wants_stats && self.stats.is_visible() {
      self.stats.resolve(ctx.cache, ctx.api);
    }
  }

  fn selected_link<'a>(&self, snapshot: &'a QuerySnapshot) -> Option<&'a Link> {
    let page = snapshot.data()?.as_links()?;
    page.data.get(self.table_state.selected()?)
  }

  fn total(&self, cache: &QueryCache) -> u64 {
    self
      .table
      .snapshot(cache)
      .data()
      .and_then(|d| d.total())
      .unwrap_or(0)
  }

  fn open_stats(&mut self, id: LinkId) {
    self.stats.select(id);
    self.stats.show();
  }

  fn handle_overlay_key(&mut self, key: KeyEvent, ctx: &mut ViewContext) -> ViewAction {
    match key.code {
      KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('s') | KeyCode::Enter => {
        self.stats.hide();
      }
      KeyCode::Char('r') => {
        if let Some(key) = self.stats.key() {
          ctx.cache.invalidate(&key);
          self.stats.resolve(ctx.cache, ctx.api);
        }
      }
      _ => {}
    }
    ViewAction::None
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let snapshot = self.table.snapshot(cache);
    let total = snapshot.data().and_then(|d| d.total()).unwrap_or(0);
    let fetching = if snapshot.is_fetching { " ⟳" } else { "" };
    let title = format!(
      " Links ({}){} ",
      pager_label(
        self.table.page(),
        self.table.page_count(total),
        total,
        self.table.page_size()
      ),
      fetching
    );
    let block = table_block(title);

    let status = snapshot.view_status();
    if draw_status_body(
      frame,
      area,
      block.clone(),
      &status,
      "links",
      "No links yet. Press 'c' to create one.",
    ) {
      return;
    }

    let links = snapshot
      .data()
      .and_then(|d| d.as_links())
      .map(|p| p.data.as_slice())
      .unwrap_or(&[]);
    ensure_valid_selection(&mut self.table_state, links.len());

    let url_width = (area.width.saturating_sub(46) / 2).max(10) as usize;
    let rows: Vec<Row> = links
      .iter()
      .map(|link| {
        Row::new(vec![
          link.id.to_string(),
          link.code.clone(),
          truncate(&link.white_url, url_width),
          truncate(&link.black_url, url_width),
          format_timestamp(&link.created_at),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Length(6),
        Constraint::Length(10),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Length(17),
      ],
    )
    .header(
      Row::new(vec!["ID", "Code", "White URL", "Black URL", "Created"])
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

  fn render_stats(&self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    let overlay = centered_rect(60, 60, area);
    frame.render_widget(Clear, overlay);

    let snapshot = self.stats.snapshot(cache);
    let title = match self.stats.selected() {
      Some(id) => format!(" Link {} statistics ", id),
      None => " Link statistics ".to_string(),
    };
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(
      Paragraph::new(stats_lines(&snapshot)).block(block),
      overlay,
    );
  }
}

fn stats_lines(snapshot: &DetailSnapshot) -> Vec<Line<'static>> {
  if let Some((_, stats)) = snapshot.current_stats() {
    let count = |label: &str, n: u64, color: Color| {
      Line::from(vec![
        Span::styled(format!("{:<16}", label), Style::default().fg(Color::DarkGray)),
        Span::styled(n.to_string(), Style::default().fg(color).bold()),
      ])
    };
    let mut lines = vec![
      count("Total clicks", stats.total_clicks, Color::Blue),
      count("Bot clicks", stats.bot_clicks, Color::Red),
      count("Human clicks", stats.human_clicks(), Color::Green),
      Line::raw(""),
      Line::styled("Clicks by country", Style::default().fg(Color::Yellow)),
    ];
    if stats.country_stats.is_empty() {
      lines.push(Line::styled("  none", Style::default().fg(Color::DarkGray)));
    }
    for bucket in &stats.country_stats {
      lines.push(Line::from(vec![
        Span::raw(format!("  {:<14}", bucket.label())),
        Span::styled(bucket.count.to_string(), Style::default().fg(Color::Cyan)),
      ]));
    }
    if !stats.is_consistent() || stats.country_total() != stats.total_clicks {
      lines.push(Line::raw(""));
      lines.push(Line::styled(
        "Counts disagree; the server may still be recording clicks",
        Style::default().fg(Color::Yellow),
      ));
    }
    return lines;
  }

  let (text, color) = if snapshot.is_error() {
    let error = snapshot
      .query
      .as_ref()
      .and_then(|q| q.error())
      .map(|e| e.to_string())
      .unwrap_or_default();
    (format!("Failed to load statistics: {}", error), Color::Red)
  } else if snapshot.is_loading() {
    ("Loading statistics...".to_string(), Color::DarkGray)
  } else if snapshot.selected.is_none() {
    ("No link selected".to_string(), Color::DarkGray)
  } else {
    ("Waiting for statistics...".to_string(), Color::DarkGray)
  };
  vec![Line::styled(text, Style::default().fg(color))]
}

impl View for LinksView {
  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext) -> ViewAction {
    if self.stats.is_visible() {
      let action = self.handle_overlay_key(key, ctx);
      self.sync(ctx);
      return action;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('n') | KeyCode::Right => {
        let total = self.total(ctx.cache);
        self.table.next_page(total);
      }
      KeyCode::Char('p') | KeyCode::Left => {
        self.table.prev_page();
      }
      KeyCode::Char('z') => self.table.cycle_page_size(),
      KeyCode::Char('r') => {
        self.table.refresh(ctx.cache, ctx.api);
      }
      KeyCode::Enter | KeyCode::Char('s') => {
        let snapshot = self.table.snapshot(ctx.cache);
        if let Some(id) = self.selected_link(&snapshot).map(|l| l.id) {
          self.open_stats(id);
        }
      }
      KeyCode::Char('c') => return ViewAction::Push(Box::new(CreateLinkView::new())),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }

    self.sync(ctx);
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache) {
    self.render_table(frame, area, cache);
    if self.stats.is_visible() {
      self.render_stats(frame, area, cache);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Links".to_string()
  }

  fn activate(&mut self, ctx: &mut ViewContext) {
    if self.table_state.selected().is_none() {
      self.table_state.select(Some(0));
    }
    self.table.resolve(ctx.cache, ctx.api);
    if self.stats.is_visible() {
      self.stats.resolve(ctx.cache, ctx.api);
    }
  }

  fn on_cache_event(&mut self, event: &CacheEvent, ctx: &mut ViewContext) {
    self.table.handle_cache_event(event, ctx.cache, ctx.api);
    if self.stats.is_visible() {
      self.stats.handle_cache_event(event, ctx.cache, ctx.api);
    }
  }

  fn active_keys(&self) -> Vec<QueryKey> {
    let mut keys = vec![self.table.key()];
    keys.extend(self.stats.key());
    keys
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.stats.is_visible() {
      return vec![
        ShortcutInfo::new("r", "refresh").with_priority(20),
        ShortcutInfo::new("esc", "close").with_priority(30),
      ];
    }
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("enter", "stats").with_priority(20),
      ShortcutInfo::new("c", "create").with_priority(30),
      ShortcutInfo::new("n/p", "page").with_priority(40),
      ShortcutInfo::new("z", "page size").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
