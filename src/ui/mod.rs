pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, TableState, Wrap};

use crate::query::ViewStatus;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  renderfns::draw_header(frame, chunks[0], app.title(), &app.shortcuts());
  app.render_view(frame, chunks[1]);
  renderfns::draw_footer(frame, chunks[2], &app.breadcrumb(), app.status());
  app.command().render_overlay(frame, chunks[1]);
}

/// Keep a table selection inside `0..len`
pub fn ensure_valid_selection(state: &mut TableState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Rect of the given percentage size centered in `area`
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
  let width = area.width * percent_x / 100;
  let height = area.height * percent_y / 100;
  Rect::new(
    area.x + (area.width - width) / 2,
    area.y + (area.height - height) / 2,
    width,
    height,
  )
}

/// Placeholder body for loading, error and empty states. Returns false and
/// draws nothing when there are rows to show.
pub fn draw_status_body(
  frame: &mut Frame,
  area: Rect,
  block: Block,
  status: &ViewStatus,
  what: &str,
  empty_hint: &str,
) -> bool {
  let (text, color) = match status {
    ViewStatus::Ready => return false,
    ViewStatus::Idle => (String::new(), Color::DarkGray),
    ViewStatus::Loading => (format!("Loading {}...", what), Color::DarkGray),
    ViewStatus::Error(msg) => (
      format!("Failed to load {}: {}\nPress 'r' to retry.", what, msg),
      Color::Red,
    ),
    ViewStatus::Empty => (empty_hint.to_string(), Color::DarkGray),
  };
  let paragraph = Paragraph::new(text)
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
  true
}

/// Bordered block used by every table view
pub fn table_block(title: String) -> Block<'static> {
  Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ensure_valid_selection() {
    let mut state = TableState::default();
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(0));

    state.select(Some(7));
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(2));

    ensure_valid_selection(&mut state, 0);
    assert_eq!(state.selected(), None);
  }

  #[test]
  fn test_centered_rect() {
    let rect = centered_rect(50, 50, Rect::new(0, 0, 100, 40));
    assert_eq!(rect, Rect::new(25, 10, 50, 20));
  }
}
