use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::api::ApiClient;
use crate::cache::{CacheEvent, QueryCache, QueryKey};

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// What views get to work with besides their own state
pub struct ViewContext<'a> {
  pub cache: &'a mut QueryCache,
  pub api: &'a ApiClient,
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views own their controllers and read everything else from the query
/// cache, which the App passes in. App → View → Controllers → Cache.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect, cache: &QueryCache);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Called when the view becomes the top of the stack
  fn activate(&mut self, _ctx: &mut ViewContext) {}

  /// Called on each tick
  fn tick(&mut self, _ctx: &mut ViewContext) {}

  /// A cache entry changed
  fn on_cache_event(&mut self, _event: &CacheEvent, _ctx: &mut ViewContext) {}

  /// Keys this view is currently observing; these survive garbage collection
  fn active_keys(&self) -> Vec<QueryKey> {
    Vec::new()
  }

  /// A message for the footer, taken once
  fn take_status(&mut self) -> Option<String> {
    None
  }

  /// Whether a text field has focus and should receive `:` and `q`
  fn captures_input(&self) -> bool {
    false
  }

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
