use crate::api::ApiClient;
use crate::cache::{CacheEvent, QueryCache, QueryKey};
use crate::commands::CommandKind;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::extract_host;
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::{ClicksView, CreateLinkView, LinksView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` palette
  command: CommandInput,

  /// Shared server-state cache, owned here and lent to views
  cache: QueryCache,
  cache_events: mpsc::UnboundedReceiver<CacheEvent>,

  api: ApiClient,
  config: Config,
  title: String,

  /// Last message for the footer
  status: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, api_url: Url) -> Result<Self> {
    let api = ApiClient::http(&api_url, config.api_timeout())?;
    let mut cache = QueryCache::new()
      .with_stale_time(config.stale_time())
      .with_gc_time(config.gc_time());
    let cache_events = cache.subscribe();

    let title = config
      .title
      .clone()
      .unwrap_or_else(|| extract_host(api_url.as_str()).to_string());

    Ok(Self {
      view_stack: vec![Box::new(LinksView::new(&config))],
      command: CommandInput::new(),
      cache,
      cache_events,
      api,
      config,
      title,
      status: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.main_loop(&mut terminal).await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    result
  }

  async fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.activate_top();

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      tokio::select! {
        event = events.next() => match event {
          Some(event) => self.handle_event(event),
          None => self.should_quit = true,
        },
        // A fetch landed; redraw straight away instead of waiting for a tick
        _ = self.cache.recv() => {}
      }
      self.dispatch_cache_events();
      self.collect_status();
    }

    info!("shutting down");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize => {}
      Event::Tick => self.tick(),
    }
  }

  fn tick(&mut self) {
    self.cache.poll();
    let (view, mut ctx) = self.top_with_context();
    if let Some(view) = view {
      view.tick(&mut ctx);
    }

    let active: Vec<QueryKey> = self
      .view_stack
      .iter()
      .flat_map(|v| v.active_keys())
      .collect();
    let evicted = self.cache.collect_garbage(&active);
    if evicted > 0 {
      debug!(evicted, "cache entries collected");
    }
  }

  /// Hand cache notifications to the visible view
  fn dispatch_cache_events(&mut self) {
    while let Ok(event) = self.cache_events.try_recv() {
      let (view, mut ctx) = self.top_with_context();
      if let Some(view) = view {
        view.on_cache_event(&event, &mut ctx);
      }
    }
  }

  /// Show whatever the visible view has to report in the footer
  fn collect_status(&mut self) {
    if let Some(status) = self.view_stack.last_mut().and_then(|v| v.take_status()) {
      self.status = Some(status);
    }
  }

  fn top_with_context(&mut self) -> (Option<&mut Box<dyn View>>, ViewContext<'_>) {
    (
      self.view_stack.last_mut(),
      ViewContext {
        cache: &mut self.cache,
        api: &self.api,
      },
    )
  }

  fn activate_top(&mut self) {
    let (view, mut ctx) = self.top_with_context();
    if let Some(view) = view {
      view.activate(&mut ctx);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let captures = self
      .view_stack
      .last()
      .map(|v| v.captures_input())
      .unwrap_or(false);
    if !captures || self.command.is_active() {
      match self.command.handle_key(key) {
        KeyResult::Handled => return,
        KeyResult::Event(CommandEvent::Run(kind)) => {
          self.run_command(kind);
          return;
        }
        KeyResult::Event(CommandEvent::Unknown(input)) => {
          self.status = Some(format!("Unknown command: {}", input));
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) => return,
        KeyResult::NotHandled => {}
      }
    }

    let (view, mut ctx) = self.top_with_context();
    let action = match view {
      Some(view) => view.handle_key(key, &mut ctx),
      None => ViewAction::None,
    };
    self.apply_action(action);
  }

  fn apply_action(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => {
        self.status = None;
        self.view_stack.push(view);
        self.activate_top();
      }
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
          self.activate_top();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn run_command(&mut self, kind: CommandKind) {
    debug!(?kind, "command");
    self.status = None;
    match kind {
      CommandKind::Links => self.replace_root(Box::new(LinksView::new(&self.config))),
      CommandKind::Clicks => self.replace_root(Box::new(ClicksView::new(&self.config))),
      CommandKind::Create => self.apply_action(ViewAction::Push(Box::new(CreateLinkView::new()))),
      CommandKind::Quit => self.should_quit = true,
    }
  }

  fn replace_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
    self.activate_top();
  }

  // Accessors for UI rendering

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn render_view(&mut self, frame: &mut Frame, area: Rect) {
    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, area, &self.cache);
    }
  }
}
