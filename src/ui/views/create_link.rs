use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::mpsc;

use crate::api::types::NewLink;
use crate::cache::QueryCache;
use crate::controllers::{LinkField, MutationController, MutationError, MutationState};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};

const FIELDS: [LinkField; 2] = [LinkField::WhiteUrl, LinkField::BlackUrl];

/// Form for creating a short link
pub struct CreateLinkView {
  white_url: TextInput,
  black_url: TextInput,
  focus: usize,
  mutation: MutationController,
  mutation_events: mpsc::UnboundedReceiver<MutationState>,
  /// Code of the last link created from this form
  created: Option<String>,
  /// Outcome message not yet handed to the footer
  status: Option<String>,
}

impl Default for CreateLinkView {
  fn default() -> Self {
    Self::new()
  }
}

impl CreateLinkView {
  pub fn new() -> Self {
    let mut mutation = MutationController::new();
    Self {
      white_url: TextInput::new(),
      black_url: TextInput::new(),
      focus: 0,
      mutation_events: mutation.subscribe(),
      mutation,
      created: None,
      status: None,
    }
  }

  /// Empty the form and forget any pending write. A write already sent
  /// still lands in the cache.
  fn reset(&mut self) {
    self.mutation.reset();
    self.white_url.clear();
    self.black_url.clear();
    self.focus = 0;
    self.created = None;
  }

  fn field_input(&mut self, field: LinkField) -> &mut TextInput {
    match field {
      LinkField::WhiteUrl => &mut self.white_url,
      LinkField::BlackUrl => &mut self.black_url,
    }
  }

  fn focused(&self) -> LinkField {
    FIELDS[self.focus]
  }

  fn input(&self) -> NewLink {
    NewLink {
      white_url: self.white_url.value().to_string(),
      black_url: self.black_url.value().to_string(),
    }
  }

  fn submit(&mut self, ctx: &mut ViewContext) {
    self.created = None;
    let input = self.input();
    self.mutation.submit(&input, ctx.api, ctx.cache);
  }

  /// Move finished writes into view state. The form is cleared only after a
  /// successful create.
  fn absorb(&mut self, cache: &mut QueryCache) {
    self.mutation.poll(cache);
    while let Ok(state) = self.mutation_events.try_recv() {
      match state {
        MutationState::Succeeded(link) => {
          self.status = Some(format!("Created link {}", link.code));
          self.created = Some(link.code);
          self.white_url.clear();
          self.black_url.clear();
          self.focus = 0;
        }
        MutationState::Failed(MutationError::Transport(e)) => {
          self.status = Some(format!("Create failed: {}", e));
        }
        MutationState::Idle | MutationState::Pending | MutationState::Failed(_) => {}
      }
    }
  }

  fn field_error(&self, field: LinkField) -> Option<String> {
    match self.mutation.state() {
      MutationState::Failed(error) => error.field(field).map(|e| e.kind.to_string()),
      _ => None,
    }
  }

  fn field_lines(&self, field: LinkField, input: &TextInput, focused: bool) -> Vec<Line<'static>> {
    let label_style = if focused {
      Style::default().fg(Color::Yellow).bold()
    } else {
      Style::default().fg(Color::DarkGray)
    };
    let mut value = vec![Span::styled(format!("{:<11}", field.label()), label_style)];
    if focused {
      let (before, after) = input.split_at_cursor();
      value.push(Span::raw(before.to_string()));
      value.push(Span::styled("│", Style::default().fg(Color::Yellow)));
      value.push(Span::raw(after.to_string()));
    } else {
      value.push(Span::raw(input.value().to_string()));
    }
    let mut lines = vec![Line::from(value)];
    if let Some(error) = self.field_error(field) {
      lines.push(Line::styled(
        format!("{:<11}{}", "", error),
        Style::default().fg(Color::Red),
      ));
    }
    lines.push(Line::raw(""));
    lines
  }

  fn status_line(&self) -> Line<'static> {
    match self.mutation.state() {
      MutationState::Idle => match &self.created {
        Some(code) => Line::styled(
          format!("Created link {}", code),
          Style::default().fg(Color::Green),
        ),
        None => Line::styled(
          "Enter the two destinations and press Enter",
          Style::default().fg(Color::DarkGray),
        ),
      },
      MutationState::Pending => {
        Line::styled("Creating link...", Style::default().fg(Color::Yellow))
      }
      MutationState::Succeeded(link) => Line::styled(
        format!("Created link {} (id {})", link.code, link.id),
        Style::default().fg(Color::Green),
      ),
      MutationState::Failed(MutationError::Invalid(_)) => Line::styled(
        "Fix the highlighted fields and resubmit",
        Style::default().fg(Color::Red),
      ),
      MutationState::Failed(MutationError::Transport(e)) => Line::styled(
        format!("Create failed: {}", e),
        Style::default().fg(Color::Red),
      ),
    }
  }
}

impl View for CreateLinkView {
  fn handle_key(&mut self, key: KeyEvent, ctx: &mut ViewContext) -> ViewAction {
    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focus = (self.focus + 1) % FIELDS.len();
        return ViewAction::None;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = (self.focus + FIELDS.len() - 1) % FIELDS.len();
        return ViewAction::None;
      }
      KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.reset();
        return ViewAction::None;
      }
      _ => {}
    }

    let field = self.focused();
    let result = self.field_input(field).handle_key(key);
    match result {
      InputResult::Cancelled => ViewAction::Pop,
      InputResult::Submitted(_) if field == LinkField::WhiteUrl => {
        self.focus = 1;
        ViewAction::None
      }
      InputResult::Submitted(_) => {
        self.submit(ctx);
        ViewAction::None
      }
      InputResult::Consumed | InputResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, _cache: &QueryCache) {
    let block = Block::default()
      .title(" Create Link ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let mut lines = vec![Line::raw("")];
    lines.extend(self.field_lines(LinkField::WhiteUrl, &self.white_url, self.focus == 0));
    lines.extend(self.field_lines(LinkField::BlackUrl, &self.black_url, self.focus == 1));
    lines.push(self.status_line());

    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Create".to_string()
  }

  fn tick(&mut self, ctx: &mut ViewContext) {
    self.absorb(ctx.cache);
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn take_status(&mut self) -> Option<String> {
    self.status.take()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "submit").with_priority(20),
      ShortcutInfo::new("C-l", "clear").with_priority(30),
      ShortcutInfo::new("esc", "back").with_priority(90),
    ]
  }
}
