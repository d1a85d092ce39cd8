//! `:` palette commands and their autocomplete ranking.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
  Links,
  Clicks,
  Create,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub kind: CommandKind,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

pub const COMMANDS: &[Command] = &[
  Command {
    kind: CommandKind::Links,
    name: "links",
    aliases: &["l", "link"],
    description: "Short links and their stats",
  },
  Command {
    kind: CommandKind::Clicks,
    name: "clicks",
    aliases: &["c", "click", "analytics"],
    description: "Click log with country/bot filters",
  },
  Command {
    kind: CommandKind::Create,
    name: "create",
    aliases: &["n", "new", "add"],
    description: "Create a short link",
  },
  Command {
    kind: CommandKind::Quit,
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit linkdeck",
  },
];

/// Lower is better; None means no match
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  let aliases = || cmd.aliases.iter();
  if cmd.name == input {
    Some(0)
  } else if aliases().any(|a| *a == input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if aliases().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if aliases().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Commands matching `input`, best first. Empty input lists everything.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&'static Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (cmd, r)))
    .collect();
  // Stable, so equal ranks keep declaration order
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
