//! Session commands and their parser.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use semver::Version;

use crate::cache::RequestMode;
use crate::worker::{MessageKind, NotificationAction};

#[derive(Debug, Clone)]
pub struct CommandSpec {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[CommandSpec] = &[
  CommandSpec {
    name: "install",
    aliases: &["i"],
    usage: "install [version]",
    description: "Install the configured version, or another release",
  },
  CommandSpec {
    name: "activate",
    aliases: &["a"],
    usage: "activate",
    description: "Activate the waiting version",
  },
  CommandSpec {
    name: "fetch",
    aliases: &["f", "get"],
    usage: "fetch <path|url>",
    description: "Request a sub-resource",
  },
  CommandSpec {
    name: "navigate",
    aliases: &["n", "nav"],
    usage: "navigate <path|url>",
    description: "Load a page as a top-level navigation",
  },
  CommandSpec {
    name: "post",
    aliases: &[],
    usage: "post <path|url>",
    description: "Send a POST (never intercepted)",
  },
  CommandSpec {
    name: "message",
    aliases: &["m", "msg"],
    usage: "message <kind>",
    description: "Post a message to the worker (e.g. skip-waiting)",
  },
  CommandSpec {
    name: "sync",
    aliases: &[],
    usage: "sync <tag>",
    description: "Fire a background sync",
  },
  CommandSpec {
    name: "push",
    aliases: &["p"],
    usage: "push [text]",
    description: "Deliver a push message",
  },
  CommandSpec {
    name: "click",
    aliases: &["c"],
    usage: "click <explore|close>",
    description: "Click a notification action",
  },
  CommandSpec {
    name: "state",
    aliases: &["s", "status"],
    usage: "state",
    description: "Show active and waiting versions",
  },
  CommandSpec {
    name: "buckets",
    aliases: &["b", "caches"],
    usage: "buckets",
    description: "List cache buckets",
  },
  CommandSpec {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "Show this list",
  },
  CommandSpec {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Wait for in-flight work and exit",
  },
];

/// A parsed session line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
  Install(Option<Version>),
  Activate,
  Fetch {
    method: Method,
    target: String,
    mode: RequestMode,
  },
  Message(MessageKind),
  Sync(String),
  Push(Option<String>),
  Click(NotificationAction),
  State,
  Buckets,
  Help,
  Quit,
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static CommandSpec> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&CommandSpec, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve a command word: exact name or alias, or an unambiguous prefix.
fn resolve(word: &str) -> Result<&'static CommandSpec> {
  let suggestions = get_suggestions(word);
  match suggestions.as_slice() {
    [] => Err(eyre!("Unknown command '{}' (try 'help')", word)),
    [only] => Ok(*only),
    [first, ..] if first.name == word.to_lowercase() || first.aliases.contains(&word) => {
      Ok(*first)
    }
    many => {
      let names: Vec<_> = many.iter().map(|c| c.name).collect();
      Err(eyre!("Ambiguous command '{}': {}", word, names.join(", ")))
    }
  }
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<SessionCommand>> {
  let line = line.trim();
  if line.is_empty() || line.starts_with('#') {
    return Ok(None);
  }

  let (word, rest) = match line.split_once(char::is_whitespace) {
    Some((word, rest)) => (word, rest.trim()),
    None => (line, ""),
  };
  let arg = (!rest.is_empty()).then(|| rest.to_string());
  let cmd = resolve(word)?;

  let required = |what: &str| {
    arg
      .clone()
      .ok_or_else(|| eyre!("Usage: {} (missing {})", cmd.usage, what))
  };

  let command = match cmd.name {
    "install" => {
      let version = match &arg {
        Some(v) => Some(
          Version::parse(v.trim_start_matches('v'))
            .map_err(|e| eyre!("Invalid version '{}': {}", v, e))?,
        ),
        None => None,
      };
      SessionCommand::Install(version)
    }
    "activate" => SessionCommand::Activate,
    "fetch" => SessionCommand::Fetch {
      method: Method::GET,
      target: required("path")?,
      mode: RequestMode::SameOrigin,
    },
    "navigate" => SessionCommand::Fetch {
      method: Method::GET,
      target: required("path")?,
      mode: RequestMode::Navigate,
    },
    "post" => SessionCommand::Fetch {
      method: Method::POST,
      target: required("path")?,
      mode: RequestMode::SameOrigin,
    },
    "message" => SessionCommand::Message(MessageKind::parse(&required("kind")?)),
    "sync" => SessionCommand::Sync(required("tag")?),
    "push" => SessionCommand::Push(arg.clone()),
    "click" => SessionCommand::Click(NotificationAction::parse(&required("action")?)),
    "state" => SessionCommand::State,
    "buckets" => SessionCommand::Buckets,
    "help" => SessionCommand::Help,
    "quit" => SessionCommand::Quit,
    other => return Err(eyre!("Unhandled command '{}'", other)),
  };

  Ok(Some(command))
}

/// Help text listing every command.
pub fn help() -> String {
  COMMANDS
    .iter()
    .map(|c| format!("  {:<24} {}", c.usage, c.description))
    .collect::<Vec<_>>()
    .join("\n")
}
