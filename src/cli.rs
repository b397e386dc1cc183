use std::fmt;
use std::str::FromStr;

use clap::{ArgAction, Parser};

const AFTER_HELP: &str = "\
ACTION:
  q query  queries and streams response without modifying the context.
  c chat   queries, streams response, and updates context.
  i init   (re-)initializes the context file using OPTIONS.
  e edit   edits the context file with $EDITOR or vi.
  a auth   edits the authfile with $EDITOR or vi.
  p path   prints the absolute filepath of the plugin or context.
  r rm     removes the CONTEXT file.
  k kill   terminates the llmq process with CONTEXT open, if able.
  l list   list all available plugins and their descriptions.
  h help   display the llmq or plugin help and exit.

notes:
 - CONTEXT required for c|i|e|r|k
 - OPTIONS/MSGS/stdin ignored for e|a|p|r|k|l|h
 - stdin ignored for i
 - CONTEXT omits the \".yml\" suffix present on all context files.
 - plugin files live in $XDG_CONFIG_HOME/llmq/PLUGIN and $XDG_DATA_HOME/llmq/PLUGIN
   (or ~/.config/... and ~/.local/share/...). See `llmq help PLUGIN`.";

/// A query CLI, plugin framework, and I/O manager for conversational AIs.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "llmq",
    version,
    override_usage = "llmq [-hqivr] [--timeout SECS] ACTION [PLUGIN][://CONTEXT] [OPTIONS]... [MSGS]...",
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Do not print the reply to stdout (chat only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not read stdin, even if MSGS is missing
    #[arg(short = 'i', long = "no-stdin")]
    pub no_stdin: bool,

    /// Print diagnostics to stderr; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Reissue the whole request once if the reply stream fails
    #[arg(short, long)]
    pub retry: bool,

    /// Transport timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[arg(value_name = "ACTION")]
    pub action: Action,

    #[arg(value_name = "PLUGIN[://CONTEXT]")]
    pub target: Option<String>,

    /// Plugin OPTIONS and MSGS
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub plugin_args: Vec<String>,
}

impl Cli {
    /// Rejects flag/action combinations the parser cannot express.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.quiet && self.action != Action::Chat {
            return Err(CliError::QuietOutsideChat);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliError {
    #[error("quiet flag only supported for chat mode")]
    QuietOutsideChat,
    #[error("invalid action \"{0}\"")]
    InvalidAction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Query,
    Chat,
    Init,
    Edit,
    Auth,
    Path,
    Rm,
    Kill,
    List,
    Help,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Query,
        Action::Chat,
        Action::Init,
        Action::Edit,
        Action::Auth,
        Action::Path,
        Action::Rm,
        Action::Kill,
        Action::List,
        Action::Help,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Action::Query => "query",
            Action::Chat => "chat",
            Action::Init => "init",
            Action::Edit => "edit",
            Action::Auth => "auth",
            Action::Path => "path",
            Action::Rm => "rm",
            Action::Kill => "kill",
            Action::List => "list",
            Action::Help => "help",
        }
    }

    /// Whether the action operates on a named context.
    #[must_use]
    pub fn requires_context(self) -> bool {
        matches!(
            self,
            Action::Chat | Action::Init | Action::Edit | Action::Rm | Action::Kill
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts the full action name or its first letter.
impl FromStr for Action {
    type Err = CliError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut found = Action::ALL.into_iter().filter(|action| {
            let name = action.name();
            value == name || (value.len() == 1 && name.starts_with(value))
        });
        match (found.next(), found.next()) {
            (Some(action), None) => Ok(action),
            _ => Err(CliError::InvalidAction(value.to_owned())),
        }
    }
}

/// `PLUGIN[://CONTEXT]`, split on the first `://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub plugin: String,
    pub context: Option<String>,
}

impl Target {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.split_once("://") {
            Some((plugin, context)) => Self {
                plugin: plugin.to_owned(),
                context: (!context.is_empty()).then(|| context.to_owned()),
            },
            None => Self {
                plugin: value.to_owned(),
                context: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::{Action, Cli, CliError, Target};

    #[test]
    fn actions_accept_name_or_initial() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>(), Ok(action));
            assert_eq!(action.name()[..1].parse::<Action>(), Ok(action));
        }
        assert_eq!(
            "chit".parse::<Action>(),
            Err(CliError::InvalidAction("chit".to_owned()))
        );
        assert!("".parse::<Action>().is_err());
    }

    #[test]
    fn target_splits_on_first_separator() {
        assert_eq!(
            Target::parse("gpt://work/review"),
            Target {
                plugin: "gpt".to_owned(),
                context: Some("work/review".to_owned())
            }
        );
        assert_eq!(Target::parse("gpt://").context, None);
        assert_eq!(Target::parse("gpt").plugin, "gpt");
        assert_eq!(Target::parse("a://b://c").context.as_deref(), Some("b://c"));
    }

    #[test]
    fn plugin_arguments_pass_through_untouched() {
        let cli = Cli::try_parse_from([
            "llmq", "-v", "c", "gpt://chat", "-m", "gpt-4o", "--temperature", "0.2", "hello",
        ])
        .expect("cli parses");
        assert_eq!(cli.action, Action::Chat);
        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.target.as_deref(), Some("gpt://chat"));
        assert_eq!(
            cli.plugin_args,
            vec!["-m", "gpt-4o", "--temperature", "0.2", "hello"]
        );
    }

    #[test]
    fn quiet_is_chat_only() {
        let cli = Cli::try_parse_from(["llmq", "-q", "query", "gpt"]).expect("cli parses");
        assert_eq!(cli.validate(), Err(CliError::QuietOutsideChat));
        let cli = Cli::try_parse_from(["llmq", "-q", "chat", "gpt://x"]).expect("cli parses");
        assert_eq!(cli.validate(), Ok(()));
    }

    #[test]
    fn context_requirement_per_action() {
        assert!(Action::Chat.requires_context());
        assert!(Action::Kill.requires_context());
        assert!(!Action::Query.requires_context());
        assert!(!Action::Path.requires_context());
    }
}
