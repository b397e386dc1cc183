use clap::parser::ValueSource;
use clap::Command;

/// One parsed plugin argument, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginArg {
    /// Argument id from the plugin's [`Command`], or `None` for positional
    /// messages (including a message read from stdin).
    pub name: Option<String>,
    pub value: String,
}

impl PluginArg {
    #[must_use]
    pub fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn positional(value: impl Into<String>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_positional(&self) -> bool {
        self.name.is_none()
    }
}

/// Parses `argv` (without a binary name) with a plugin's command and returns
/// every value-taking argument ordered by its position on the command line.
///
/// Order matters: message options such as `--sys` and positional messages
/// are appended to the context in the order the user wrote them.
pub fn collect_args<I, T>(command: Command, argv: I) -> Result<Vec<PluginArg>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let command = command.no_binary_name(true);
    let matches = command.clone().try_get_matches_from(argv)?;

    let mut ordered: Vec<(usize, PluginArg)> = Vec::new();
    for arg in command.get_arguments() {
        if !arg.get_action().takes_values() {
            continue;
        }
        let id = arg.get_id().as_str();
        if matches.value_source(id) != Some(ValueSource::CommandLine) {
            continue;
        }
        let (Some(values), Some(indices)) = (matches.get_raw(id), matches.indices_of(id)) else {
            continue;
        };

        let name = (!arg.is_positional()).then(|| id.to_owned());
        for (value, index) in values.zip(indices) {
            ordered.push((
                index,
                PluginArg {
                    name: name.clone(),
                    value: value.to_string_lossy().into_owned(),
                },
            ));
        }
    }

    ordered.sort_by_key(|(index, _)| *index);
    Ok(ordered.into_iter().map(|(_, arg)| arg).collect())
}

#[cfg(test)]
mod tests {
    use clap::{Arg, ArgAction, Command};
    use pretty_assertions::assert_eq;

    use super::{collect_args, PluginArg};

    fn command() -> Command {
        Command::new("demo")
            .arg(
                Arg::new("model")
                    .short('m')
                    .long("model")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("sys")
                    .short('s')
                    .long("sys")
                    .action(ArgAction::Append),
            )
            .arg(Arg::new("msgs").num_args(1..).action(ArgAction::Append))
    }

    #[test]
    fn collect_args_preserves_command_line_order() {
        let args = collect_args(
            command(),
            ["-s", "be brief", "hello", "--model", "gpt-4", "-s", "again"],
        )
        .expect("args should parse");

        assert_eq!(
            args,
            vec![
                PluginArg::named("sys", "be brief"),
                PluginArg::positional("hello"),
                PluginArg::named("model", "gpt-4"),
                PluginArg::named("sys", "again"),
            ]
        );
    }

    #[test]
    fn collect_args_returns_empty_for_no_arguments() {
        let args = collect_args(command(), Vec::<String>::new()).expect("empty args parse");
        assert!(args.is_empty());
    }

    #[test]
    fn collect_args_rejects_unknown_options() {
        let error = collect_args(command(), ["--bogus", "x"]).expect_err("unknown option");
        assert_eq!(error.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
