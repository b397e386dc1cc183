use clap::{value_parser, Arg, ArgAction, Command};
use llmq_plugin::{Document, PluginArg, PluginError};
use serde_yaml::{Mapping, Value};

/// Positional MSGS, appended as user messages.
pub const MSGS_ID: &str = "msgs";

const SYSTEM_ROLE: &str = "system";
const ASSISTANT_ROLE: &str = "assistant";
const USER_ROLE: &str = "user";

/// How an option's raw value lands in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Apply {
    Text,
    Float,
    Integer,
    Bool,
    AppendText,
    MergeJsonMap,
    Message(&'static str),
}

struct GptOption {
    id: &'static str,
    short: char,
    long: &'static str,
    value_name: &'static str,
    help: &'static str,
    apply: Apply,
}

const OPTIONS: &[GptOption] = &[
    GptOption {
        id: "model",
        short: 'm',
        long: "model",
        value_name: "STR",
        help: "model endpoint",
        apply: Apply::Text,
    },
    GptOption {
        id: "temperature",
        short: 'T',
        long: "temperature",
        value_name: "NUM",
        help: "sampling temperature to use",
        apply: Apply::Float,
    },
    GptOption {
        id: "top_p",
        short: 'p',
        long: "top-p",
        value_name: "NUM",
        help: "nucleus sampling probability mass",
        apply: Apply::Float,
    },
    GptOption {
        id: "n",
        short: 'n',
        long: "n",
        value_name: "INT",
        help: "number of choices to generate",
        apply: Apply::Integer,
    },
    GptOption {
        id: "stream",
        short: 'S',
        long: "stream",
        value_name: "BOOL",
        help: "enable receiving partial deltas",
        apply: Apply::Bool,
    },
    GptOption {
        id: "stop",
        short: 'X',
        long: "stop",
        value_name: "STR",
        help: "add a stop sequence",
        apply: Apply::AppendText,
    },
    GptOption {
        id: "max_tokens",
        short: 't',
        long: "max-tokens",
        value_name: "INT",
        help: "maximum number of tokens to generate",
        apply: Apply::Integer,
    },
    GptOption {
        id: "presence_penalty",
        short: 'P',
        long: "presence-penalty",
        value_name: "NUM",
        help: "penalty for token similarity",
        apply: Apply::Float,
    },
    GptOption {
        id: "frequency_penalty",
        short: 'F',
        long: "frequency-penalty",
        value_name: "NUM",
        help: "penalty for token frequency",
        apply: Apply::Float,
    },
    GptOption {
        id: "logit_bias",
        short: 'L',
        long: "logit-bias",
        value_name: "MAP",
        help: "JSON map of token biases",
        apply: Apply::MergeJsonMap,
    },
    GptOption {
        id: "user",
        short: 'U',
        long: "user",
        value_name: "STR",
        help: "unique user identifier",
        apply: Apply::Text,
    },
    GptOption {
        id: "sys",
        short: 's',
        long: "sys",
        value_name: "STR",
        help: "append a system message to the context",
        apply: Apply::Message(SYSTEM_ROLE),
    },
    GptOption {
        id: "gpt",
        short: 'g',
        long: "gpt",
        value_name: "STR",
        help: "append an assistant message to the context",
        apply: Apply::Message(ASSISTANT_ROLE),
    },
    GptOption {
        id: "usr",
        short: 'u',
        long: "usr",
        value_name: "STR",
        help: "append a user message to the context",
        apply: Apply::Message(USER_ROLE),
    },
];

/// OPTIONS and MSGS grammar of the gpt plugin.
pub fn command() -> Command {
    let mut command = Command::new("gpt")
        .about("an llmq plugin for the OpenAI Chat Completions endpoint.")
        .override_usage("llmq ARGS... gpt[://CONTEXT] [OPTIONS]... [-sgu TAGMSG]... [USRMSG]...")
        .after_help(
            "authfile must be a YAML map with properties \"key\" and optionally \"org\" and \"base_url\".\n\
             the context file is a 1:1 match with the parameters sent to the endpoint.\n\
             note: OPTIONS override CONTEXT",
        );

    for option in OPTIONS {
        let arg = Arg::new(option.id)
            .short(option.short)
            .long(option.long)
            .value_name(option.value_name)
            .help(option.help)
            .action(ArgAction::Append);
        let arg = match option.apply {
            Apply::Float => arg.value_parser(value_parser!(f64)),
            Apply::Integer => arg.value_parser(value_parser!(u64)),
            Apply::Bool => arg.value_parser(value_parser!(bool)),
            _ => arg,
        };
        command = command.arg(arg);
    }

    command.arg(
        Arg::new(MSGS_ID)
            .value_name("USRMSG")
            .help("append a user message to the context (same as -u USRMSG)")
            .num_args(1..)
            .action(ArgAction::Append),
    )
}

/// Applies `args` to `context` in order; later options override earlier ones
/// and any value already stored in the context.
pub fn apply_args(context: &mut Document, args: &[PluginArg]) -> Result<(), PluginError> {
    for arg in args {
        match &arg.name {
            None => apply_value(context, MSGS_ID, MSGS_ID, Apply::Message(USER_ROLE), &arg.value)?,
            Some(name) => {
                let option = lookup(name)?;
                apply_value(context, option.id, option.long, option.apply, &arg.value)?;
            }
        }
    }
    Ok(())
}

fn lookup(name: &str) -> Result<&'static GptOption, PluginError> {
    OPTIONS
        .iter()
        .find(|option| option.id == name)
        .ok_or_else(|| PluginError::invalid_option(name, "not a gpt option"))
}

/// `label` is the long option name used in error messages.
fn apply_value(
    context: &mut Document,
    key: &str,
    label: &str,
    apply: Apply,
    raw: &str,
) -> Result<(), PluginError> {
    match apply {
        Apply::Text => context.set(key, raw),
        Apply::Float => {
            let value = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| {
                    PluginError::invalid_option(label, format!("'{raw}' is not a number"))
                })?;
            context.set(key, value);
        }
        Apply::Integer => {
            let value = raw.trim().parse::<u64>().map_err(|_| {
                PluginError::invalid_option(label, format!("'{raw}' is not a non-negative integer"))
            })?;
            context.set(key, value);
        }
        Apply::Bool => {
            let value = raw.trim().parse::<bool>().map_err(|_| {
                PluginError::invalid_option(label, format!("'{raw}' is not true or false"))
            })?;
            context.set(key, value);
        }
        Apply::AppendText => context.append_to_sequence(key, raw)?,
        Apply::MergeJsonMap => context.merge_map(key, parse_json_map(label, raw)?)?,
        Apply::Message(role) => {
            context.push_message(role, raw)?;
        }
    }
    Ok(())
}

fn parse_json_map(label: &str, raw: &str) -> Result<Mapping, PluginError> {
    let json = serde_json::from_str::<serde_json::Value>(raw)
        .map_err(|error| PluginError::invalid_option(label, format!("invalid JSON: {error}")))?;
    if !json.is_object() {
        return Err(PluginError::invalid_option(label, "must be a JSON map"));
    }
    match serde_yaml::to_value(json) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(_) => Err(PluginError::invalid_option(label, "must be a JSON map")),
        Err(error) => Err(PluginError::invalid_option(label, error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use llmq_plugin::{collect_args, Document, Message, PluginError};
    use pretty_assertions::assert_eq;

    use super::{apply_args, command};

    fn applied(seed: &str, argv: &[&str]) -> Result<Document, PluginError> {
        let mut context = Document::parse(seed.as_bytes()).expect("seed parses");
        let args = collect_args(command(), argv.iter().copied()).expect("argv parses");
        apply_args(&mut context, &args)?;
        Ok(context)
    }

    #[test]
    fn options_are_stored_typed() {
        let context = applied(
            "",
            &["-m", "gpt-4o", "-T", "0.5", "-n", "2", "-S", "true", "--max-tokens", "64"],
        )
        .expect("options apply");
        assert_eq!(
            context.to_yaml().expect("yaml"),
            "model: gpt-4o\ntemperature: 0.5\nn: 2\nstream: true\nmax_tokens: 64\n"
        );
    }

    #[test]
    fn options_override_context_values_in_place() {
        let context = applied("model: gpt-3.5-turbo\nn: 3\n", &["-n", "1", "--model", "gpt-4o"])
            .expect("options apply");
        assert_eq!(context.to_yaml().expect("yaml"), "model: gpt-4o\nn: 1\n");
    }

    #[test]
    fn messages_follow_command_line_order() {
        let context = applied(
            "messages:\n- role: user\n  content: earlier\n",
            &["-s", "be terse", "first", "-g", "ok", "-u", "second", "third"],
        )
        .expect("messages apply");
        assert_eq!(
            context.messages().expect("messages"),
            vec![
                Message::new("user", "earlier"),
                Message::new("system", "be terse"),
                Message::new("user", "first"),
                Message::new("assistant", "ok"),
                Message::new("user", "second"),
                Message::new("user", "third"),
            ]
        );
    }

    #[test]
    fn stop_sequences_accumulate() {
        let context = applied("stop:\n- END\n", &["-X", "STOP", "--stop", "DONE"]).expect("stop");
        assert_eq!(
            context.to_yaml().expect("yaml"),
            "stop:\n- END\n- STOP\n- DONE\n"
        );
    }

    #[test]
    fn logit_bias_merges_json_map() {
        let context = applied(
            "logit_bias:\n  '50256': -100\n",
            &["-L", r#"{"50256": 5, "1234": -1}"#],
        )
        .expect("logit bias");
        assert_eq!(
            context.to_json().expect("json"),
            r#"{"logit_bias":{"50256":5,"1234":-1}}"#
        );
    }

    #[test]
    fn logit_bias_rejects_non_map() {
        let error = applied("", &["-L", "[1, 2]"]).expect_err("array is not a map");
        assert!(matches!(
            error,
            PluginError::InvalidOption { ref option, .. } if option == "logit-bias"
        ));
    }

    #[test]
    fn numeric_options_are_validated_by_the_grammar() {
        let error = collect_args(command(), ["-T", "warm"]).expect_err("not a float");
        assert_eq!(error.kind(), clap::error::ErrorKind::ValueValidation);
        let error = collect_args(command(), ["-n", "two"]).expect_err("not an integer");
        assert_eq!(error.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn raw_values_are_validated_on_apply() {
        let mut context = Document::new();
        let error = apply_args(
            &mut context,
            &[llmq_plugin::PluginArg::named("stream", "maybe")],
        )
        .expect_err("not a bool");
        assert_eq!(error.to_string(), "invalid value for --stream: 'maybe' is not true or false");
        assert!(context.is_empty());
    }
}
