use serde_yaml::{Mapping, Sequence, Value};

use crate::error::DocumentError;

pub const MESSAGES_KEY: &str = "messages";
pub const ROLE_KEY: &str = "role";
pub const CONTENT_KEY: &str = "content";

/// One chat message as stored in the `messages` sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Structured conversation context: a YAML map of request parameters plus a
/// `messages` sequence.
///
/// Key order is preserved across parse/serialize, so serializing a freshly
/// parsed document reproduces its canonical bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    root: Mapping,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses stored context bytes. Blank input and a YAML `null` both yield
    /// an empty document.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(bytes).map_err(DocumentError::NotUtf8)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        match serde_yaml::from_str::<Value>(text).map_err(DocumentError::Yaml)? {
            Value::Null => Ok(Self::default()),
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(DocumentError::NotAMap {
                found: kind_name(&other),
            }),
        }
    }

    pub fn to_yaml(&self) -> Result<String, DocumentError> {
        serde_yaml::to_string(&self.root).map_err(DocumentError::Yaml)
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string(&self.root).map_err(DocumentError::Json)
    }

    #[must_use]
    pub fn root(&self) -> &Mapping {
        &self.root
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Sets a top-level parameter, keeping its position when it already exists.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.root.insert(Value::from(key), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.root.shift_remove(key)
    }

    /// Reads an unsigned integer parameter stored either as a number or as a
    /// numeric string.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, DocumentError> {
        let Some(value) = self.root.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Null => return Ok(None),
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| DocumentError::WrongKind {
            key: key.to_owned(),
            expected: "non-negative integer",
            found: kind_name(value),
        })
    }

    pub fn append_to_sequence(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), DocumentError> {
        self.sequence_mut(key)?.push(value.into());
        Ok(())
    }

    /// Merges `entries` into the map stored at `key`, creating it if needed.
    pub fn merge_map(&mut self, key: &str, entries: Mapping) -> Result<(), DocumentError> {
        let slot = self
            .root
            .entry(Value::from(key))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if slot.is_null() {
            *slot = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = slot else {
            return Err(DocumentError::WrongKind {
                key: key.to_owned(),
                expected: "map",
                found: kind_name(slot),
            });
        };
        for (entry_key, entry_value) in entries {
            map.insert(entry_key, entry_value);
        }
        Ok(())
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        match self.root.get(MESSAGES_KEY) {
            Some(Value::Sequence(messages)) => messages.len(),
            _ => 0,
        }
    }

    pub fn message(&self, index: usize) -> Result<Message, DocumentError> {
        let messages = match self.root.get(MESSAGES_KEY) {
            Some(Value::Sequence(messages)) => messages,
            _ => return Err(DocumentError::MissingMessage { index }),
        };
        let entry = messages
            .get(index)
            .ok_or(DocumentError::MissingMessage { index })?;

        Ok(Message {
            role: message_field(entry, index, ROLE_KEY)?.to_owned(),
            content: message_field(entry, index, CONTENT_KEY)?.to_owned(),
        })
    }

    pub fn messages(&self) -> Result<Vec<Message>, DocumentError> {
        (0..self.message_count())
            .map(|index| self.message(index))
            .collect()
    }

    /// Appends a message and returns its index in the `messages` sequence.
    pub fn push_message(&mut self, role: &str, content: &str) -> Result<usize, DocumentError> {
        let messages = self.sequence_mut(MESSAGES_KEY)?;
        let mut entry = Mapping::new();
        entry.insert(Value::from(ROLE_KEY), Value::from(role));
        entry.insert(Value::from(CONTENT_KEY), Value::from(content));
        messages.push(Value::Mapping(entry));
        Ok(messages.len() - 1)
    }

    pub fn set_message_role(&mut self, index: usize, role: &str) -> Result<(), DocumentError> {
        let entry = self.message_map_mut(index)?;
        entry.insert(Value::from(ROLE_KEY), Value::from(role));
        Ok(())
    }

    pub fn append_message_content(
        &mut self,
        index: usize,
        delta: &str,
    ) -> Result<(), DocumentError> {
        let entry = self.message_map_mut(index)?;
        match entry.get_mut(CONTENT_KEY) {
            Some(Value::String(content)) => content.push_str(delta),
            Some(Value::Null) | None => {
                entry.insert(Value::from(CONTENT_KEY), Value::from(delta));
            }
            Some(_) => {
                return Err(DocumentError::MessageShape {
                    index,
                    field: CONTENT_KEY,
                })
            }
        }
        Ok(())
    }

    fn sequence_mut(&mut self, key: &str) -> Result<&mut Sequence, DocumentError> {
        let slot = self
            .root
            .entry(Value::from(key))
            .or_insert_with(|| Value::Sequence(Sequence::new()));
        if slot.is_null() {
            *slot = Value::Sequence(Sequence::new());
        }
        match slot {
            Value::Sequence(sequence) => Ok(sequence),
            other => Err(DocumentError::WrongKind {
                key: key.to_owned(),
                expected: "sequence",
                found: kind_name(other),
            }),
        }
    }

    fn message_map_mut(&mut self, index: usize) -> Result<&mut Mapping, DocumentError> {
        let Some(Value::Sequence(messages)) = self.root.get_mut(MESSAGES_KEY) else {
            return Err(DocumentError::MissingMessage { index });
        };
        match messages.get_mut(index) {
            Some(Value::Mapping(entry)) => Ok(entry),
            Some(_) => Err(DocumentError::MessageShape {
                index,
                field: ROLE_KEY,
            }),
            None => Err(DocumentError::MissingMessage { index }),
        }
    }
}

fn message_field<'a>(
    entry: &'a Value,
    index: usize,
    field: &'static str,
) -> Result<&'a str, DocumentError> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .ok_or(DocumentError::MessageShape { index, field })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_yaml::{Mapping, Value};

    use super::{Document, Message};
    use crate::error::DocumentError;

    #[test]
    fn blank_and_null_input_parse_as_empty_document() {
        assert!(Document::parse(b"").expect("blank parses").is_empty());
        assert!(Document::parse(b"  \n").expect("whitespace parses").is_empty());
        assert!(Document::parse(b"~\n").expect("null parses").is_empty());
    }

    #[test]
    fn non_map_root_is_rejected() {
        let error = Document::parse(b"- a\n- b\n").expect_err("sequence root must fail");
        assert!(matches!(
            error,
            DocumentError::NotAMap {
                found: "sequence"
            }
        ));
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let error = Document::parse(b"model: [unterminated\n").expect_err("bad yaml must fail");
        assert!(matches!(error, DocumentError::Yaml(_)));
    }

    #[test]
    fn serialization_is_stable_under_reparse() {
        let mut document = Document::new();
        document.set("model", "gpt-4");
        document.set("temperature", 0.5);
        document
            .push_message("user", "line one\nline two: {braces}")
            .expect("push");
        document.push_message("assistant", "").expect("push");

        let first = document.to_yaml().expect("serialize");
        let reparsed = Document::parse(first.as_bytes()).expect("reparse");
        assert_eq!(reparsed, document);
        assert_eq!(reparsed.to_yaml().expect("serialize again"), first);
    }

    #[test]
    fn set_keeps_existing_key_position() {
        let mut document = Document::parse(b"model: a\nn: 1\n").expect("parse");
        document.set("model", "b");
        assert_eq!(document.to_yaml().expect("serialize"), "model: b\nn: 1\n");
    }

    #[test]
    fn message_accessors_round_trip_role_and_content() {
        let mut document = Document::new();
        let index = document.push_message("", "").expect("push");
        document.set_message_role(index, "assistant").expect("role");
        document.append_message_content(index, "Hi").expect("append");
        document.append_message_content(index, "!").expect("append");

        assert_eq!(document.message_count(), 1);
        assert_eq!(
            document.messages().expect("messages"),
            vec![Message::new("assistant", "Hi!")]
        );
    }

    #[test]
    fn message_lookup_reports_missing_fields() {
        let document = Document::parse(b"messages:\n- role: user\n").expect("parse");
        assert!(matches!(
            document.message(0),
            Err(DocumentError::MessageShape {
                index: 0,
                field: "content"
            })
        ));
        assert!(matches!(
            document.message(3),
            Err(DocumentError::MissingMessage { index: 3 })
        ));
    }

    #[test]
    fn get_u64_accepts_numbers_and_numeric_strings() {
        let document = Document::parse(b"n: 3\nm: '4'\nx: abc\n").expect("parse");
        assert_eq!(document.get_u64("n").expect("n"), Some(3));
        assert_eq!(document.get_u64("m").expect("m"), Some(4));
        assert_eq!(document.get_u64("missing").expect("missing"), None);
        assert!(document.get_u64("x").is_err());
    }

    #[test]
    fn append_to_sequence_creates_and_extends() {
        let mut document = Document::new();
        document.append_to_sequence("stop", "END").expect("append");
        document.append_to_sequence("stop", "STOP").expect("append");
        assert_eq!(
            document.to_yaml().expect("serialize"),
            "stop:\n- END\n- STOP\n"
        );

        document.set("model", "gpt");
        assert!(matches!(
            document.append_to_sequence("model", "x"),
            Err(DocumentError::WrongKind { .. })
        ));
    }

    #[test]
    fn merge_map_overrides_existing_entries() {
        let mut document = Document::parse(b"logit_bias:\n  '50256': -100\n").expect("parse");
        let mut entries = Mapping::new();
        entries.insert(Value::from("50256"), Value::from(5));
        entries.insert(Value::from("42"), Value::from(1));
        document.merge_map("logit_bias", entries).expect("merge");

        assert_eq!(
            document.to_json().expect("json"),
            r#"{"logit_bias":{"50256":5,"42":1}}"#
        );
    }

    #[test]
    fn json_conversion_keeps_key_order_and_types() {
        let mut document = Document::new();
        document.set("model", "gpt-4");
        document.set("stream", true);
        document.push_message("user", "hello").expect("push");
        assert_eq!(
            document.to_json().expect("json"),
            r#"{"model":"gpt-4","stream":true,"messages":[{"role":"user","content":"hello"}]}"#
        );
    }
}
