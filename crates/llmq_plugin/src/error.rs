use thiserror::Error;

/// Structural failure while reading or mutating a [`crate::Document`].
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("context is not valid UTF-8: {0}")]
    NotUtf8(#[source] std::str::Utf8Error),

    #[error("context is not valid YAML: {0}")]
    Yaml(#[source] serde_yaml::Error),

    #[error("context root must be a map, found {found}")]
    NotAMap { found: &'static str },

    #[error("context key '{key}' must be a {expected}, found {found}")]
    WrongKind {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("message {index} does not exist")]
    MissingMessage { index: usize },

    #[error("message {index} must be a map with string field '{field}'")]
    MessageShape { index: usize, field: &'static str },

    #[error("context cannot be converted to JSON: {0}")]
    Json(#[source] serde_json::Error),
}

/// Error returned from any plugin capability call.
///
/// Reply-protocol variants (`InvalidFrame`, `MissingRole`, `RoleConflict`)
/// are eligible for the session-level whole-request retry; everything else is
/// fatal to the invocation.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{name}' is registered twice")]
    DuplicatePlugin { name: String },

    #[error("Unsupported plugin '{name}'. Available plugins: {available}")]
    UnknownPlugin { name: String, available: String },

    #[error("invalid value for --{option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("could not parse authentication data: {0}")]
    InvalidAuth(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("invalid response: {reason}: {frame}")]
    InvalidFrame { frame: String, reason: String },

    #[error("never received role for choice {index}; last received: {frame}")]
    MissingRole { index: usize, frame: String },

    #[error("invalid response: choice {index} changed role from '{current}' to '{received}'")]
    RoleConflict {
        index: usize,
        current: String,
        received: String,
    },

    #[error("invalid response: expected at least {expected} messages, found {found}")]
    IncompleteResponse { expected: usize, found: usize },

    #[error("invalid role for message {index}: expected \"{expected}\", received \"{found}\"")]
    UnexpectedRole {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("failed to write reply output: {0}")]
    Output(#[from] std::io::Error),
}

impl PluginError {
    #[must_use]
    pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_frame(frame: &[u8], reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            frame: String::from_utf8_lossy(frame).into_owned(),
            reason: reason.into(),
        }
    }

    /// Returns true for reply-protocol failures raised while folding a stream.
    #[must_use]
    pub fn is_reply_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrame { .. } | Self::MissingRole { .. } | Self::RoleConflict { .. }
        )
    }
}
