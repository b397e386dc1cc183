//! OpenAI Chat Completions wire handling for llmq plugins.
//!
//! This crate owns frame extraction from a chunked response body, folding of
//! `choices` updates into a conversation [`llmq_plugin::Document`], request
//! header construction and endpoint normalization. It performs no network I/O.

pub mod config;
pub mod events;
pub mod frame;
pub mod headers;
pub mod reply;
pub mod url;

pub use config::ChatConfig;
pub use events::{ChoiceUpdate, CompletionFrame, SlotUpdate};
pub use frame::extract_frame;
pub use headers::build_headers;
pub use reply::{
    choice_summary, ReplyIntegrator, ReplyState, ASSISTANT_ROLE, DEFAULT_CHOICE_LIMIT,
    MAX_CHOICE_LIMIT,
};
pub use url::{normalize_chat_url, DEFAULT_BASE_URL};
