//! On-disk conversation contexts for llmq.
//!
//! A [`ContextStore`] holds an exclusive advisory lock on one context file for
//! its whole lifetime and persists a [`llmq_plugin::Document`] with minimal
//! positional diff-writes. The [`locator`] module finds and signals whichever
//! llmq process currently holds a context.

mod diff;
mod error;
mod lock;
pub mod locator;
mod owner;
mod paths;
mod store;

pub use diff::{diff_spans, write_diff, CommitStats, SpanSink};
pub use error::{LocateError, StoreError};
pub use lock::ExclusiveFile;
pub use locator::{default_locator, Locator, OwnerRecordLocator, ProcScanner, SigTerm, Signaller};
pub use owner::{read_owner, OwnerRecord};
pub use paths::{context_path, owner_record_path, CONTEXT_EXTENSION, OWNER_RECORD_SUFFIX};
pub use store::{read_document, ContextStore, StoreOptions};
