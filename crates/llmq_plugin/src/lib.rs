//! Plugin contract shared by the llmq executable and every remote-service
//! plugin.
//!
//! A [`Plugin`] is a stateless descriptor (name, option grammar, directory
//! overrides). Calling [`Plugin::start`] yields a [`PluginSession`] that owns
//! the conversation [`Document`] for one invocation and folds the streamed
//! reply back into it. This crate carries no transport code.

use std::io::Write;
use std::path::PathBuf;

mod args;
mod document;
mod error;
mod registry;

pub use args::{collect_args, PluginArg};
pub use document::{Document, Message, CONTENT_KEY, MESSAGES_KEY, ROLE_KEY};
pub use error::{DocumentError, PluginError};
pub use registry::PluginRegistry;

/// Static description of one supported remote service.
pub trait Plugin: Send + Sync + 'static {
    /// Name used on the command line (`PLUGIN://CONTEXT`).
    fn name(&self) -> &'static str;

    /// Short one-line description used by `llmq list`.
    fn description(&self) -> &'static str;

    /// OPTIONS and MSGS grammar. Its rendered help is the plugin help text.
    fn command(&self) -> clap::Command;

    /// Overrides the configuration directory holding the auth file.
    fn config_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Overrides the directory holding context files.
    fn data_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Applies parsed arguments and auth data to `context` and returns the
    /// session that will drive one request.
    fn start(
        &self,
        context: Document,
        args: &[PluginArg],
        auth: &str,
    ) -> Result<Box<dyn PluginSession>, PluginError>;
}

/// Per-invocation plugin state.
pub trait PluginSession {
    /// Current context, including any partially folded reply.
    fn context(&self) -> &Document;

    /// Endpoint URL.
    fn url(&self) -> Result<String, PluginError>;

    /// Request headers as `(name, value)` pairs.
    fn headers(&self) -> Result<Vec<(String, String)>, PluginError>;

    /// Request body. `None` makes the transport issue a GET.
    fn post(&self) -> Result<Option<String>, PluginError> {
        Ok(None)
    }

    /// Folds one transport chunk into the context, echoing text to `out` when
    /// `print` is set. Returns `false` to stop the transfer early.
    fn on_reply(
        &mut self,
        chunk: &[u8],
        out: &mut dyn Write,
        print: bool,
    ) -> Result<bool, PluginError>;

    /// Called once after the transport reports end of stream.
    fn on_finish(&mut self, out: &mut dyn Write, print: bool) -> Result<(), PluginError> {
        if print {
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Ok(())
    }

    /// Replaces the context and discards reply state so the request can be
    /// issued again.
    fn restore(&mut self, context: Document);
}
