//! OpenAI Chat Completions plugin for llmq.
//!
//! The context file is a 1:1 match with the request body sent to the
//! endpoint; streamed choices are folded back into its `messages` sequence.

use std::io::Write;

use chat_completions::{
    build_headers, choice_summary, normalize_chat_url, ChatConfig, ReplyIntegrator,
};
use llmq_plugin::{Document, Plugin, PluginArg, PluginError, PluginSession};
use tracing::debug;

mod options;

pub use options::{apply_args, command, MSGS_ID};

/// Plugin name used on the command line.
pub const GPT_PLUGIN_NAME: &str = "gpt";

const DESCRIPTION: &str = "an llmq plugin for the OpenAI Chat Completions endpoint.";

#[derive(Debug, Default, Clone, Copy)]
pub struct GptPlugin;

impl Plugin for GptPlugin {
    fn name(&self) -> &'static str {
        GPT_PLUGIN_NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn command(&self) -> clap::Command {
        options::command()
    }

    fn start(
        &self,
        mut context: Document,
        args: &[PluginArg],
        auth: &str,
    ) -> Result<Box<dyn PluginSession>, PluginError> {
        let config = ChatConfig::from_auth(auth)?;
        apply_args(&mut context, args)?;
        debug!(
            base_url = %config.base_url,
            args = args.len(),
            messages = context.message_count(),
            "gpt session started"
        );
        Ok(Box::new(GptSession::new(config, context)))
    }
}

/// One gpt request/reply cycle over a conversation context.
#[derive(Debug)]
pub struct GptSession {
    config: ChatConfig,
    context: Document,
    reply: ReplyIntegrator,
}

impl GptSession {
    #[must_use]
    pub fn new(config: ChatConfig, context: Document) -> Self {
        Self {
            config,
            context,
            reply: ReplyIntegrator::new(),
        }
    }

    /// Number of candidates the context asks for, when set.
    fn choices(&self) -> Result<Option<u64>, PluginError> {
        Ok(self.context.get_u64("n")?)
    }

    fn single_choice(&self) -> Result<bool, PluginError> {
        Ok(matches!(self.choices()?, None | Some(1)))
    }
}

impl PluginSession for GptSession {
    fn context(&self) -> &Document {
        &self.context
    }

    fn url(&self) -> Result<String, PluginError> {
        Ok(normalize_chat_url(&self.config.base_url))
    }

    fn headers(&self) -> Result<Vec<(String, String)>, PluginError> {
        build_headers(&self.config)
    }

    fn post(&self) -> Result<Option<String>, PluginError> {
        Ok(Some(self.context.to_json()?))
    }

    fn on_reply(
        &mut self,
        chunk: &[u8],
        out: &mut dyn Write,
        print: bool,
    ) -> Result<bool, PluginError> {
        let echo = print && self.single_choice()?;
        self.reply.on_chunk(&mut self.context, chunk, out, echo)
    }

    fn on_finish(&mut self, out: &mut dyn Write, print: bool) -> Result<(), PluginError> {
        self.reply.on_finish();
        if !print {
            return Ok(());
        }

        match self.choices()? {
            None | Some(1) => out.write_all(b"\n")?,
            Some(n) => {
                let count = usize::try_from(n).unwrap_or(usize::MAX);
                let summary = choice_summary(&self.context, count)?;
                writeln!(out, "{summary}")?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn restore(&mut self, context: Document) {
        self.context = context;
        self.reply.reset();
    }
}
