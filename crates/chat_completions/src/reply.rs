use std::io::Write;

use llmq_plugin::{Document, PluginError};
use tracing::{debug, trace};

use crate::events::{CompletionFrame, SlotUpdate};
use crate::frame::extract_frame;

/// Role every multi-choice summary entry must carry.
pub const ASSISTANT_ROLE: &str = "assistant";

/// Choice slots allowed when the context does not set `n`.
pub const DEFAULT_CHOICE_LIMIT: usize = 16;

/// Upper bound on choice slots even when `n` asks for more.
pub const MAX_CHOICE_LIMIT: usize = 128;

/// Lifecycle of one streamed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyState {
    #[default]
    Idle,
    /// Bytes are buffered but no complete frame has been seen yet.
    Accumulating,
    /// A frame was extracted and is being applied.
    FrameReady,
    Done,
}

/// Folds an arbitrarily chunked response stream into a [`Document`].
///
/// Each Choice Slot is backed by one message appended to the document's
/// `messages` sequence, so every commit of the document persists the partial
/// reply. Slots are created lazily up to the highest choice index seen.
#[derive(Debug, Default)]
pub struct ReplyIntegrator {
    pending: Vec<u8>,
    slots: Vec<usize>,
    state: ReplyState,
    frames: usize,
}

impl ReplyIntegrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ReplyState {
        self.state
    }

    /// Bytes received but not yet resolved into a frame.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames applied so far.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Message index backing choice slot `index`.
    #[must_use]
    pub fn slot_message(&self, index: usize) -> Option<usize> {
        self.slots.get(index).copied()
    }

    /// Buffers `chunk`, then applies every complete frame now available.
    /// Content is written to `out` when `echo` is set.
    ///
    /// A failing frame leaves the document untouched by that frame.
    pub fn on_chunk(
        &mut self,
        document: &mut Document,
        chunk: &[u8],
        out: &mut dyn Write,
        echo: bool,
    ) -> Result<bool, PluginError> {
        self.state = ReplyState::Accumulating;
        self.pending.extend_from_slice(chunk);

        while let Some(range) = extract_frame(&self.pending) {
            self.state = ReplyState::FrameReady;
            let frame: Vec<u8> = self.pending.drain(..range.end).skip(range.start).collect();
            self.apply_frame(document, &frame, out, echo)?;
            self.frames += 1;
            self.state = ReplyState::Accumulating;
        }

        Ok(true)
    }

    pub fn on_finish(&mut self) {
        if !self.pending.iter().all(u8::is_ascii_whitespace) {
            trace!(
                residual = %String::from_utf8_lossy(&self.pending),
                "discarding non-frame tail of reply stream"
            );
        }
        debug!(frames = self.frames, slots = self.slots.len(), "reply stream finished");
        self.pending.clear();
        self.state = ReplyState::Done;
    }

    /// Drops buffered bytes and slot bindings so a new request can start.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply_frame(
        &mut self,
        document: &mut Document,
        frame: &[u8],
        out: &mut dyn Write,
        echo: bool,
    ) -> Result<(), PluginError> {
        let parsed = serde_json::from_slice::<CompletionFrame>(frame)
            .map_err(|error| PluginError::invalid_frame(frame, error.to_string()))?;
        if parsed.choices.is_empty() {
            return Err(PluginError::invalid_frame(frame, "empty choices"));
        }

        let limit = choice_limit(document)?;
        let mut updates: Vec<SlotUpdate> = Vec::with_capacity(parsed.choices.len());
        for choice in parsed.choices {
            let update = choice
                .into_slot_update()
                .map_err(|reason| PluginError::invalid_frame(frame, reason))?;
            if update.index >= limit {
                return Err(PluginError::invalid_frame(
                    frame,
                    format!("choice index {} exceeds limit of {limit} choices", update.index),
                ));
            }
            let current = self.current_role(document, &updates, update.index)?;
            match (&update.role, current) {
                (None, None) => {
                    return Err(PluginError::MissingRole {
                        index: update.index,
                        frame: String::from_utf8_lossy(frame).into_owned(),
                    })
                }
                (Some(received), Some(current)) if *received != current => {
                    return Err(PluginError::RoleConflict {
                        index: update.index,
                        current,
                        received: received.clone(),
                    })
                }
                _ => {}
            }
            updates.push(update);
        }

        for update in updates {
            let message = self.ensure_slot(document, update.index)?;
            if let Some(role) = &update.role {
                document.set_message_role(message, role)?;
            }
            if !update.content.is_empty() {
                document.append_message_content(message, &update.content)?;
                if echo {
                    out.write_all(update.content.as_bytes())?;
                    out.flush()?;
                }
            }
        }

        Ok(())
    }

    /// Role of a slot as it will be once the already-validated `staged`
    /// updates apply. Empty roles count as unset.
    fn current_role(
        &self,
        document: &Document,
        staged: &[SlotUpdate],
        index: usize,
    ) -> Result<Option<String>, PluginError> {
        if let Some(role) = staged
            .iter()
            .rev()
            .filter(|update| update.index == index)
            .find_map(|update| update.role.clone())
        {
            return Ok(Some(role));
        }
        let Some(&message) = self.slots.get(index) else {
            return Ok(None);
        };
        let role = document.message(message)?.role;
        Ok((!role.is_empty()).then_some(role))
    }

    fn ensure_slot(&mut self, document: &mut Document, index: usize) -> Result<usize, PluginError> {
        while self.slots.len() <= index {
            let message = document.push_message("", "")?;
            self.slots.push(message);
        }
        Ok(self.slots[index])
    }
}

/// Number of choice slots a reply may open: the context's `n`, capped.
fn choice_limit(document: &Document) -> Result<usize, PluginError> {
    Ok(match document.get_u64("n")? {
        Some(n) => usize::try_from(n).map_or(MAX_CHOICE_LIMIT, |n| n.min(MAX_CHOICE_LIMIT)),
        None => DEFAULT_CHOICE_LIMIT,
    })
}

/// JSON array of the contents of the last `count` messages, all of which
/// must be assistant replies.
pub fn choice_summary(document: &Document, count: usize) -> Result<String, PluginError> {
    let found = document.message_count();
    if found < count {
        return Err(PluginError::IncompleteResponse {
            expected: count,
            found,
        });
    }

    let mut contents = Vec::with_capacity(count);
    for index in found - count..found {
        let message = document.message(index)?;
        if message.role != ASSISTANT_ROLE {
            return Err(PluginError::UnexpectedRole {
                index,
                expected: ASSISTANT_ROLE,
                found: message.role,
            });
        }
        contents.push(message.content);
    }

    serde_json::to_string(&contents)
        .map_err(|error| PluginError::Document(llmq_plugin::DocumentError::Json(error)))
}
