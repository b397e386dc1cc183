use serde::Deserialize;

/// One streamed (or complete) Chat Completions response object.
///
/// Only the fields the reply integrator folds are modelled; everything else
/// (`id`, `usage`, `model`, ...) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionFrame {
    pub choices: Vec<ChoiceUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChoiceUpdate {
    pub index: usize,
    /// Present on non-streamed responses.
    pub message: Option<ChoiceMessage>,
    /// Present on streamed responses.
    pub delta: Option<ChoiceDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ChoiceDelta {
    pub role: Option<String>,
    pub content: Option<String>,
}

/// A choice update reduced to what a Choice Slot consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotUpdate {
    pub index: usize,
    pub role: Option<String>,
    pub content: String,
}

impl ChoiceUpdate {
    /// Collapses `message`/`delta` into one slot update. A full message takes
    /// precedence over a delta.
    pub fn into_slot_update(self) -> Result<SlotUpdate, &'static str> {
        let index = self.index;
        if let Some(message) = self.message {
            return Ok(SlotUpdate {
                index,
                role: Some(message.role),
                content: message.content.unwrap_or_default(),
            });
        }
        let Some(delta) = self.delta else {
            return Err("choice carries neither a message nor a delta");
        };
        Ok(SlotUpdate {
            index,
            role: delta.role,
            content: delta.content.unwrap_or_default(),
        })
    }
}
