//! Conversation history storage.
//!
//! An append-only, ordered log of utterances. It is the single source of
//! truth sent to the generation provider on every turn; the provider keeps
//! no memory of its own.

use serde::{Deserialize, Serialize};

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The person talking to the assistant.
    User,
    /// The language model.
    Assistant,
}

impl Speaker {
    /// Chat-completions role name.
    #[must_use]
    pub fn as_role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Who said it.
    #[serde(rename = "role")]
    pub speaker: Speaker,
    /// What was said.
    #[serde(rename = "content")]
    pub text: String,
}

impl Utterance {
    /// A user utterance.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    /// An assistant utterance.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered conversation log.
///
/// Alternation between speakers is not enforced: after a cancelled
/// generation two user utterances may follow each other.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    utterances: Vec<Utterance>,
}

impl ConversationHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an utterance at the end of the conversation.
    pub fn append(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
    }

    /// Copy of the conversation in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Utterance> {
        self.utterances.clone()
    }

    /// Borrow the conversation in order.
    #[must_use]
    pub fn as_slice(&self) -> &[Utterance] {
        &self.utterances
    }

    /// Drop every utterance.
    pub fn clear(&mut self) {
        self.utterances.clear();
    }

    /// Most recent utterance, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Utterance> {
        self.utterances.last()
    }

    /// Number of utterances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    /// Whether the conversation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }
}
