//! Language model generation.
//!
//! A [`Generator`] receives the whole conversation on every call and keeps
//! no memory of its own. The default backend is any OpenAI-compatible chat
//! completions API, Groq by default.

pub mod api;

pub use api::ApiGenerator;

use crate::error::Result;
use crate::history::Utterance;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Sampling temperature sent with every request.
pub const TEMPERATURE: f32 = 0.7;

/// Upper bound on reply length, in tokens.
pub const MAX_TOKENS: u32 = 1024;

/// Result of a generation request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// The assistant's next utterance.
    Reply(String),
    /// The request was abandoned because its token was cancelled.
    Cancelled,
}

/// Produces the assistant's next utterance.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Generate a reply to `history`, whose last entry is the user's utterance.
    ///
    /// Returns [`Generation::Cancelled`] promptly once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Llm`](crate::SpeechError::Llm) on transport
    /// failure or a non-success response.
    async fn generate(&self, history: &[Utterance], cancel: &CancellationToken) -> Result<Generation>;
}

/// Remove `<think>...</think>` blocks emitted by reasoning models.
///
/// An unterminated block hides everything after its opening tag.
pub(crate) fn strip_think_blocks(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut visible = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        visible.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        match after.find(CLOSE) {
            Some(end) => rest = &after[end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    visible.push_str(rest);
    visible.trim().to_owned()
}
