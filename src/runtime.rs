//! Runtime events emitted by the coordinator for UI and observability.
//!
//! Payloads are small and cloneable so the coordinator can broadcast them
//! without waiting on slow subscribers.

use crate::history::Utterance;
use crate::pipeline::messages::{Status, TurnState};

/// Events that describe what the conversation is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The turn state changed.
    StateChanged(TurnState),
    /// The user-visible status line changed.
    Status(Status),
    /// Current transcription hypothesis, or the final transcript.
    Transcript {
        /// Recognized text so far.
        text: String,
        /// Whether the capture has been finalized.
        is_final: bool,
    },
    /// An utterance was added to the conversation history.
    UtteranceAppended(Utterance),
    /// The conversation history was cleared.
    HistoryCleared,
    /// Audible output started.
    PlaybackStarted {
        /// Name of the synthesis provider that is speaking.
        provider: String,
    },
    /// Continuous listening was switched on or off.
    ContinuousChanged(bool),
}
