//! Message types passed between the coordinator, its callers and provider tasks.

use crate::audio::PlaybackOutcome;
use crate::llm::Generation;
use crate::stt::TranscriptEvent;
use std::fmt;

/// Which phase of a turn the conversation is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Waiting for the user.
    #[default]
    Idle,
    /// Capturing and transcribing speech.
    Listening,
    /// Waiting for the language model.
    Thinking,
    /// Speaking the reply.
    Speaking,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// User-initiated actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start capturing speech.
    StartCapture,
    /// Stop capturing and transcribe what was heard.
    FinishCapture,
    /// Stop capturing and discard the audio.
    CancelCapture,
    /// Send typed text as the user's utterance.
    Submit(String),
    /// Abandon the in-flight generation.
    StopGeneration,
    /// Silence the reply being spoken.
    StopSpeaking,
    /// Speak the last reply again.
    Replay,
    /// Stop any in-flight work and forget the conversation.
    Clear,
    /// Switch continuous listening on or off.
    SetContinuous(bool),
    /// Stop the coordinator once the current turn has ended.
    Close,
    /// Stop the coordinator.
    Shutdown,
}

/// User-visible status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Ready for a new turn.
    Ready {
        /// Whether the premium remote voice is configured.
        premium_voice: bool,
    },
    /// No generation credential is configured.
    MissingGenerator,
    /// Capturing speech.
    Listening,
    /// Turning captured speech into text.
    Processing,
    /// Waiting for the language model.
    Thinking,
    /// Speaking the reply.
    Speaking,
    /// Capture ended without recognizable speech.
    NoSpeech,
    /// The transcription service failed.
    TranscriptionError,
    /// The recognizer reported an error code.
    RecognizerError(String),
    /// The language model request failed.
    GenerationError,
    /// The user stopped generation. Reverts to ready after a short delay.
    GenerationStopped,
    /// No transcription strategy is available.
    RecognitionUnavailable,
    /// Capture could not be started.
    MicrophoneError,
    /// No synthesis provider could speak the reply.
    SpeakingError,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready {
                premium_voice: false,
            } => f.write_str("Ready (GROQ)"),
            Self::Ready {
                premium_voice: true,
            } => f.write_str("Ready (GROQ + MURF Voice)"),
            Self::MissingGenerator => f.write_str("Groq API key not configured"),
            Self::Listening => f.write_str("Listening..."),
            Self::Processing => f.write_str("Processing..."),
            Self::Thinking => f.write_str("Thinking..."),
            Self::Speaking => f.write_str("Speaking..."),
            Self::NoSpeech => f.write_str("No speech detected"),
            Self::TranscriptionError => f.write_str("Transcription error"),
            Self::RecognizerError(code) => write!(f, "Error: {code}"),
            Self::GenerationError => f.write_str("Error getting AI response"),
            Self::GenerationStopped => f.write_str("Generation stopped"),
            Self::RecognitionUnavailable => f.write_str("Speech recognition not available"),
            Self::MicrophoneError => f.write_str("Error starting microphone"),
            Self::SpeakingError => f.write_str("Error speaking response"),
        }
    }
}

/// Everything the turn machine reacts to.
///
/// Provider completions carry the id of the capture, generation request or
/// playback they belong to; the machine drops any whose id is no longer the
/// active one.
#[derive(Debug)]
pub enum TurnEvent {
    /// A user action.
    Command(Command),
    /// Output from a capture session.
    Transcript {
        /// Capture id.
        capture: u64,
        /// What the recognizer reported.
        event: TranscriptEvent,
    },
    /// The capture session could not be started.
    CaptureStartFailed {
        /// Capture id.
        capture: u64,
        /// Why.
        error: String,
    },
    /// A generation request ended.
    GenerationFinished {
        /// Generation request id.
        request: u64,
        /// Reply, cancellation, or failure.
        result: crate::Result<Generation>,
    },
    /// A synthesis provider started audible output.
    SynthesisStarted {
        /// Playback id.
        playback: u64,
        /// Provider name.
        provider: String,
    },
    /// Every synthesis provider failed.
    SynthesisFailed {
        /// Playback id.
        playback: u64,
        /// Last provider error.
        error: String,
    },
    /// Audible output ended.
    PlaybackFinished {
        /// Playback id.
        playback: u64,
        /// How it ended.
        outcome: PlaybackOutcome,
    },
    /// The settle delay before re-arming capture elapsed.
    RearmDue {
        /// Re-arm epoch the timer was scheduled under.
        epoch: u64,
    },
    /// A transient status reached the end of its display time.
    StatusResetDue {
        /// Status epoch the timer was scheduled under.
        epoch: u64,
    },
}
