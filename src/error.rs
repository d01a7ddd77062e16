//! Error types for the conversation engine.

/// Top-level error type for the conversation engine.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Missing or invalid configuration (e.g. a required credential).
    ///
    /// Fatal to starting a turn; fixed by reconfiguring, never by retrying.
    #[error("config error: {0}")]
    Config(String),

    /// Recognizer or transcription-service fault.
    #[error("STT error: {0}")]
    Stt(String),

    /// Capture finished without any recognizable speech.
    #[error("no speech detected")]
    EmptyInput,

    /// Generation provider or transport fault.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Generation was abandoned at the user's request.
    #[error("generation cancelled")]
    Cancelled,

    /// Every synthesis provider failed for the current text.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device, recorder or player error.
    #[error("audio error: {0}")]
    Audio(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl SpeechError {
    /// Whether this error represents an actual failure.
    ///
    /// Empty input and user cancellation are informational outcomes and are
    /// not logged as errors.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::EmptyInput | Self::Cancelled)
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
