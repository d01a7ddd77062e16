//! Speech-to-text.
//!
//! Two interchangeable strategies share one contract: a capture session
//! emits zero or more [`TranscriptEvent::Interim`] hypotheses followed by
//! exactly one terminal event.
//!
//! - [`CommandRecognizer`]: a local recognizer process streaming hypotheses.
//! - [`DeepgramTranscriber`]: records a clip and uploads it for batch
//!   transcription when the session is finished.

pub mod deepgram;
pub mod recognizer;

pub use deepgram::DeepgramTranscriber;
pub use recognizer::CommandRecognizer;

use crate::audio::AudioRecorder;
use crate::config::{SttBackend, SttConfig};
use crate::credentials::LoadedCredentials;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Output of a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Current best hypothesis; may still change.
    Interim(String),
    /// Final transcript. Terminal.
    Final(String),
    /// Capture ended without recognizable speech. Terminal.
    Empty,
    /// The local recognizer failed with an error code. Terminal.
    RecognizerError(String),
    /// Recording, upload or the transcription service failed. Terminal.
    ServiceError(String),
}

impl TranscriptEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Interim(_))
    }
}

/// Controls for a capture session, cloneable so they can be kept apart
/// from the event stream.
#[derive(Debug, Clone, Default)]
pub struct CaptureControl {
    finish: CancellationToken,
    abort: CancellationToken,
}

impl CaptureControl {
    /// Stop listening and produce the final transcript.
    pub fn finish(&self) {
        self.finish.cancel();
    }

    /// Stop listening and discard everything.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Resolves when [`finish`](Self::finish) is called.
    pub async fn finish_requested(&self) {
        self.finish.cancelled().await;
    }

    /// Resolves when [`abort`](Self::abort) is called.
    pub async fn abort_requested(&self) {
        self.abort.cancelled().await;
    }

    /// Whether the session was aborted.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// A running capture.
#[derive(Debug)]
pub struct CaptureSession {
    events: mpsc::Receiver<TranscriptEvent>,
    control: CaptureControl,
}

impl CaptureSession {
    /// Create a session plus the sender and controls its producer task uses.
    pub fn channel() -> (Self, mpsc::Sender<TranscriptEvent>, CaptureControl) {
        let (tx, rx) = mpsc::channel(32);
        let control = CaptureControl::default();
        let session = Self {
            events: rx,
            control: control.clone(),
        };
        (session, tx, control)
    }

    /// Next event, or `None` once the producer is gone.
    pub async fn next_event(&mut self) -> Option<TranscriptEvent> {
        self.events.recv().await
    }

    /// Controls for this session.
    pub fn control(&self) -> CaptureControl {
        self.control.clone()
    }

    /// Stop listening and produce the final transcript.
    pub fn finish(&self) {
        self.control.finish();
    }

    /// Stop listening and discard everything.
    pub fn abort(&self) {
        self.control.abort();
    }
}

/// A transcription strategy.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &str;

    /// Begin capturing.
    ///
    /// # Errors
    ///
    /// Returns an error if capture cannot be started.
    async fn start(&self) -> Result<CaptureSession>;
}

/// Pick the transcription strategy once, by capability detection.
///
/// `Auto` prefers the local recognizer when its program is installed and
/// otherwise uses remote transcription when a key and a recorder exist.
pub fn select_transcriber(
    config: &SttConfig,
    credentials: &LoadedCredentials,
    recorder: Option<Arc<dyn AudioRecorder>>,
) -> Option<Arc<dyn Transcriber>> {
    let local = || -> Option<Arc<dyn Transcriber>> {
        let recognizer = CommandRecognizer::detect(&config.recognizer_command, &config.language)?;
        Some(Arc::new(recognizer))
    };
    let remote = |recorder: Option<Arc<dyn AudioRecorder>>| -> Option<Arc<dyn Transcriber>> {
        if !credentials.has_stt() {
            return None;
        }
        let recorder = recorder?;
        match DeepgramTranscriber::new(config, &credentials.stt_api_key, recorder) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                warn!(error = %e, "remote transcription unavailable");
                None
            }
        }
    };

    let selected = match config.backend {
        SttBackend::Local => local(),
        SttBackend::Remote => remote(recorder),
        SttBackend::Auto => local().or_else(|| remote(recorder)),
    };
    match &selected {
        Some(t) => info!(strategy = t.name(), "transcription strategy selected"),
        None => warn!(backend = ?config.backend, "no transcription strategy available"),
    }
    selected
}
