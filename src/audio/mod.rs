//! Audio capture and playback collaborators.
//!
//! The conversation engine never touches devices directly. It records
//! through an [`AudioRecorder`] and plays through an [`AudioPlayer`]; the
//! default implementations shell out to `arecord`/`ffplay`, and the
//! `native-audio` feature adds `cpal` implementations.

pub mod command;
pub mod handle;

#[cfg(feature = "native-audio")]
pub mod capture;
#[cfg(feature = "native-audio")]
pub mod playback;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use command::{CommandPlayer, CommandRecorder};
pub use handle::{PlaybackHandle, PlaybackOutcome};

/// An encoded audio clip.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    /// Encoded audio (WAV unless the recorder says otherwise).
    pub bytes: Bytes,
}

impl RecordedClip {
    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Source of microphone recordings.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Start recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the microphone cannot be opened.
    async fn start(&self) -> Result<Box<dyn Recording>>;
}

/// A recording in progress.
#[async_trait]
pub trait Recording: Send {
    /// Stop recording and return everything captured so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder failed while running.
    async fn finish(self: Box<Self>) -> Result<RecordedClip>;

    /// Stop recording and discard the audio.
    async fn abort(self: Box<Self>);
}

/// Sink for synthesized speech.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Start playing an encoded clip.
    ///
    /// Returns once output has started; the handle completes when the clip
    /// ends or is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot start.
    async fn play(&self, audio: Bytes) -> Result<PlaybackHandle>;
}
