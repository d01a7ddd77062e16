//! Text-to-speech.
//!
//! Every provider speaks a complete reply per request and hands back a
//! [`PlaybackHandle`]. Providers are tried in order by [`SynthesisChain`]:
//! the Murf voice when its key is configured, then the local synthesizer.

pub mod fallback;
pub mod local;
pub mod murf;

pub use fallback::SynthesisChain;
pub use local::LocalSynthesizer;
pub use murf::MurfSynthesizer;

use crate::audio::PlaybackHandle;
use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One speech synthesis provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Short provider name for logs and UI.
    fn name(&self) -> &str;

    /// Synthesize `text` and start playing it.
    ///
    /// Succeeds once audible output has started. Returns
    /// [`SpeechError::Cancelled`](crate::SpeechError::Cancelled) if `cancel`
    /// fires before that.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Tts`](crate::SpeechError::Tts) when synthesis,
    /// download or playback start fails.
    async fn attempt(&self, text: &str, cancel: &CancellationToken) -> Result<PlaybackHandle>;
}
