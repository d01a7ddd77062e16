//! Ordered fallback across synthesis providers.
//!
//! [`SynthesisChain`] tries each provider in turn until one starts speaking.
//! Failures before the last provider are silent to the caller but counted
//! and logged; the last provider's failure is terminal.

use crate::audio::PlaybackHandle;
use crate::error::{Result, SpeechError};
use crate::tts::SpeechSynthesizer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Ordered synthesis providers plus the currently held playback.
pub struct SynthesisChain {
    providers: Vec<Arc<dyn SpeechSynthesizer>>,
    /// Count of fallback activations (for observability).
    fallback_count: AtomicU32,
    /// Stop token of the most recent playback.
    current: Mutex<Option<CancellationToken>>,
}

impl SynthesisChain {
    /// Create a chain; the first provider is tried first.
    pub fn new(providers: Vec<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            providers,
            fallback_count: AtomicU32::new(0),
            current: Mutex::new(None),
        }
    }

    /// Number of times a later provider was tried after an earlier one failed.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// Provider names in order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_owned()).collect()
    }

    /// Whether any provider is configured.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Speak `text` with the first provider that can.
    ///
    /// Any playback started by an earlier call is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Cancelled`] if `cancel` fires first, or
    /// [`SpeechError::Tts`] when every provider failed.
    pub async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<PlaybackHandle> {
        self.stop();

        let mut last_error = None;
        for (index, provider) in self.providers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SpeechError::Cancelled);
            }
            match provider.attempt(text, cancel).await {
                Ok(handle) => {
                    info!(provider = provider.name(), chars = text.len(), "speaking");
                    self.hold(handle.stopper());
                    return Ok(handle);
                }
                Err(SpeechError::Cancelled) => return Err(SpeechError::Cancelled),
                Err(e) => {
                    if let Some(next) = self.providers.get(index + 1) {
                        self.fallback_count.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            provider = provider.name(),
                            fallback = next.name(),
                            error = %e,
                            "synthesis failed, falling back"
                        );
                    } else {
                        warn!(provider = provider.name(), error = %e, "synthesis failed");
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => SpeechError::Tts(format!("all synthesis providers failed: {e}")),
            None => SpeechError::Tts("no synthesis providers configured".into()),
        })
    }

    /// Stop the playback this chain last started, if it is still running.
    pub fn stop(&self) {
        let previous = match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(token) = previous {
            token.cancel();
        }
    }

    fn hold(&self, stopper: CancellationToken) {
        match self.current.lock() {
            Ok(mut current) => *current = Some(stopper),
            Err(poisoned) => *poisoned.into_inner() = Some(stopper),
        }
    }
}

impl std::fmt::Debug for SynthesisChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisChain")
            .field("providers", &self.provider_names())
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}
