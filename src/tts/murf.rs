//! Murf premium voice.
//!
//! `POST /v1/speech/generate` returns a URL to the rendered clip; the clip
//! is downloaded and handed to the audio player.

use crate::audio::{AudioPlayer, PlaybackHandle};
use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use crate::http;
use crate::tts::SpeechSynthesizer;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Murf synthesis provider.
pub struct MurfSynthesizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    voice_id: String,
    style: String,
    sample_rate: u32,
    format: String,
    player: Arc<dyn AudioPlayer>,
}

impl std::fmt::Debug for MurfSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MurfSynthesizer")
            .field("url", &self.url)
            .field("voice_id", &self.voice_id)
            .field("player", &self.player.name())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    voice_id: &'a str,
    style: &'a str,
    text: &'a str,
    rate: i32,
    pitch: i32,
    sample_rate: u32,
    format: &'a str,
    channel_type: &'static str,
    pronunciation_dictionary: BTreeMap<String, String>,
    encode_as_base64: bool,
    variation: u32,
    model_version: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    audio_file: Option<String>,
}

impl MurfSynthesizer {
    /// Create a provider that plays through `player`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn new(config: &TtsConfig, api_key: &str, player: Arc<dyn AudioPlayer>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(SpeechError::Config("Murf API key not configured".into()));
        }
        Ok(Self {
            client: http::client(config.request_timeout_secs)?,
            url: http::endpoint(&config.api_url, "v1/speech/generate"),
            api_key: api_key.trim().to_owned(),
            voice_id: config.voice_id.clone(),
            style: config.style.clone(),
            sample_rate: config.sample_rate,
            format: config.format.clone(),
            player,
        })
    }

    /// Render `text` and download the clip.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Tts`] if the request fails, the response has no
    /// usable audio URL, or the download fails.
    pub async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let started = Instant::now();
        let body = GenerateRequest {
            voice_id: &self.voice_id,
            style: &self.style,
            text,
            rate: 0,
            pitch: 0,
            sample_rate: self.sample_rate,
            format: &self.format,
            channel_type: "MONO",
            pronunciation_dictionary: BTreeMap::new(),
            encode_as_base64: false,
            variation: 1,
            model_version: "GEN2",
        };
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Tts(format!("murf request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Tts(format!(
                "murf HTTP {}: {}",
                status.as_u16(),
                http::extract_error_message(&body)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Tts(format!("murf response invalid: {e}")))?;
        let audio_url = parsed
            .audio_file
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SpeechError::Tts("murf response has no audioFile".into()))?;
        debug!(url = %audio_url, "downloading rendered speech");

        let download = self
            .client
            .get(&audio_url)
            .send()
            .await
            .map_err(|e| SpeechError::Tts(format!("audio download failed: {e}")))?;
        if !download.status().is_success() {
            return Err(SpeechError::Tts(format!(
                "audio download HTTP {}",
                download.status().as_u16()
            )));
        }
        let audio = download
            .bytes()
            .await
            .map_err(|e| SpeechError::Tts(format!("audio download failed: {e}")))?;
        info!(
            bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "murf speech rendered"
        );
        Ok(audio)
    }
}

#[async_trait]
impl SpeechSynthesizer for MurfSynthesizer {
    fn name(&self) -> &str {
        "murf"
    }

    async fn attempt(&self, text: &str, cancel: &CancellationToken) -> Result<PlaybackHandle> {
        tokio::select! {
            () = cancel.cancelled() => Err(SpeechError::Cancelled),
            result = async {
                let audio = self.synthesize(text).await?;
                self.player
                    .play(audio)
                    .await
                    .map_err(|e| SpeechError::Tts(format!("playback failed to start: {e}")))
            } => result.map(|handle| handle.with_source("murf")),
        }
    }
}
