//! Remote batch transcription via Deepgram's `/v1/listen`.
//!
//! The session records a clip until it is finished (or the clip limit is
//! reached), then uploads the whole clip and reports the transcript.

use crate::audio::AudioRecorder;
use crate::config::SttConfig;
use crate::error::{Result, SpeechError};
use crate::http;
use crate::stt::{CaptureSession, TranscriptEvent, Transcriber};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Remote transcriber.
#[derive(Clone)]
pub struct DeepgramTranscriber {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    url: String,
    api_key: String,
    content_type: String,
    max_clip: Duration,
    recorder: Arc<dyn AudioRecorder>,
}

impl std::fmt::Debug for DeepgramTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepgramTranscriber")
            .field("url", &self.inner.url)
            .field("recorder", &self.inner.recorder.name())
            .finish_non_exhaustive()
    }
}

impl DeepgramTranscriber {
    /// Create a transcriber that records through `recorder`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn new(config: &SttConfig, api_key: &str, recorder: Arc<dyn AudioRecorder>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(SpeechError::Config("Deepgram API key not configured".into()));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                client: http::client(0)?,
                url: http::endpoint(&config.api_url, "v1/listen"),
                api_key: api_key.trim().to_owned(),
                content_type: config.content_type.clone(),
                max_clip: Duration::from_secs(u64::from(config.max_clip_secs.max(1))),
                recorder,
            }),
        })
    }

    /// Upload one clip and return its transcript.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::EmptyInput`] when nothing was recognized, and
    /// [`SpeechError::Stt`] on transport failure or a non-success response.
    pub async fn transcribe(&self, audio: Bytes) -> Result<String> {
        self.inner.transcribe(audio).await
    }
}

impl Inner {
    async fn transcribe(&self, audio: Bytes) -> Result<String> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.api_key))
            .header(reqwest::header::CONTENT_TYPE, &self.content_type)
            .body(audio)
            .send()
            .await
            .map_err(|e| SpeechError::Stt(format!("upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Stt(format!(
                "HTTP {}: {}",
                status.as_u16(),
                http::extract_error_message(&body)
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SpeechError::Stt(format!("invalid response body: {e}")))?;
        let transcript = body
            .pointer("/results/channels/0/alternatives/0/transcript")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .trim()
            .to_owned();
        if transcript.is_empty() {
            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "transcription found no speech"
            );
            return Err(SpeechError::EmptyInput);
        }
        info!(
            chars = transcript.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcription complete"
        );
        Ok(transcript)
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &str {
        "deepgram"
    }

    async fn start(&self) -> Result<CaptureSession> {
        let recording = self.inner.recorder.start().await?;
        let (session, tx, control) = CaptureSession::channel();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                () = control.abort_requested() => {
                    recording.abort().await;
                    debug!("remote capture aborted");
                    return;
                }
                () = control.finish_requested() => {}
                () = tokio::time::sleep(inner.max_clip) => {
                    info!(limit_secs = inner.max_clip.as_secs(), "clip limit reached");
                }
            }

            let event = match recording.finish().await {
                Err(e) => {
                    warn!(error = %e, "recording failed");
                    TranscriptEvent::ServiceError(e.to_string())
                }
                Ok(clip) if clip.is_empty() => TranscriptEvent::Empty,
                Ok(clip) => {
                    tokio::select! {
                        () = control.abort_requested() => return,
                        result = inner.transcribe(clip.bytes) => match result {
                            Ok(text) => TranscriptEvent::Final(text),
                            Err(SpeechError::EmptyInput) => TranscriptEvent::Empty,
                            Err(e) => {
                                warn!(error = %e, "transcription failed");
                                TranscriptEvent::ServiceError(e.to_string())
                            }
                        },
                    }
                }
            };
            let _ = tx.send(event).await;
        });

        Ok(session)
    }
}
