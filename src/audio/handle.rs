//! Handle to audible output in progress.

use crate::error::{Result, SpeechError};
use bytes::Bytes;
use std::future::Future;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The audio played to the end.
    Completed,
    /// [`PlaybackHandle::stop`] was called.
    Stopped,
    /// Output broke off.
    Failed(String),
}

/// Stop control plus completion signal for one playback.
///
/// Remote-audio and local-synthesizer playback both hand out this type, so
/// callers stop and await either the same way.
#[derive(Debug)]
pub struct PlaybackHandle {
    source: String,
    stop: CancellationToken,
    done: oneshot::Receiver<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Wrap a stop token and a completion receiver.
    pub fn new(
        source: impl Into<String>,
        stop: CancellationToken,
        done: oneshot::Receiver<PlaybackOutcome>,
    ) -> Self {
        Self {
            source: source.into(),
            stop,
            done,
        }
    }

    /// Run `play` on a task, racing it against the stop token.
    ///
    /// Dropping `play` on stop must release the output; child processes
    /// should be spawned with `kill_on_drop(true)`.
    pub fn spawn<F>(source: impl Into<String>, play: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let token = stop.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = token.cancelled() => PlaybackOutcome::Stopped,
                result = play => match result {
                    Ok(()) => PlaybackOutcome::Completed,
                    Err(e) => PlaybackOutcome::Failed(e.to_string()),
                },
            };
            let _ = tx.send(outcome);
        });
        Self::new(source, stop, rx)
    }

    /// Play through a spawned child process, optionally feeding it `input`
    /// on stdin. Completes when the process exits.
    pub fn from_child(source: impl Into<String>, mut child: Child, input: Option<Bytes>) -> Self {
        let source = source.into();
        let name = source.clone();
        Self::spawn(source, async move {
            if let Some(stdin) = child.stdin.take() {
                let mut stdin = stdin;
                if let Some(input) = input {
                    stdin.write_all(&input).await?;
                }
                stdin.shutdown().await?;
            }
            let status = child.wait().await?;
            if status.success() {
                debug!(source = %name, "playback process finished");
                Ok(())
            } else {
                Err(SpeechError::Audio(format!("{name} exited with {status}")))
            }
        })
    }

    /// Attribute the audio to `source`.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Name of the provider producing the audio.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Token that stops this playback when cancelled.
    pub fn stopper(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Stop the playback. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the playback to end.
    pub async fn wait(self) -> PlaybackOutcome {
        match self.done.await {
            Ok(outcome) => outcome,
            Err(_) if self.stop.is_cancelled() => PlaybackOutcome::Stopped,
            Err(_) => PlaybackOutcome::Failed("playback task ended unexpectedly".into()),
        }
    }
}
