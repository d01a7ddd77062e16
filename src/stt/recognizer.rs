//! Local continuous recognizer driven as a child process.
//!
//! Contract with the recognizer program:
//!
//! - It listens on the microphone itself and prints its current hypothesis
//!   as one line on stdout whenever it changes.
//! - It exits with status 0 when the utterance ends; the last line printed
//!   is the final transcript.
//! - On failure it exits non-zero; the last line written to stderr is taken
//!   as the error code (e.g. `no-speech`, `audio-capture`, `not-allowed`).
//! - The recognition language is passed in `TALKBACK_LANGUAGE`.

use crate::error::{Result, SpeechError};
use crate::stt::{CaptureControl, CaptureSession, TranscriptEvent, Transcriber};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Environment variable carrying the recognition language.
pub const LANGUAGE_ENV: &str = "TALKBACK_LANGUAGE";

/// Transcriber backed by a local recognizer program.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    language: String,
}

impl CommandRecognizer {
    /// Use `command` if its program resolves on `PATH`.
    pub fn detect(command: &[String], language: &str) -> Option<Self> {
        let (program, args) = command.split_first()?;
        let program = which::which(program).ok()?;
        Some(Self {
            program,
            args: args.to_vec(),
            language: language.to_owned(),
        })
    }
}

#[async_trait]
impl Transcriber for CommandRecognizer {
    fn name(&self) -> &str {
        "local"
    }

    async fn start(&self) -> Result<CaptureSession> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(LANGUAGE_ENV, &self.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeechError::Stt(format!("cannot start {}: {e}", self.program.display()))
            })?;
        info!(program = %self.program.display(), language = %self.language, "recognizer started");

        let (session, tx, control) = CaptureSession::channel();
        tokio::spawn(async move {
            if let Some(event) = run(&mut child, &tx, &control).await {
                let _ = tx.send(event).await;
            }
        });
        Ok(session)
    }
}

/// Drive the recognizer until it ends; returns the terminal event, or
/// `None` when aborted.
async fn run(
    child: &mut Child,
    tx: &mpsc::Sender<TranscriptEvent>,
    control: &CaptureControl,
) -> Option<TranscriptEvent> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Some(TranscriptEvent::ServiceError("recognizer pipes not captured".into()));
    };
    let mut lines = BufReader::new(stdout).lines();
    let stderr_task = tokio::spawn(async move {
        let mut last = None;
        let mut errs = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = errs.next_line().await {
            let line = line.trim().to_owned();
            if !line.is_empty() {
                last = Some(line);
            }
        }
        last
    });

    let mut hypothesis = String::new();
    loop {
        tokio::select! {
            biased;
            () = control.abort_requested() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                debug!("recognizer aborted");
                return None;
            }
            () = control.finish_requested() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                debug!("recognizer finished on request");
                return Some(final_event(hypothesis));
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() || line == hypothesis {
                        continue;
                    }
                    hypothesis = line.to_owned();
                    if tx.send(TranscriptEvent::Interim(hypothesis.clone())).await.is_err() {
                        let _ = child.start_kill();
                        return None;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "recognizer output unreadable");
                    let _ = child.start_kill();
                    return Some(TranscriptEvent::RecognizerError("output-unreadable".into()));
                }
            },
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => return Some(TranscriptEvent::ServiceError(e.to_string())),
    };
    let last_stderr = stderr_task.await.ok().flatten();
    if status.success() {
        Some(final_event(hypothesis))
    } else {
        let code = last_stderr.unwrap_or_else(|| format!("exit-{}", status.code().unwrap_or(-1)));
        Some(TranscriptEvent::RecognizerError(code))
    }
}

fn final_event(hypothesis: String) -> TranscriptEvent {
    if hypothesis.trim().is_empty() {
        TranscriptEvent::Empty
    } else {
        TranscriptEvent::Final(hypothesis)
    }
}
