//! Audio I/O through external programs.
//!
//! The recorder runs a command that streams the microphone to stdout (e.g.
//! `arecord ... -t wav -`) until it is killed. The player runs a command that
//! reads an encoded clip on stdin and exits when playback ends (e.g.
//! `ffplay -nodisp -autoexit -i -`).

use crate::audio::{AudioPlayer, AudioRecorder, PlaybackHandle, RecordedClip, Recording};
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Resolve `command[0]` on `PATH`.
fn resolve(command: &[String]) -> Option<(PathBuf, Vec<String>)> {
    let (program, args) = command.split_first()?;
    let path = which::which(program).ok()?;
    Some((path, args.to_vec()))
}

/// Records by spawning a capture program.
#[derive(Debug, Clone)]
pub struct CommandRecorder {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRecorder {
    /// Use `command` if its program is installed.
    pub fn detect(command: &[String]) -> Option<Self> {
        let (program, args) = resolve(command)?;
        debug!(program = %program.display(), "recorder program found");
        Some(Self { program, args })
    }
}

#[async_trait]
impl AudioRecorder for CommandRecorder {
    fn name(&self) -> &str {
        "command"
    }

    async fn start(&self) -> Result<Box<dyn Recording>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeechError::Audio(format!("cannot start {}: {e}", self.program.display()))
            })?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpeechError::Audio("recorder stdout not captured".into()))?;
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        });
        info!(program = %self.program.display(), "recording started");
        Ok(Box::new(CommandRecording { child, reader }))
    }
}

struct CommandRecording {
    child: Child,
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
}

#[async_trait]
impl Recording for CommandRecording {
    async fn finish(self: Box<Self>) -> Result<RecordedClip> {
        let CommandRecording { mut child, reader } = *self;
        // A recorder that already died on its own never captured anything usable.
        if let Some(status) = child.try_wait()? {
            if !status.success() {
                reader.abort();
                return Err(SpeechError::Audio(format!("recorder exited with {status}")));
            }
        }
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "recorder already exited");
        }
        let _ = child.wait().await;
        let bytes = reader
            .await
            .map_err(|e| SpeechError::Audio(format!("recorder reader failed: {e}")))??;
        info!(bytes = bytes.len(), "recording finished");
        Ok(RecordedClip {
            bytes: Bytes::from(bytes),
        })
    }

    async fn abort(self: Box<Self>) {
        let CommandRecording { mut child, reader } = *self;
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "recorder already exited");
        }
        let _ = child.wait().await;
        reader.abort();
        info!("recording discarded");
    }
}

/// How long a player must survive before its playback counts as started.
const PLAYER_STARTUP_WINDOW: Duration = Duration::from_millis(250);

/// Plays clips by piping them into a player program.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Use `command` if its program is installed.
    pub fn detect(command: &[String]) -> Option<Self> {
        let (program, args) = resolve(command)?;
        debug!(program = %program.display(), "player program found");
        Some(Self { program, args })
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    fn name(&self) -> &str {
        "command"
    }

    async fn play(&self, audio: Bytes) -> Result<PlaybackHandle> {
        if audio.is_empty() {
            return Err(SpeechError::Audio("empty audio clip".into()));
        }
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(program = %self.program.display(), error = %e, "player failed to start");
                SpeechError::Audio(format!("cannot start {}: {e}", self.program.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&audio).await {
                    debug!(error = %e, "player stopped reading the clip");
                }
                let _ = stdin.shutdown().await;
            });
        }

        // A player that rejects the clip or has no output device exits at once.
        match tokio::time::timeout(PLAYER_STARTUP_WINDOW, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                warn!(program = %self.program.display(), %status, "player exited during startup");
                return Err(SpeechError::Audio(format!("player exited with {status}")));
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(_)) | Err(_) => {}
        }
        Ok(PlaybackHandle::from_child("player", child, None))
    }
}
