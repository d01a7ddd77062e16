//! Local synthesizer via `espeak-ng` (or `espeak`).
//!
//! Always available when the program is installed and needs no network.
//! The reply is fed on stdin; the program speaks it directly to the default
//! output device and exits when done.

use crate::audio::PlaybackHandle;
use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use crate::tts::SpeechSynthesizer;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// espeak's default speaking rate in words per minute.
const BASE_WPM: f32 = 175.0;
/// espeak's default pitch (0-99).
const BASE_PITCH: f32 = 50.0;
/// espeak's default amplitude (0-200).
const BASE_AMPLITUDE: f32 = 100.0;

/// Local speech synthesizer process.
#[derive(Debug, Clone)]
pub struct LocalSynthesizer {
    program: PathBuf,
    voice: String,
    rate: f32,
    pitch: f32,
    volume: f32,
}

impl LocalSynthesizer {
    /// Find the first configured program on `PATH`.
    pub fn detect(config: &TtsConfig) -> Option<Self> {
        let program = config
            .local_programs
            .iter()
            .find_map(|name| which::which(name).ok())?;
        info!(program = %program.display(), "local synthesizer found");
        Some(Self::with_program(program, config))
    }

    /// Use a specific program path.
    pub fn with_program(program: impl Into<PathBuf>, config: &TtsConfig) -> Self {
        Self {
            program: program.into(),
            voice: config.local_voice.clone(),
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }

    /// Command-line arguments applying the voice shaping multipliers.
    pub fn args(&self) -> Vec<String> {
        let wpm = (BASE_WPM * self.rate).round().clamp(80.0, 450.0) as u32;
        let pitch = (BASE_PITCH * self.pitch).round().clamp(0.0, 99.0) as u32;
        let amplitude = (BASE_AMPLITUDE * self.volume).round().clamp(0.0, 200.0) as u32;

        let mut args = vec![
            "-s".to_owned(),
            wpm.to_string(),
            "-p".to_owned(),
            pitch.to_string(),
            "-a".to_owned(),
            amplitude.to_string(),
        ];
        if !self.voice.is_empty() {
            args.push("-v".to_owned());
            args.push(self.voice.clone());
        }
        args.push("--stdin".to_owned());
        args
    }
}

#[async_trait]
impl SpeechSynthesizer for LocalSynthesizer {
    fn name(&self) -> &str {
        "local"
    }

    async fn attempt(&self, text: &str, cancel: &CancellationToken) -> Result<PlaybackHandle> {
        if cancel.is_cancelled() {
            return Err(SpeechError::Cancelled);
        }
        let args = self.args();
        debug!(program = %self.program.display(), ?args, "starting local synthesizer");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeechError::Tts(format!("cannot start {}: {e}", self.program.display()))
            })?;
        Ok(PlaybackHandle::from_child(
            "local",
            child,
            Some(Bytes::copy_from_slice(text.as_bytes())),
        ))
    }
}
