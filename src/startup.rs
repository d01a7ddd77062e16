//! Startup wiring: turns configuration and credentials into providers.
//!
//! Capability detection happens once here. Which credentials are present and
//! which programs are installed decide the transcription strategy and the
//! synthesis chain; nothing is re-detected mid-conversation.

use crate::audio::{AudioPlayer, AudioRecorder};
use crate::config::{AudioConfig, SpeechConfig};
use crate::credentials::LoadedCredentials;
use crate::error::{Result, SpeechError};
use crate::llm::{ApiGenerator, Generator};
use crate::pipeline::coordinator::Providers;
use crate::stt::select_transcriber;
use crate::tts::{LocalSynthesizer, MurfSynthesizer, SpeechSynthesizer, SynthesisChain};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Audio collaborators found on this machine.
#[derive(Clone, Default)]
pub struct AudioIo {
    /// Microphone recorder (`None` = no capture available).
    pub recorder: Option<Arc<dyn AudioRecorder>>,
    /// Clip player (`None` = remote voices cannot be played).
    pub player: Option<Arc<dyn AudioPlayer>>,
}

impl fmt::Debug for AudioIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioIo")
            .field("recorder", &self.recorder.as_ref().map(|r| r.name()))
            .field("player", &self.player.as_ref().map(|p| p.name()))
            .finish()
    }
}

/// Detect audio collaborators: the cpal devices.
#[cfg(feature = "native-audio")]
pub fn detect_audio(config: &AudioConfig) -> AudioIo {
    AudioIo {
        recorder: Some(Arc::new(crate::audio::capture::CpalRecorder::new(config))),
        player: Some(Arc::new(crate::audio::playback::CpalPlayer::new(config))),
    }
}

/// Detect audio collaborators: the configured record/play commands, when
/// installed.
#[cfg(not(feature = "native-audio"))]
pub fn detect_audio(config: &AudioConfig) -> AudioIo {
    let recorder = crate::audio::CommandRecorder::detect(&config.record_command)
        .map(|r| Arc::new(r) as Arc<dyn AudioRecorder>);
    let player = crate::audio::CommandPlayer::detect(&config.play_command)
        .map(|p| Arc::new(p) as Arc<dyn AudioPlayer>);
    if recorder.is_none() {
        warn!(command = ?config.record_command, "record command not found");
    }
    if player.is_none() {
        warn!(command = ?config.play_command, "play command not found");
    }
    AudioIo { recorder, player }
}

/// Build the synthesis chain: Murf first when configured, then the local
/// synthesizer.
pub fn build_synthesis(
    config: &SpeechConfig,
    credentials: &LoadedCredentials,
    player: Option<Arc<dyn AudioPlayer>>,
) -> SynthesisChain {
    let mut providers: Vec<Arc<dyn SpeechSynthesizer>> = Vec::new();

    if credentials.has_tts() {
        match player {
            Some(player) => match MurfSynthesizer::new(&config.tts, &credentials.tts_api_key, player) {
                Ok(murf) => providers.push(Arc::new(murf)),
                Err(e) => warn!(error = %e, "Murf voice unavailable"),
            },
            None => warn!("Murf key configured but no audio player available"),
        }
    }

    match LocalSynthesizer::detect(&config.tts) {
        Some(local) => providers.push(Arc::new(local)),
        None => warn!(programs = ?config.tts.local_programs, "no local synthesizer installed"),
    }

    let chain = SynthesisChain::new(providers);
    if chain.is_empty() {
        warn!("no synthesis providers; replies will not be spoken");
    }
    chain
}

/// Build every provider for a conversation.
///
/// # Errors
///
/// Returns [`SpeechError::Config`] when the generation credential is missing.
pub fn build_providers(
    config: &SpeechConfig,
    credentials: &LoadedCredentials,
    audio: &AudioIo,
) -> Result<Providers> {
    if !credentials.has_llm() {
        return Err(SpeechError::Config(
            "Groq API key not configured (set GROQ_API_KEY)".into(),
        ));
    }
    let generator: Arc<dyn Generator> =
        Arc::new(ApiGenerator::new(&config.llm, &credentials.llm_api_key)?);
    let transcriber = select_transcriber(&config.stt, credentials, audio.recorder.clone());
    let synthesis = Arc::new(build_synthesis(config, credentials, audio.player.clone()));

    let providers = Providers {
        transcriber,
        generator: Some(generator),
        synthesis,
    };
    info!(?providers, "providers ready");
    Ok(providers)
}
