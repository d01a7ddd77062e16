//! Configuration types for the conversation engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Audio capture/playback collaborators.
    pub audio: AudioConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Turn-taking behaviour.
    pub conversation: ConversationConfig,
}

/// Audio I/O configuration.
///
/// By default audio goes through external commands so the engine runs on any
/// machine with `arecord`/`ffplay` installed. With the `native-audio` feature
/// the `cpal` devices named here are used instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz.
    pub input_sample_rate: u32,
    /// Command that writes a WAV stream of the microphone to stdout until killed.
    pub record_command: Vec<String>,
    /// Command that plays an audio stream read from stdin and exits when done.
    pub play_command: Vec<String>,
    /// Input device name for native capture (None = system default).
    pub input_device: Option<String>,
    /// Output device name for native playback (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            record_command: [
                "arecord", "-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-t", "wav", "-",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            play_command: [
                "ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet", "-i", "-",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            input_device: None,
            output_device: None,
        }
    }
}

/// Which transcription strategy to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttBackend {
    /// Pick at startup: local recognizer if available, otherwise remote.
    #[default]
    Auto,
    /// Client-local continuous recognizer process.
    Local,
    /// Remote batch transcription (Deepgram).
    Remote,
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Strategy selection.
    pub backend: SttBackend,
    /// Local recognizer program plus arguments.
    ///
    /// The program must print its current hypothesis as one line on stdout
    /// each time it changes, and exit once the utterance ends. The last line
    /// printed is taken as the final transcript. Empty = no local recognizer.
    pub recognizer_command: Vec<String>,
    /// Recognition language (BCP 47), exported to the recognizer as
    /// `TALKBACK_LANGUAGE`.
    pub language: String,
    /// Base URL of the remote transcription API.
    pub api_url: String,
    /// Remote transcription API key (overridden by `DEEPGRAM_API_KEY`).
    pub api_key: String,
    /// MIME type of the uploaded clip.
    pub content_type: String,
    /// Upper bound on a recorded clip for remote transcription, in seconds.
    pub max_clip_secs: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackend::default(),
            recognizer_command: Vec::new(),
            language: "en-IN".to_owned(),
            api_url: "https://api.deepgram.com".to_owned(),
            api_key: String::new(),
            content_type: "audio/wav".to_owned(),
            max_clip_secs: 30,
        }
    }
}

/// Language model configuration.
///
/// Sampling parameters are fixed by the provider and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API (without `/v1`).
    pub api_url: String,
    /// Model name to request.
    pub model: String,
    /// API key (overridden by `GROQ_API_KEY`).
    pub api_key: String,
    /// Per-request timeout in seconds. 0 = wait until the user stops the turn.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai".to_owned(),
            model: "llama-3.3-70b-versatile".to_owned(),
            api_key: String::new(),
            request_timeout_secs: 0,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the remote synthesis API.
    pub api_url: String,
    /// Remote synthesis API key (overridden by `MURF_API_KEY`).
    pub api_key: String,
    /// Remote voice identifier.
    pub voice_id: String,
    /// Remote voice style.
    pub style: String,
    /// Remote output sample rate in Hz.
    pub sample_rate: u32,
    /// Remote output format.
    pub format: String,
    /// Per-request timeout for remote synthesis in seconds. 0 = no timeout.
    pub request_timeout_secs: u64,
    /// Local synthesizer programs, tried in order until one resolves on `PATH`.
    pub local_programs: Vec<String>,
    /// Local synthesizer voice (empty = program default).
    pub local_voice: String,
    /// Local speaking-rate multiplier.
    pub rate: f32,
    /// Local pitch multiplier.
    pub pitch: f32,
    /// Local volume multiplier.
    pub volume: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.murf.ai".to_owned(),
            api_key: String::new(),
            voice_id: "en-IN-priya".to_owned(),
            style: "Conversational".to_owned(),
            sample_rate: 24_000,
            format: "MP3".to_owned(),
            request_timeout_secs: 0,
            local_programs: vec!["espeak-ng".to_owned(), "espeak".to_owned()],
            local_voice: String::new(),
            rate: 0.85,
            pitch: 0.9,
            volume: 0.75,
        }
    }
}

/// Turn-taking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Re-arm capture automatically after each completed turn.
    pub continuous: bool,
    /// Pause before re-arming capture, letting audio devices release.
    pub settle_delay_ms: u64,
    /// How long a transient status (e.g. "Generation stopped") stays visible.
    pub status_reset_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            settle_delay_ms: 500,
            status_reset_ms: 2_000,
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SpeechError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/talkback/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/talkback-config"))
            .join("talkback")
            .join("config.toml")
    }
}
