//! Credential batch resolution.

use crate::config::SpeechConfig;
use crate::credentials::CredentialSource;
use std::fmt;

/// Resolved credential values ready for runtime use.
///
/// Empty strings mean "not configured". The custom [`Debug`] redacts all
/// values to prevent accidental secret leakage in logs.
#[derive(Clone, Default)]
pub struct LoadedCredentials {
    /// Generation (Groq) API key.
    pub llm_api_key: String,
    /// Remote transcription (Deepgram) API key.
    pub stt_api_key: String,
    /// Remote synthesis (Murf) API key.
    pub tts_api_key: String,
}

impl LoadedCredentials {
    /// Whether the generation credential is present.
    pub fn has_llm(&self) -> bool {
        !self.llm_api_key.is_empty()
    }

    /// Whether the remote transcription credential is present.
    pub fn has_stt(&self) -> bool {
        !self.stt_api_key.is_empty()
    }

    /// Whether the remote synthesis credential is present.
    pub fn has_tts(&self) -> bool {
        !self.tts_api_key.is_empty()
    }
}

impl fmt::Debug for LoadedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCredentials")
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("stt_api_key", &redact(&self.stt_api_key))
            .field("tts_api_key", &redact(&self.tts_api_key))
            .finish()
    }
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}

/// Resolve one credential: `NAME`, then `VITE_NAME`, then the config value.
fn resolve(source: &dyn CredentialSource, name: &str, configured: &str) -> String {
    source
        .lookup(name)
        .or_else(|| source.lookup(&format!("VITE_{name}")))
        .unwrap_or_else(|| configured.trim().to_owned())
}

/// Batch-resolve every provider credential.
pub fn load_all_credentials(
    config: &SpeechConfig,
    source: &dyn CredentialSource,
) -> LoadedCredentials {
    LoadedCredentials {
        llm_api_key: resolve(source, "GROQ_API_KEY", &config.llm.api_key),
        stt_api_key: resolve(source, "DEEPGRAM_API_KEY", &config.stt.api_key),
        tts_api_key: resolve(source, "MURF_API_KEY", &config.tts.api_key),
    }
}
