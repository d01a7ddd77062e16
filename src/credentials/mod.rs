//! Provider credential lookup.
//!
//! Credentials are read from the process environment (optionally seeded
//! from a `.env` file) and fall back to the values in [`SpeechConfig`].
//! Which credentials are present decides which provider strategies are
//! available at startup:
//!
//! | Variable | Provider |
//! |---|---|
//! | `GROQ_API_KEY` | generation (required) |
//! | `DEEPGRAM_API_KEY` | remote transcription |
//! | `MURF_API_KEY` | remote synthesis |
//!
//! Each variable is also accepted with a `VITE_` prefix.
//!
//! [`SpeechConfig`]: crate::config::SpeechConfig

mod loader;

pub use loader::{LoadedCredentials, load_all_credentials};

/// A source of named secrets.
pub trait CredentialSource {
    /// Look up a secret by variable name. Empty values count as absent.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    /// Create an environment source, loading `.env` from the working
    /// directory (or a parent) first when one exists.
    pub fn with_dotenv() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to load .env file"),
        }
        Self
    }
}

impl CredentialSource for EnvCredentialSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

impl CredentialSource for std::collections::HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.trim().is_empty()).cloned()
    }
}
