//! Shared HTTP plumbing for the remote providers.

use crate::error::{Result, SpeechError};
use std::time::Duration;

/// Build a client, applying `timeout_secs` when non-zero.
pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder
        .build()
        .map_err(|e| SpeechError::Config(format!("cannot build HTTP client: {e}")))
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Extract a human-readable message from an error response body.
///
/// Understands the OpenAI (`error.message`), Deepgram (`err_msg`) and Murf
/// (`errorMessage`) shapes; otherwise returns the raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .or_else(|| v.get("err_msg"))
                .or_else(|| v.get("errorMessage"))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}
