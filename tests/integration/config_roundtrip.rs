//! Configuration files and credential resolution.

use std::collections::HashMap;
use talkback::SpeechConfig;
use talkback::config::SttBackend;
use talkback::credentials::load_all_credentials;

#[test]
fn config_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = SpeechConfig::default();
    config.stt.backend = SttBackend::Remote;
    config.stt.language = "en-GB".into();
    config.tts.voice_id = "en-UK-hazel".into();
    config.conversation.continuous = true;
    config.save_to_file(&path).unwrap();

    let loaded = SpeechConfig::from_file(&path).unwrap();
    assert_eq!(loaded.stt.backend, SttBackend::Remote);
    assert_eq!(loaded.stt.language, "en-GB");
    assert_eq!(loaded.tts.voice_id, "en-UK-hazel");
    assert!(loaded.conversation.continuous);
    assert_eq!(loaded.conversation.settle_delay_ms, 500);
}

#[test]
fn partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[llm]\nmodel = \"llama-3.1-8b-instant\"\n").unwrap();

    let loaded = SpeechConfig::from_file(&path).unwrap();
    assert_eq!(loaded.llm.model, "llama-3.1-8b-instant");
    assert_eq!(loaded.llm.api_url, SpeechConfig::default().llm.api_url);
    assert_eq!(loaded.tts.local_programs, vec!["espeak-ng", "espeak"]);
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[llm\nmodel = ").unwrap();

    let err = SpeechConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, talkback::SpeechError::Config(_)));
}

#[test]
fn environment_overrides_config_keys() {
    let mut config = SpeechConfig::default();
    config.llm.api_key = "from-config".into();
    config.tts.api_key = "murf-from-config".into();

    let env: HashMap<String, String> = [
        ("GROQ_API_KEY".to_owned(), "from-env".to_owned()),
        ("VITE_DEEPGRAM_API_KEY".to_owned(), "dg-vite".to_owned()),
    ]
    .into_iter()
    .collect();

    let credentials = load_all_credentials(&config, &env);
    assert_eq!(credentials.llm_api_key, "from-env");
    assert_eq!(credentials.stt_api_key, "dg-vite");
    assert_eq!(credentials.tts_api_key, "murf-from-config");
    assert!(!format!("{credentials:?}").contains("from-env"));
}
