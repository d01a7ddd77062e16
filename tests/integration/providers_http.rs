//! Remote providers against a mock HTTP server.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkback::audio::{AudioPlayer, AudioRecorder, PlaybackHandle, RecordedClip, Recording};
use talkback::config::{LlmConfig, SttConfig, TtsConfig};
use talkback::llm::{ApiGenerator, Generation, Generator};
use talkback::stt::{DeepgramTranscriber, Transcriber, TranscriptEvent};
use talkback::tts::{MurfSynthesizer, SpeechSynthesizer};
use talkback::{SpeechError, Utterance};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Recorder whose recordings always yield `clip`.
struct FixedRecorder {
    clip: Bytes,
}

struct FixedRecording {
    clip: Bytes,
}

#[async_trait]
impl AudioRecorder for FixedRecorder {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn start(&self) -> talkback::Result<Box<dyn Recording>> {
        Ok(Box::new(FixedRecording {
            clip: self.clip.clone(),
        }))
    }
}

#[async_trait]
impl Recording for FixedRecording {
    async fn finish(self: Box<Self>) -> talkback::Result<RecordedClip> {
        Ok(RecordedClip { bytes: self.clip })
    }

    async fn abort(self: Box<Self>) {}
}

/// Player that keeps every clip it is given.
#[derive(Default)]
struct CollectingPlayer {
    played: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl AudioPlayer for CollectingPlayer {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn play(&self, audio: Bytes) -> talkback::Result<PlaybackHandle> {
        self.played.lock().unwrap().push(audio);
        Ok(PlaybackHandle::spawn("collecting", async { Ok(()) }))
    }
}

fn recorder(clip: &'static [u8]) -> Arc<dyn AudioRecorder> {
    Arc::new(FixedRecorder {
        clip: Bytes::from_static(clip),
    })
}

// ── Generation ──────────────────────────────────────────────────

fn generator(server: &MockServer) -> ApiGenerator {
    let config = LlmConfig {
        api_url: server.uri(),
        ..LlmConfig::default()
    };
    ApiGenerator::new(&config, "gsk-test").unwrap()
}

#[tokio::test]
async fn generator_sends_history_and_returns_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer gsk-test"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"},
                {"role": "user", "content": "How are you?"}
            ],
            "temperature": 0.7,
            "max_tokens": 1024
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "<think>hmm</think>Doing well."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Utterance::user("Hi"),
        Utterance::assistant("Hello!"),
        Utterance::user("How are you?"),
    ];
    let result = generator(&server)
        .generate(&history, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result, Generation::Reply("Doing well.".into()));
}

#[tokio::test]
async fn generator_reports_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"error": {"message": "model overloaded"}})),
        )
        .mount(&server)
        .await;

    let err = generator(&server)
        .generate(&[Utterance::user("Hi")], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::Llm(_)));
    let text = err.to_string();
    assert!(text.contains("500"), "{text}");
    assert!(text.contains("model overloaded"), "{text}");
}

#[tokio::test]
async fn generator_rejects_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "  "}}]
        })))
        .mount(&server)
        .await;

    let err = generator(&server)
        .generate(&[Utterance::user("Hi")], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::Llm(_)));
}

#[tokio::test]
async fn generator_cancellation_abandons_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let generator = generator(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        generator.generate(&[Utterance::user("Hi")], &cancel),
    )
    .await
    .expect("cancellation should end the request promptly")
    .unwrap();
    assert_eq!(result, Generation::Cancelled);
}

// ── Transcription ───────────────────────────────────────────────

fn deepgram(server: &MockServer, clip: &'static [u8]) -> DeepgramTranscriber {
    let config = SttConfig {
        api_url: server.uri(),
        ..SttConfig::default()
    };
    DeepgramTranscriber::new(&config, "dg-test", recorder(clip)).unwrap()
}

fn deepgram_reply(transcript: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "results": {"channels": [{"alternatives": [{"transcript": transcript, "confidence": 0.98}]}]}
    }))
}

#[tokio::test]
async fn deepgram_uploads_clip_with_token_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .and(header("authorization", "Token dg-test"))
        .and(header("content-type", "audio/wav"))
        .respond_with(deepgram_reply(" turn on the lights "))
        .expect(1)
        .mount(&server)
        .await;

    let text = deepgram(&server, b"RIFF")
        .transcribe(Bytes::from_static(b"RIFF...."))
        .await
        .unwrap();
    assert_eq!(text, "turn on the lights");
}

#[tokio::test]
async fn deepgram_session_finishes_with_final_transcript() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .respond_with(deepgram_reply("hello there"))
        .mount(&server)
        .await;

    let transcriber = deepgram(&server, b"RIFF....data");
    let mut session = transcriber.start().await.unwrap();
    session.finish();
    assert_eq!(
        session.next_event().await,
        Some(TranscriptEvent::Final("hello there".into()))
    );
}

#[tokio::test]
async fn deepgram_blank_transcript_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .respond_with(deepgram_reply(""))
        .mount(&server)
        .await;

    let mut session = deepgram(&server, b"RIFF....data").start().await.unwrap();
    session.finish();
    assert_eq!(session.next_event().await, Some(TranscriptEvent::Empty));
}

#[tokio::test]
async fn deepgram_blank_upload_is_empty_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": {"channels": []}})))
        .mount(&server)
        .await;

    let err = deepgram(&server, b"RIFF")
        .transcribe(Bytes::from_static(b"RIFF...."))
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::EmptyInput));
    assert!(!err.is_failure());
}

#[tokio::test]
async fn deepgram_service_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"err_msg": "Invalid credentials."})),
        )
        .mount(&server)
        .await;

    let mut session = deepgram(&server, b"RIFF....data").start().await.unwrap();
    session.finish();
    match session.next_event().await {
        Some(TranscriptEvent::ServiceError(message)) => {
            assert!(message.contains("Invalid credentials"), "{message}");
        }
        other => panic!("expected a service error, got {other:?}"),
    }
}

#[tokio::test]
async fn deepgram_aborted_session_uploads_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .respond_with(deepgram_reply("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = deepgram(&server, b"RIFF....data").start().await.unwrap();
    session.abort();
    assert_eq!(session.next_event().await, None);
}

// ── Synthesis ───────────────────────────────────────────────────

fn murf(server: &MockServer, player: Arc<CollectingPlayer>) -> MurfSynthesizer {
    let config = TtsConfig {
        api_url: server.uri(),
        ..TtsConfig::default()
    };
    MurfSynthesizer::new(&config, "murf-test", player).unwrap()
}

#[tokio::test]
async fn murf_renders_then_downloads_audio() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech/generate"))
        .and(header("api-key", "murf-test"))
        .and(body_partial_json(json!({
            "voiceId": "en-IN-priya",
            "style": "Conversational",
            "text": "Good morning.",
            "sampleRate": 24000,
            "format": "MP3",
            "channelType": "MONO",
            "modelVersion": "GEN2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioFile": format!("{}/clips/reply.mp3", server.uri()),
            "audioLengthInSeconds": 1.2
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clips/reply.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let player = Arc::new(CollectingPlayer::default());
    let audio = murf(&server, player)
        .synthesize("Good morning.")
        .await
        .unwrap();
    assert_eq!(audio.as_ref(), b"ID3fake");
}

#[tokio::test]
async fn murf_without_audio_file_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"audioLengthInSeconds": 0})))
        .mount(&server)
        .await;

    let player = Arc::new(CollectingPlayer::default());
    let err = murf(&server, player.clone())
        .attempt("Hello", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::Tts(_)));
    assert!(player.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn murf_attempt_plays_downloaded_clip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioFile": format!("{}/clips/a.mp3", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clips/a.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
        .mount(&server)
        .await;

    let player = Arc::new(CollectingPlayer::default());
    let handle = murf(&server, player.clone())
        .attempt("Hello", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handle.source(), "murf");
    assert_eq!(
        player.played.lock().unwrap().as_slice(),
        &[Bytes::from_static(b"mp3")]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn dying_player_falls_back_to_local_voice() {
    use std::os::unix::fs::PermissionsExt;
    use talkback::audio::{CommandPlayer, PlaybackOutcome};
    use talkback::tts::{LocalSynthesizer, SynthesisChain};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioFile": format!("{}/clips/bad.mp3", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clips/bad.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not audio".to_vec()))
        .mount(&server)
        .await;

    let dying_player = CommandPlayer::detect(&["sh".to_owned(), "-c".to_owned(), "exit 1".to_owned()])
        .unwrap();
    let config = TtsConfig {
        api_url: server.uri(),
        ..TtsConfig::default()
    };
    let remote = MurfSynthesizer::new(&config, "murf-test", Arc::new(dying_player)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let spoken = dir.path().join("spoken.txt");
    let script = dir.path().join("fake-espeak");
    std::fs::write(&script, format!("#!/bin/sh\ncat > '{}'\n", spoken.display())).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let local = LocalSynthesizer::with_program(&script, &TtsConfig::default());

    let chain = SynthesisChain::new(vec![
        Arc::new(remote) as Arc<dyn SpeechSynthesizer>,
        Arc::new(local) as Arc<dyn SpeechSynthesizer>,
    ]);
    let handle = chain.speak("Hello", &CancellationToken::new()).await.unwrap();
    assert_eq!(handle.source(), "local");
    assert_eq!(chain.fallback_count(), 1);
    assert_eq!(handle.wait().await, PlaybackOutcome::Completed);
    assert_eq!(std::fs::read_to_string(&spoken).unwrap(), "Hello");
}
