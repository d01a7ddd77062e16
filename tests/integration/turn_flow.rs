//! End-to-end turns through the coordinator with scripted providers.

use crate::helpers::{
    Running, ScriptedGenerator, ScriptedTranscriber, ScriptedVoice, chain, config, providers,
};
use std::time::Duration;
use talkback::{Command, RuntimeEvent, Speaker, Status, TurnState, Utterance};

fn is_status(event: &RuntimeEvent, status: &Status) -> bool {
    matches!(event, RuntimeEvent::Status(s) if s == status)
}

fn is_state(event: &RuntimeEvent, state: TurnState) -> bool {
    matches!(event, RuntimeEvent::StateChanged(s) if *s == state)
}

const READY: Status = Status::Ready {
    premium_voice: false,
};

#[tokio::test(start_paused = true)]
async fn spoken_turn_round_trip() {
    let transcriber = ScriptedTranscriber::new(&["what", "what time"], "what time is it");
    let generator = ScriptedGenerator::replying("It is noon.");
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let mut running = Running::start(
        &config(),
        providers(Some(transcriber.clone()), generator.clone(), chain(&[&voice])),
    );

    running.send(Command::StartCapture);
    running
        .wait_for(|e| {
            matches!(e, RuntimeEvent::Transcript { text, is_final: false } if text == "what time")
        })
        .await;
    running.send(Command::FinishCapture);

    let seen = running
        .wait_for(|e| matches!(e, RuntimeEvent::PlaybackStarted { .. }))
        .await;
    assert!(seen.contains(&RuntimeEvent::Transcript {
        text: "what time is it".into(),
        is_final: true,
    }));
    assert!(seen.iter().any(|e| is_status(e, &Status::Thinking)));
    assert_eq!(
        seen.last(),
        Some(&RuntimeEvent::PlaybackStarted {
            provider: "local".into()
        })
    );

    let seen = running.wait_for(|e| is_state(e, TurnState::Idle)).await;
    assert!(seen.iter().any(|e| is_status(e, &READY)));

    let history = running.stop().await;
    assert_eq!(
        history.as_slice(),
        &[
            Utterance::user("what time is it"),
            Utterance::assistant("It is noon.")
        ]
    );
    assert_eq!(
        generator.requests(),
        vec![vec![Utterance::user("what time is it")]]
    );
    assert_eq!(voice.spoken(), vec!["It is noon."]);
    assert_eq!(transcriber.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_transcription_reports_no_speech() {
    let transcriber = ScriptedTranscriber::new(&[], "   ");
    let generator = ScriptedGenerator::replying("unused");
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let mut running = Running::start(
        &config(),
        providers(Some(transcriber), generator.clone(), chain(&[&voice])),
    );

    running.send(Command::StartCapture);
    running.wait_for(|e| is_status(e, &Status::Listening)).await;
    running.send(Command::FinishCapture);
    let seen = running.wait_for(|e| is_status(e, &Status::NoSpeech)).await;
    assert!(seen.iter().any(|e| is_state(e, TurnState::Idle)));

    let history = running.stop().await;
    assert!(history.is_empty());
    assert!(generator.requests().is_empty());
    assert!(voice.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_during_thinking_keeps_only_user_utterance() {
    let generator = ScriptedGenerator::slow("never said", Duration::from_secs(3600));
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let mut running = Running::start(&config(), providers(None, generator, chain(&[&voice])));

    running.send(Command::Submit("tell me a story".into()));
    running.wait_for(|e| is_status(e, &Status::Thinking)).await;
    running.send(Command::StopGeneration);
    let seen = running
        .wait_for(|e| is_status(e, &Status::GenerationStopped))
        .await;
    assert!(seen.iter().any(|e| is_state(e, TurnState::Idle)));

    // The transient status reverts on its own.
    running.wait_for(|e| is_status(e, &READY)).await;

    let history = running.stop().await;
    assert_eq!(history.as_slice(), &[Utterance::user("tell me a story")]);
    assert!(voice.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_premium_voice_falls_back_to_local() {
    let murf = ScriptedVoice::broken("murf");
    let local = ScriptedVoice::new("local", Duration::from_millis(200));
    let synthesis = chain(&[&murf, &local]);
    let generator = ScriptedGenerator::replying("Hello there.");
    let mut running = Running::start(&config(), providers(None, generator, synthesis.clone()));

    running
        .wait_for(|e| {
            is_status(
                e,
                &Status::Ready {
                    premium_voice: true,
                },
            )
        })
        .await;
    running.send(Command::Submit("hi".into()));
    let seen = running
        .wait_for(|e| matches!(e, RuntimeEvent::PlaybackStarted { .. }))
        .await;
    assert_eq!(
        seen.last(),
        Some(&RuntimeEvent::PlaybackStarted {
            provider: "local".into()
        })
    );
    assert_eq!(synthesis.fallback_count(), 1);
    assert_eq!(local.spoken(), vec!["Hello there."]);

    running.wait_for(|e| is_state(e, TurnState::Idle)).await;
    let history = running.stop().await;
    assert_eq!(history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn every_voice_failing_keeps_the_reply_in_history() {
    let murf = ScriptedVoice::broken("murf");
    let local = ScriptedVoice::broken("local");
    let generator = ScriptedGenerator::replying("Unspoken.");
    let mut running = Running::start(
        &config(),
        providers(None, generator, chain(&[&murf, &local])),
    );

    running.send(Command::Submit("hi".into()));
    running
        .wait_for(|e| is_status(e, &Status::SpeakingError))
        .await;
    running.wait_for(|e| is_state(e, TurnState::Idle)).await;

    let history = running.stop().await;
    assert_eq!(
        history.last(),
        Some(&Utterance::assistant("Unspoken."))
    );
}

#[tokio::test(start_paused = true)]
async fn continuous_mode_listens_again_after_reply() {
    let mut config = config();
    config.conversation.continuous = true;
    let transcriber = ScriptedTranscriber::new(&[], "and then?");
    let generator = ScriptedGenerator::replying("Sure.");
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let mut running = Running::start(
        &config,
        providers(Some(transcriber.clone()), generator, chain(&[&voice])),
    );

    running.send(Command::Submit("hello".into()));
    running
        .wait_for(|e| matches!(e, RuntimeEvent::PlaybackStarted { .. }))
        .await;
    running.wait_for(|e| is_state(e, TurnState::Idle)).await;
    let idle_at = tokio::time::Instant::now();
    assert_eq!(transcriber.starts(), 0);

    running.wait_for(|e| is_status(e, &Status::Listening)).await;
    let settle = Duration::from_millis(config.conversation.settle_delay_ms);
    assert!(idle_at.elapsed() >= settle);
    assert!(idle_at.elapsed() <= settle, "restart took {:?}", idle_at.elapsed());
    assert_eq!(transcriber.starts(), 1);

    running.send(Command::CancelCapture);
    running.wait_for(|e| is_state(e, TurnState::Idle)).await;
    let history = running.stop().await;
    assert_eq!(history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn close_waits_for_the_reply() {
    let generator = ScriptedGenerator::slow("Goodbye.", Duration::from_secs(2));
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let running = Running::start(&config(), providers(None, generator, chain(&[&voice])));

    running.send(Command::Submit("see you".into()));
    let history = running.close().await;

    assert_eq!(history.len(), 2);
    assert_eq!(history.last(), Some(&Utterance::assistant("Goodbye.")));
    assert_eq!(voice.spoken(), vec!["Goodbye.".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn close_when_idle_stops_at_once() {
    let generator = ScriptedGenerator::replying("unused");
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let running = Running::start(&config(), providers(None, generator.clone(), chain(&[&voice])));

    let history = running.close().await;
    assert!(history.is_empty());
    assert!(generator.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_speaking_returns_to_idle_immediately() {
    let generator = ScriptedGenerator::replying("A very long answer.");
    let voice = ScriptedVoice::new("local", Duration::from_secs(3600));
    let mut running = Running::start(&config(), providers(None, generator, chain(&[&voice])));

    running.send(Command::Submit("go on".into()));
    running
        .wait_for(|e| matches!(e, RuntimeEvent::PlaybackStarted { .. }))
        .await;
    running.send(Command::StopSpeaking);
    running.wait_for(|e| is_state(e, TurnState::Idle)).await;

    // Nothing left to stop.
    running.send(Command::StopSpeaking);
    running.send(Command::Replay);
    running
        .wait_for(|e| matches!(e, RuntimeEvent::PlaybackStarted { .. }))
        .await;
    assert_eq!(voice.spoken(), vec!["A very long answer.", "A very long answer."]);

    let history = running.stop().await;
    assert_eq!(history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_discards_the_in_flight_reply() {
    let generator = ScriptedGenerator::slow("Reply.", Duration::from_secs(5));
    let voice = ScriptedVoice::new("local", Duration::from_millis(100));
    let mut running = Running::start(
        &config(),
        providers(None, generator.clone(), chain(&[&voice])),
    );

    running.send(Command::Submit("first".into()));
    running.wait_for(|e| is_status(e, &Status::Thinking)).await;
    running.send(Command::Clear);
    running
        .wait_for(|e| matches!(e, RuntimeEvent::HistoryCleared))
        .await;
    running.send(Command::Submit("second".into()));
    running
        .wait_for(|e| {
            matches!(e, RuntimeEvent::UtteranceAppended(u) if u.speaker == Speaker::Assistant)
        })
        .await;
    running.wait_for(|e| is_state(e, TurnState::Idle)).await;

    let history = running.stop().await;
    assert_eq!(
        history.as_slice(),
        &[Utterance::user("second"), Utterance::assistant("Reply.")]
    );
    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], vec![Utterance::user("second")]);
    assert_eq!(voice.spoken(), vec!["Reply."]);
}

#[tokio::test(start_paused = true)]
async fn generation_error_appends_nothing() {
    let generator = ScriptedGenerator::failing("HTTP 500: upstream");
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let mut running = Running::start(&config(), providers(None, generator, chain(&[&voice])));

    running.send(Command::Submit("hello".into()));
    running
        .wait_for(|e| is_status(e, &Status::GenerationError))
        .await;

    let history = running.stop().await;
    assert_eq!(history.as_slice(), &[Utterance::user("hello")]);
    assert!(voice.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn listening_without_transcriber_is_reported() {
    let generator = ScriptedGenerator::replying("unused");
    let voice = ScriptedVoice::new("local", Duration::from_secs(1));
    let mut running = Running::start(&config(), providers(None, generator, chain(&[&voice])));

    running.send(Command::StartCapture);
    running
        .wait_for(|e| is_status(e, &Status::RecognitionUnavailable))
        .await;

    let history = running.stop().await;
    assert!(history.is_empty());
}
