//! The turn state machine.
//!
//! [`TurnMachine`] owns the conversation history and every piece of turn
//! state. It performs no I/O: each [`TurnEvent`] is folded into the state
//! and answered with a list of [`Effect`]s for the coordinator to execute.
//!
//! At most one of {capture, generation, playback} is active at a time. Each
//! is identified by an id drawn from one counter; completions carrying an id
//! that is no longer active are dropped, which is how stop and cancel win
//! races against late provider results.

use crate::audio::PlaybackOutcome;
use crate::history::{ConversationHistory, Utterance};
use crate::llm::Generation;
use crate::pipeline::messages::{Command, Status, TurnEvent, TurnState};
use crate::runtime::RuntimeEvent;
use crate::stt::TranscriptEvent;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Work the coordinator must carry out on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a capture session.
    StartCapture {
        /// Capture id.
        capture: u64,
    },
    /// Ask the capture session to finalize its transcript.
    FinishCapture {
        /// Capture id.
        capture: u64,
    },
    /// Tear down the capture session without a result.
    AbortCapture {
        /// Capture id.
        capture: u64,
    },
    /// Request the next assistant utterance.
    Generate {
        /// Generation request id.
        request: u64,
        /// Full conversation so far, ending with the user's utterance.
        history: Vec<Utterance>,
    },
    /// Signal cancellation to an in-flight generation.
    CancelGeneration {
        /// Generation request id.
        request: u64,
    },
    /// Speak text through the synthesis chain.
    Speak {
        /// Playback id.
        playback: u64,
        /// Text to speak.
        text: String,
    },
    /// Silence a synthesis request or its playback.
    StopPlayback {
        /// Playback id.
        playback: u64,
    },
    /// Deliver [`TurnEvent::RearmDue`] after `delay`.
    ScheduleRearm {
        /// Epoch to echo back.
        epoch: u64,
        /// Settle delay.
        delay: Duration,
    },
    /// Deliver [`TurnEvent::StatusResetDue`] after `delay`.
    ScheduleStatusReset {
        /// Epoch to echo back.
        epoch: u64,
        /// How long the transient status stays visible.
        delay: Duration,
    },
    /// Publish a runtime event.
    Emit(RuntimeEvent),
}

/// Static inputs to the machine, decided at startup.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Start with continuous listening on.
    pub continuous: bool,
    /// Pause between the end of a reply and re-armed capture.
    pub settle_delay: Duration,
    /// Display time of transient statuses.
    pub status_reset_delay: Duration,
    /// Whether a generation provider is configured.
    pub has_generator: bool,
    /// Whether a transcription strategy is available.
    pub has_transcriber: bool,
    /// Whether the premium remote voice is configured.
    pub premium_voice: bool,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            continuous: false,
            settle_delay: Duration::from_millis(500),
            status_reset_delay: Duration::from_millis(2_000),
            has_generator: true,
            has_transcriber: true,
            premium_voice: false,
        }
    }
}

/// Single source of truth for turn-taking.
#[derive(Debug)]
pub struct TurnMachine {
    settings: TurnSettings,
    state: TurnState,
    history: ConversationHistory,
    continuous: bool,
    next_id: u64,
    capture: Option<u64>,
    generation: Option<u64>,
    playback: Option<u64>,
    rearm_epoch: u64,
    status: Status,
    status_epoch: u64,
    transcript: String,
    last_response: Option<String>,
}

impl TurnMachine {
    /// Create an idle machine with an empty conversation.
    pub fn new(settings: TurnSettings) -> Self {
        let continuous = settings.continuous;
        let mut machine = Self {
            settings,
            state: TurnState::Idle,
            history: ConversationHistory::new(),
            continuous,
            next_id: 0,
            capture: None,
            generation: None,
            playback: None,
            rearm_epoch: 0,
            status: Status::MissingGenerator,
            status_epoch: 0,
            transcript: String::new(),
            last_response: None,
        };
        machine.status = machine.ready_status();
        machine
    }

    /// Current turn state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Current status line.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Conversation so far.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Latest interim or final transcript.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Most recent assistant reply.
    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Whether continuous listening is on.
    pub fn continuous(&self) -> bool {
        self.continuous
    }

    /// Active capture id.
    pub fn active_capture(&self) -> Option<u64> {
        self.capture
    }

    /// Active generation request id.
    pub fn active_generation(&self) -> Option<u64> {
        self.generation
    }

    /// Active playback id.
    pub fn active_playback(&self) -> Option<u64> {
        self.playback
    }

    /// Fold one event into the state.
    pub fn handle(&mut self, event: TurnEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            TurnEvent::Command(command) => self.on_command(command, &mut effects),
            TurnEvent::Transcript { capture, event } => {
                self.on_transcript(capture, event, &mut effects);
            }
            TurnEvent::CaptureStartFailed { capture, error } => {
                if self.capture == Some(capture) {
                    warn!(capture, %error, "capture failed to start");
                    self.capture = None;
                    self.set_state(TurnState::Idle, &mut effects);
                    self.set_status(Status::MicrophoneError, &mut effects);
                }
            }
            TurnEvent::GenerationFinished { request, result } => {
                self.on_generation(request, result, &mut effects);
            }
            TurnEvent::SynthesisStarted { playback, provider } => {
                if self.playback == Some(playback) {
                    effects.push(Effect::Emit(RuntimeEvent::PlaybackStarted { provider }));
                }
            }
            TurnEvent::SynthesisFailed { playback, error } => {
                if self.playback == Some(playback) {
                    warn!(playback, %error, "speech synthesis failed");
                    self.playback = None;
                    self.set_status(Status::SpeakingError, &mut effects);
                    self.finish_speaking(&mut effects);
                }
            }
            TurnEvent::PlaybackFinished { playback, outcome } => {
                if self.playback == Some(playback) {
                    self.playback = None;
                    match outcome {
                        PlaybackOutcome::Failed(error) => {
                            warn!(playback, %error, "playback failed");
                            self.set_status(Status::SpeakingError, &mut effects);
                        }
                        PlaybackOutcome::Completed | PlaybackOutcome::Stopped => {
                            let ready = self.ready_status();
                            self.set_status(ready, &mut effects);
                        }
                    }
                    self.finish_speaking(&mut effects);
                }
            }
            TurnEvent::RearmDue { epoch } => {
                if epoch == self.rearm_epoch && self.continuous && self.state == TurnState::Idle {
                    debug!(epoch, "re-arming capture");
                    self.start_capture(&mut effects);
                }
            }
            TurnEvent::StatusResetDue { epoch } => {
                if epoch == self.status_epoch {
                    let ready = self.ready_status();
                    self.set_status(ready, &mut effects);
                }
            }
        }
        effects
    }

    fn on_command(&mut self, command: Command, effects: &mut Vec<Effect>) {
        match command {
            Command::StartCapture => {
                if self.state != TurnState::Idle {
                    debug!(state = %self.state, "capture start ignored");
                    return;
                }
                self.invalidate_rearm();
                self.start_capture(effects);
            }
            Command::FinishCapture => {
                if let Some(capture) = self.capture {
                    self.set_status(Status::Processing, effects);
                    effects.push(Effect::FinishCapture { capture });
                }
            }
            Command::CancelCapture => {
                if let Some(capture) = self.capture.take() {
                    info!(capture, "capture cancelled");
                    effects.push(Effect::AbortCapture { capture });
                    self.invalidate_rearm();
                    self.set_state(TurnState::Idle, effects);
                    let ready = self.ready_status();
                    self.set_status(ready, effects);
                }
            }
            Command::Submit(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                if self.state != TurnState::Idle {
                    debug!(state = %self.state, "typed input ignored");
                    return;
                }
                if !self.settings.has_generator {
                    self.set_status(Status::MissingGenerator, effects);
                    return;
                }
                self.invalidate_rearm();
                self.transcript = text.to_owned();
                self.begin_generation(text.to_owned(), effects);
            }
            Command::StopGeneration => {
                if let Some(request) = self.generation.take() {
                    info!(request, "generation stopped by user");
                    effects.push(Effect::CancelGeneration { request });
                    self.set_state(TurnState::Idle, effects);
                    self.set_status(Status::GenerationStopped, effects);
                }
            }
            Command::StopSpeaking => {
                if let Some(playback) = self.playback.take() {
                    info!(playback, "speech stopped by user");
                    effects.push(Effect::StopPlayback { playback });
                    let ready = self.ready_status();
                    self.set_status(ready, effects);
                    self.finish_speaking(effects);
                }
            }
            Command::Replay => {
                if self.state != TurnState::Idle {
                    return;
                }
                if let Some(text) = self.last_response.clone() {
                    self.invalidate_rearm();
                    self.start_speaking(text, effects);
                }
            }
            Command::Clear => {
                if let Some(capture) = self.capture.take() {
                    effects.push(Effect::AbortCapture { capture });
                }
                if let Some(request) = self.generation.take() {
                    effects.push(Effect::CancelGeneration { request });
                }
                if let Some(playback) = self.playback.take() {
                    effects.push(Effect::StopPlayback { playback });
                }
                self.invalidate_rearm();
                self.history.clear();
                self.transcript.clear();
                self.last_response = None;
                info!("conversation cleared");
                self.set_state(TurnState::Idle, effects);
                effects.push(Effect::Emit(RuntimeEvent::HistoryCleared));
                let ready = self.ready_status();
                self.set_status(ready, effects);
            }
            Command::SetContinuous(on) => {
                self.invalidate_rearm();
                if self.continuous != on {
                    self.continuous = on;
                    info!(continuous = on, "continuous mode changed");
                    effects.push(Effect::Emit(RuntimeEvent::ContinuousChanged(on)));
                }
            }
            Command::Close | Command::Shutdown => {}
        }
    }

    fn on_transcript(&mut self, capture: u64, event: TranscriptEvent, effects: &mut Vec<Effect>) {
        if self.capture != Some(capture) {
            debug!(capture, "stale transcript event dropped");
            return;
        }
        match event {
            TranscriptEvent::Interim(text) => {
                self.transcript.clone_from(&text);
                effects.push(Effect::Emit(RuntimeEvent::Transcript {
                    text,
                    is_final: false,
                }));
            }
            TranscriptEvent::Final(text) => {
                self.capture = None;
                let text = text.trim().to_owned();
                if text.is_empty() {
                    self.no_speech(effects);
                    return;
                }
                info!(capture, chars = text.len(), "transcription final");
                self.transcript.clone_from(&text);
                effects.push(Effect::Emit(RuntimeEvent::Transcript {
                    text: text.clone(),
                    is_final: true,
                }));
                if self.settings.has_generator {
                    self.begin_generation(text, effects);
                } else {
                    self.set_state(TurnState::Idle, effects);
                    self.set_status(Status::MissingGenerator, effects);
                }
            }
            TranscriptEvent::Empty => {
                self.capture = None;
                self.no_speech(effects);
            }
            TranscriptEvent::RecognizerError(code) => {
                warn!(capture, %code, "recognizer error");
                self.capture = None;
                self.set_state(TurnState::Idle, effects);
                self.set_status(Status::RecognizerError(code), effects);
            }
            TranscriptEvent::ServiceError(error) => {
                warn!(capture, %error, "transcription failed");
                self.capture = None;
                self.set_state(TurnState::Idle, effects);
                self.set_status(Status::TranscriptionError, effects);
            }
        }
    }

    fn on_generation(
        &mut self,
        request: u64,
        result: crate::Result<Generation>,
        effects: &mut Vec<Effect>,
    ) {
        if self.generation != Some(request) {
            debug!(request, "stale generation result dropped");
            return;
        }
        self.generation = None;
        match result {
            Ok(Generation::Reply(text)) => {
                let utterance = Utterance::assistant(text.clone());
                self.history.append(utterance.clone());
                effects.push(Effect::Emit(RuntimeEvent::UtteranceAppended(utterance)));
                self.last_response = Some(text.clone());
                self.start_speaking(text, effects);
            }
            Ok(Generation::Cancelled) | Err(crate::SpeechError::Cancelled) => {
                self.set_state(TurnState::Idle, effects);
                self.set_status(Status::GenerationStopped, effects);
            }
            Err(e) => {
                warn!(request, error = %e, "generation failed");
                self.set_state(TurnState::Idle, effects);
                self.set_status(Status::GenerationError, effects);
            }
        }
    }

    fn start_capture(&mut self, effects: &mut Vec<Effect>) {
        if !self.settings.has_generator {
            self.set_status(Status::MissingGenerator, effects);
            return;
        }
        if !self.settings.has_transcriber {
            self.set_status(Status::RecognitionUnavailable, effects);
            return;
        }
        let capture = self.allocate_id();
        self.capture = Some(capture);
        self.transcript.clear();
        self.set_state(TurnState::Listening, effects);
        self.set_status(Status::Listening, effects);
        effects.push(Effect::StartCapture { capture });
    }

    fn begin_generation(&mut self, text: String, effects: &mut Vec<Effect>) {
        let utterance = Utterance::user(text);
        self.history.append(utterance.clone());
        effects.push(Effect::Emit(RuntimeEvent::UtteranceAppended(utterance)));
        let request = self.allocate_id();
        self.generation = Some(request);
        self.set_state(TurnState::Thinking, effects);
        self.set_status(Status::Thinking, effects);
        effects.push(Effect::Generate {
            request,
            history: self.history.snapshot(),
        });
    }

    fn start_speaking(&mut self, text: String, effects: &mut Vec<Effect>) {
        let playback = self.allocate_id();
        self.playback = Some(playback);
        self.set_state(TurnState::Speaking, effects);
        self.set_status(Status::Speaking, effects);
        effects.push(Effect::Speak { playback, text });
    }

    /// Leave SPEAKING; schedules capture when continuous mode is on and
    /// there is something to listen with.
    fn finish_speaking(&mut self, effects: &mut Vec<Effect>) {
        self.set_state(TurnState::Idle, effects);
        if self.continuous && self.settings.has_transcriber {
            self.rearm_epoch += 1;
            effects.push(Effect::ScheduleRearm {
                epoch: self.rearm_epoch,
                delay: self.settings.settle_delay,
            });
        }
    }

    fn no_speech(&mut self, effects: &mut Vec<Effect>) {
        info!("no speech detected");
        self.set_state(TurnState::Idle, effects);
        self.set_status(Status::NoSpeech, effects);
    }

    fn invalidate_rearm(&mut self) {
        self.rearm_epoch += 1;
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ready_status(&self) -> Status {
        if self.settings.has_generator {
            Status::Ready {
                premium_voice: self.settings.premium_voice,
            }
        } else {
            Status::MissingGenerator
        }
    }

    fn set_state(&mut self, state: TurnState, effects: &mut Vec<Effect>) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "turn state");
            self.state = state;
            effects.push(Effect::Emit(RuntimeEvent::StateChanged(state)));
        }
    }

    fn set_status(&mut self, status: Status, effects: &mut Vec<Effect>) {
        self.status_epoch += 1;
        self.status = status.clone();
        let transient = status == Status::GenerationStopped;
        effects.push(Effect::Emit(RuntimeEvent::Status(status)));
        if transient {
            effects.push(Effect::ScheduleStatusReset {
                epoch: self.status_epoch,
                delay: self.settings.status_reset_delay,
            });
        }
    }
}
