//! Single-task driver for the turn machine.
//!
//! [`TurnCoordinator::run`] owns the [`TurnMachine`] and reacts to one
//! stream of events: user commands from [`ConversationHandle`]s and
//! completions reported by provider tasks. Provider calls never run on the
//! coordinator task itself; each is spawned with its own cancellation token
//! and reports back tagged with the id the machine gave it.

use crate::config::SpeechConfig;
use crate::error::{Result, SpeechError};
use crate::history::ConversationHistory;
use crate::llm::Generator;
use crate::pipeline::messages::{Command, TurnEvent, TurnState};
use crate::pipeline::turn::{Effect, TurnMachine, TurnSettings};
use crate::runtime::RuntimeEvent;
use crate::stt::{CaptureControl, Transcriber};
use crate::tts::SynthesisChain;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The collaborators a conversation runs against.
#[derive(Clone)]
pub struct Providers {
    /// Transcription strategy (`None` = typed input only).
    pub transcriber: Option<Arc<dyn Transcriber>>,
    /// Generation provider (`None` = turns are refused).
    pub generator: Option<Arc<dyn Generator>>,
    /// Synthesis fallback chain.
    pub synthesis: Arc<SynthesisChain>,
}

impl Providers {
    /// Whether the premium remote voice leads the synthesis chain.
    pub fn premium_voice(&self) -> bool {
        self.synthesis
            .provider_names()
            .first()
            .is_some_and(|name| name == "murf")
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("transcriber", &self.transcriber.as_ref().map(|t| t.name()))
            .field("generator", &self.generator.as_ref().map(|g| g.name()))
            .field("synthesis", &self.synthesis)
            .finish()
    }
}

/// Sends user commands to a running coordinator.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ConversationHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Channel`] once the coordinator has stopped.
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| SpeechError::Channel("conversation loop has stopped".into()))
    }
}

/// Runs one conversation.
pub struct TurnCoordinator {
    settings: TurnSettings,
    providers: Providers,
    cancel: CancellationToken,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
}

impl TurnCoordinator {
    /// Create a coordinator for `config` using `providers`.
    pub fn new(config: &SpeechConfig, providers: Providers) -> Self {
        let settings = TurnSettings {
            continuous: config.conversation.continuous,
            settle_delay: Duration::from_millis(config.conversation.settle_delay_ms),
            status_reset_delay: Duration::from_millis(config.conversation.status_reset_ms),
            has_generator: providers.generator.is_some(),
            has_transcriber: providers.transcriber.is_some(),
            premium_voice: providers.premium_voice(),
        };
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            providers,
            cancel: CancellationToken::new(),
            runtime_tx: None,
            command_tx,
            command_rx,
        }
    }

    /// Attach a runtime event broadcaster for UI/observability.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// A handle for sending commands.
    pub fn handle(&self) -> ConversationHandle {
        ConversationHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Get a clone of the cancellation token for external use.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until shut down; returns the conversation as it stood then.
    ///
    /// # Errors
    ///
    /// Currently infallible; provider failures become statuses, not errors.
    pub async fn run(self) -> Result<ConversationHistory> {
        let Self {
            settings,
            providers,
            cancel,
            runtime_tx,
            command_tx,
            mut command_rx,
        } = self;
        // Handles keep the command channel open; the coordinator's own copy must not.
        drop(command_tx);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TurnEvent>();
        let mut machine = TurnMachine::new(settings);
        let mut driver = Driver {
            providers,
            cancel: cancel.clone(),
            runtime_tx,
            events: event_tx,
            captures: HashMap::new(),
            generations: HashMap::new(),
            playbacks: HashMap::new(),
        };

        info!(
            transcriber = driver.providers.transcriber.as_ref().map(|t| t.name()),
            generator = driver.providers.generator.as_ref().map(|g| g.name()),
            voices = ?driver.providers.synthesis.provider_names(),
            "conversation started"
        );
        driver.emit(RuntimeEvent::Status(machine.status().clone()));
        driver.emit(RuntimeEvent::StateChanged(machine.state()));

        let mut closing = false;
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                command = command_rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(Command::Close) => {
                        if machine.state() == TurnState::Idle {
                            break;
                        }
                        info!(state = %machine.state(), "closing after the current turn");
                        closing = true;
                        continue;
                    }
                    Some(command) => {
                        debug!(?command, "command");
                        TurnEvent::Command(command)
                    }
                },
                Some(event) = event_rx.recv() => event,
            };
            driver.reap(&event);
            for effect in machine.handle(event) {
                driver.execute(effect);
            }
            if closing && machine.state() == TurnState::Idle {
                break;
            }
        }

        driver.release_all();
        info!(utterances = machine.history().len(), "conversation stopped");
        Ok(machine.history().clone())
    }
}

/// Executes effects and tracks what is in flight.
struct Driver {
    providers: Providers,
    cancel: CancellationToken,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    events: mpsc::UnboundedSender<TurnEvent>,
    captures: HashMap<u64, CaptureControl>,
    generations: HashMap<u64, CancellationToken>,
    playbacks: HashMap<u64, CancellationToken>,
}

impl Driver {
    fn emit(&self, event: RuntimeEvent) {
        if let Some(tx) = &self.runtime_tx {
            let _ = tx.send(event);
        }
    }

    /// Forget bookkeeping for work that has ended on its own.
    fn reap(&mut self, event: &TurnEvent) {
        match event {
            TurnEvent::Transcript { capture, event } if event.is_terminal() => {
                self.captures.remove(capture);
            }
            TurnEvent::CaptureStartFailed { capture, .. } => {
                self.captures.remove(capture);
            }
            TurnEvent::GenerationFinished { request, .. } => {
                self.generations.remove(request);
            }
            TurnEvent::SynthesisFailed { playback, .. }
            | TurnEvent::PlaybackFinished { playback, .. } => {
                self.playbacks.remove(playback);
            }
            _ => {}
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Emit(event) => self.emit(event),
            Effect::StartCapture { capture } => self.start_capture(capture),
            Effect::FinishCapture { capture } => {
                if let Some(control) = self.captures.get(&capture) {
                    control.finish();
                }
            }
            Effect::AbortCapture { capture } => {
                if let Some(control) = self.captures.remove(&capture) {
                    control.abort();
                }
            }
            Effect::Generate { request, history } => self.generate(request, history),
            Effect::CancelGeneration { request } => {
                if let Some(token) = self.generations.remove(&request) {
                    token.cancel();
                }
            }
            Effect::Speak { playback, text } => self.speak(playback, text),
            Effect::StopPlayback { playback } => {
                if let Some(token) = self.playbacks.remove(&playback) {
                    token.cancel();
                }
            }
            Effect::ScheduleRearm { epoch, delay } => {
                self.after(delay, TurnEvent::RearmDue { epoch });
            }
            Effect::ScheduleStatusReset { epoch, delay } => {
                self.after(delay, TurnEvent::StatusResetDue { epoch });
            }
        }
    }

    fn start_capture(&mut self, capture: u64) {
        let control = CaptureControl::default();
        self.captures.insert(capture, control.clone());
        let events = self.events.clone();
        let Some(transcriber) = self.providers.transcriber.clone() else {
            let _ = events.send(TurnEvent::CaptureStartFailed {
                capture,
                error: "no transcription strategy".into(),
            });
            return;
        };

        tokio::spawn(async move {
            let mut session = match transcriber.start().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(capture, error = %e, "capture failed to start");
                    let _ = events.send(TurnEvent::CaptureStartFailed {
                        capture,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            if control.is_aborted() {
                session.abort();
                return;
            }
            debug!(capture, strategy = transcriber.name(), "capture started");

            let mut finishing = false;
            loop {
                tokio::select! {
                    biased;
                    () = control.abort_requested() => {
                        session.abort();
                        return;
                    }
                    () = control.finish_requested(), if !finishing => {
                        finishing = true;
                        session.finish();
                    }
                    event = session.next_event() => match event {
                        Some(event) => {
                            let terminal = event.is_terminal();
                            let _ = events.send(TurnEvent::Transcript { capture, event });
                            if terminal {
                                return;
                            }
                        }
                        None => {
                            let _ = events.send(TurnEvent::Transcript {
                                capture,
                                event: crate::stt::TranscriptEvent::ServiceError(
                                    "capture ended without a result".into(),
                                ),
                            });
                            return;
                        }
                    },
                }
            }
        });
    }

    fn generate(&mut self, request: u64, history: Vec<crate::history::Utterance>) {
        let token = self.cancel.child_token();
        self.generations.insert(request, token.clone());
        let events = self.events.clone();
        let Some(generator) = self.providers.generator.clone() else {
            let _ = events.send(TurnEvent::GenerationFinished {
                request,
                result: Err(SpeechError::Config("Groq API key not configured".into())),
            });
            return;
        };

        tokio::spawn(async move {
            let result = generator.generate(&history, &token).await;
            if let Err(e) = &result {
                if e.is_failure() {
                    warn!(request, error = %e, "generation request failed");
                }
            }
            let _ = events.send(TurnEvent::GenerationFinished { request, result });
        });
    }

    fn speak(&mut self, playback: u64, text: String) {
        let token = self.cancel.child_token();
        self.playbacks.insert(playback, token.clone());
        let events = self.events.clone();
        let synthesis = Arc::clone(&self.providers.synthesis);

        tokio::spawn(async move {
            let handle = match synthesis.speak(&text, &token).await {
                Ok(handle) => handle,
                Err(SpeechError::Cancelled) => {
                    let _ = events.send(TurnEvent::PlaybackFinished {
                        playback,
                        outcome: crate::audio::PlaybackOutcome::Stopped,
                    });
                    return;
                }
                Err(e) => {
                    let _ = events.send(TurnEvent::SynthesisFailed {
                        playback,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            let _ = events.send(TurnEvent::SynthesisStarted {
                playback,
                provider: handle.source().to_owned(),
            });

            let stopper = handle.stopper();
            let wait = handle.wait();
            tokio::pin!(wait);
            let outcome = tokio::select! {
                outcome = &mut wait => outcome,
                () = token.cancelled() => {
                    stopper.cancel();
                    wait.await
                }
            };
            debug!(playback, ?outcome, "playback ended");
            let _ = events.send(TurnEvent::PlaybackFinished { playback, outcome });
        });
    }

    fn after(&self, delay: Duration, event: TurnEvent) {
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = events.send(event);
                }
            }
        });
    }

    fn release_all(&mut self) {
        for (_, control) in self.captures.drain() {
            control.abort();
        }
        for (_, token) in self.generations.drain() {
            token.cancel();
        }
        for (_, token) in self.playbacks.drain() {
            token.cancel();
        }
        self.providers.synthesis.stop();
    }
}
