//! Talkback: a voice conversation turn orchestrator.
//!
//! One user turn is cascaded through independent providers:
//! Microphone → STT → LLM → TTS → Speaker
//!
//! # Architecture
//!
//! - **Turn machine**: a pure state machine ([`pipeline::turn::TurnMachine`])
//!   that maps commands and provider completions to effects
//! - **Coordinator**: a single async task ([`TurnCoordinator`]) that owns the
//!   machine, runs its effects and drops stale completions
//! - **STT**: a local recognizer command or Deepgram over HTTP
//! - **LLM**: Groq's OpenAI-compatible chat completions
//! - **TTS**: Murf over HTTP with a local `espeak-ng` fallback
//! - **Audio**: record/play commands, or `cpal` with the `native-audio` feature

pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod history;
mod http;
pub mod llm;
pub mod pipeline;
pub mod runtime;
pub mod startup;
pub mod stt;
pub mod tts;

pub use config::SpeechConfig;
pub use error::{Result, SpeechError};
pub use history::{ConversationHistory, Speaker, Utterance};
pub use pipeline::coordinator::{ConversationHandle, Providers, TurnCoordinator};
pub use pipeline::messages::{Command, Status, TurnState};
pub use runtime::RuntimeEvent;
