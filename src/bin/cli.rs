//! CLI binary for talkback.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use talkback::credentials::{EnvCredentialSource, LoadedCredentials, load_all_credentials};
use talkback::startup::{AudioIo, build_providers, detect_audio};
use talkback::{Command, RuntimeEvent, SpeechConfig, Speaker, TurnCoordinator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Talkback: a voice conversation with an LLM.
#[derive(Parser)]
#[command(name = "talkback", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<CliCommand>,
}

/// Available commands.
#[derive(Subcommand)]
enum CliCommand {
    /// Start a conversation (the default).
    Chat {
        /// Re-arm the microphone after every reply.
        #[arg(long)]
        continuous: bool,
    },

    /// List audio devices or audio commands.
    Devices,

    /// Report which providers are available.
    Check,
}

const HELP: &str = "\
Type a message and press Enter to send it. Commands:
  /listen          start listening
  /done            finish listening and send what was heard
  /cancel          stop listening without sending
  /stop            stop a reply being generated
  /hush            stop speaking
  /again           say the last reply again
  /clear           forget the conversation
  /continuous on   listen again after each reply (or off)
  /quit            exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is the conversation.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("talkback=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let credentials = load_all_credentials(&config, &EnvCredentialSource::with_dotenv());

    match cli.command.unwrap_or(CliCommand::Chat { continuous: false }) {
        CliCommand::Chat { continuous } => run_chat(config, credentials, continuous).await,
        CliCommand::Devices => list_devices(&config),
        CliCommand::Check => check(&config, &credentials),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<SpeechConfig> {
    if let Some(path) = path {
        return Ok(SpeechConfig::from_file(path)?);
    }
    let default_path = SpeechConfig::default_config_path();
    if default_path.exists() {
        info!(path = %default_path.display(), "loading config");
        Ok(SpeechConfig::from_file(&default_path)?)
    } else {
        Ok(SpeechConfig::default())
    }
}

async fn run_chat(
    mut config: SpeechConfig,
    credentials: LoadedCredentials,
    continuous: bool,
) -> anyhow::Result<()> {
    println!("Talkback v{}", env!("CARGO_PKG_VERSION"));
    config.conversation.continuous |= continuous;

    let audio = detect_audio(&config.audio);
    let providers = build_providers(&config, &credentials, &audio)?;
    let can_listen = providers.transcriber.is_some();

    let (runtime_tx, runtime_rx) = broadcast::channel(64);
    let coordinator = TurnCoordinator::new(&config, providers).with_runtime_events(runtime_tx);
    let handle = coordinator.handle();
    let cancel = coordinator.cancel_token();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    tokio::spawn(print_events(runtime_rx));

    println!("\n{HELP}");
    if !can_listen {
        println!("\nNo speech recognition available; typed input only.");
    }
    println!();

    let input_handle = handle.clone();
    let input_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                () = input_cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                // EOF or unreadable stdin ends the conversation once the
                // turn in flight has been answered.
                Ok(None) | Err(_) => {
                    let _ = input_handle.send(Command::Close);
                    break;
                }
            };
            match parse_line(&line) {
                Some(Ok(command)) => {
                    let quit = command == Command::Shutdown;
                    if input_handle.send(command).is_err() || quit {
                        break;
                    }
                }
                Some(Err(message)) => println!("{message}"),
                None => {}
            }
        }
    });

    let history = coordinator.run().await?;
    info!(utterances = history.len(), "conversation ended");
    Ok(())
}

/// Map one line of input to a command.
///
/// `None` for blank lines; `Some(Err(_))` carries a message for the user.
fn parse_line(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Ok(Command::Submit(line.to_owned())));
    }
    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();
    let command = match (name, arg) {
        ("/listen", None) => Command::StartCapture,
        ("/done", None) => Command::FinishCapture,
        ("/cancel", None) => Command::CancelCapture,
        ("/stop", None) => Command::StopGeneration,
        ("/hush", None) => Command::StopSpeaking,
        ("/again", None) => Command::Replay,
        ("/clear", None) => Command::Clear,
        ("/continuous", Some("on")) => Command::SetContinuous(true),
        ("/continuous", Some("off")) => Command::SetContinuous(false),
        ("/quit", None) => Command::Shutdown,
        ("/help", None) => return Some(Err(HELP.to_owned())),
        _ => return Some(Err(format!("Unknown command: {line} (try /help)"))),
    };
    Some(Ok(command))
}

async fn print_events(mut rx: broadcast::Receiver<RuntimeEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event display lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &RuntimeEvent) {
    match event {
        RuntimeEvent::Status(status) => println!("[{status}]"),
        RuntimeEvent::Transcript {
            text,
            is_final: false,
        } => println!("  ... {text}"),
        RuntimeEvent::UtteranceAppended(utterance) => match utterance.speaker {
            Speaker::User => println!("You: {}", utterance.text),
            Speaker::Assistant => println!("Assistant: {}", utterance.text),
        },
        RuntimeEvent::HistoryCleared => println!("(conversation cleared)"),
        RuntimeEvent::ContinuousChanged(on) => {
            println!("(continuous listening {})", if *on { "on" } else { "off" });
        }
        RuntimeEvent::PlaybackStarted { provider } => {
            tracing::debug!(%provider, "speaking");
        }
        RuntimeEvent::StateChanged(_) | RuntimeEvent::Transcript { .. } => {}
    }
}

#[cfg(feature = "native-audio")]
fn list_devices(_config: &SpeechConfig) -> anyhow::Result<()> {
    use talkback::audio::capture::CpalRecorder;
    use talkback::audio::playback::CpalPlayer;

    println!("Input devices:");
    for name in CpalRecorder::list_input_devices()? {
        println!("  - {name}");
    }

    println!("\nOutput devices:");
    for name in CpalPlayer::list_output_devices()? {
        println!("  - {name}");
    }

    Ok(())
}

#[cfg(not(feature = "native-audio"))]
fn list_devices(config: &SpeechConfig) -> anyhow::Result<()> {
    let audio = detect_audio(&config.audio);
    println!("Built without native audio; using commands.");
    println!(
        "  record: {} ({})",
        config.audio.record_command.join(" "),
        found(audio.recorder.is_some())
    );
    println!(
        "  play:   {} ({})",
        config.audio.play_command.join(" "),
        found(audio.player.is_some())
    );
    Ok(())
}

fn check(config: &SpeechConfig, credentials: &LoadedCredentials) -> anyhow::Result<()> {
    let audio: AudioIo = detect_audio(&config.audio);
    println!("Generation (Groq):        {}", configured(credentials.has_llm()));
    println!("Transcription (Deepgram): {}", configured(credentials.has_stt()));
    println!("Voice (Murf):             {}", configured(credentials.has_tts()));
    println!("Recorder:                 {}", found(audio.recorder.is_some()));
    println!("Player:                   {}", found(audio.player.is_some()));

    match build_providers(config, credentials, &audio) {
        Ok(providers) => {
            println!(
                "Speech recognition:       {}",
                providers
                    .transcriber
                    .as_ref()
                    .map_or("unavailable", |t| t.name())
            );
            println!(
                "Voices:                   {}",
                providers.synthesis.provider_names().join(" -> ")
            );
        }
        Err(e) => println!("\n{e}"),
    }
    Ok(())
}

fn configured(yes: bool) -> &'static str {
    if yes { "configured" } else { "not configured" }
}

fn found(yes: bool) -> &'static str {
    if yes { "found" } else { "not found" }
}
