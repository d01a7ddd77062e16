//! Audio playback to system speakers via cpal.
//!
//! Clips are decoded with symphonia (MP3 or WAV) and played mono at their
//! own sample rate.

use crate::audio::capture::to_mono;
use crate::audio::{AudioPlayer, PlaybackHandle, PlaybackOutcome};
use crate::config::AudioConfig;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use bytes::Bytes;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as DecodeError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Plays clips on a cpal output device.
#[derive(Debug, Clone)]
pub struct CpalPlayer {
    device_name: Option<String>,
}

impl CpalPlayer {
    /// Create a player for the configured output device.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.output_device.clone(),
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

fn open_output(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        host.output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SpeechError::Audio(format!("output device '{name}' not found")))
    } else {
        host.default_output_device()
            .ok_or_else(|| SpeechError::Audio("no default output device".into()))
    }
}

#[async_trait]
impl AudioPlayer for CpalPlayer {
    fn name(&self) -> &str {
        "cpal"
    }

    async fn play(&self, audio: Bytes) -> Result<PlaybackHandle> {
        let (samples, sample_rate) = tokio::task::spawn_blocking(move || decode(&audio))
            .await
            .map_err(|e| SpeechError::Audio(format!("decoder task failed: {e}")))??;

        let stop = CancellationToken::new();
        let (started_tx, started_rx) = oneshot::channel::<Result<()>>();
        let (done_tx, done_rx) = oneshot::channel();
        let device_name = self.device_name.clone();
        let token = stop.clone();

        std::thread::spawn(move || {
            let outcome = play_blocking(device_name.as_deref(), samples, sample_rate, &token, started_tx);
            let _ = done_tx.send(outcome);
        });

        started_rx
            .await
            .map_err(|_| SpeechError::Audio("playback thread exited".into()))??;
        Ok(PlaybackHandle::new("cpal", stop, done_rx))
    }
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

fn play_blocking(
    device_name: Option<&str>,
    samples: Vec<f32>,
    sample_rate: u32,
    stop: &CancellationToken,
    started: oneshot::Sender<Result<()>>,
) -> PlaybackOutcome {
    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples,
        position: 0,
        finished: false,
    }));

    let stream = match build_output_stream(device_name, sample_rate, Arc::clone(&buffer)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = started.send(Err(e));
            return PlaybackOutcome::Failed("output stream not started".into());
        }
    };
    let _ = started.send(Ok(()));

    loop {
        std::thread::sleep(Duration::from_millis(10));
        if stop.is_cancelled() {
            drop(stream);
            return PlaybackOutcome::Stopped;
        }
        match buffer.lock() {
            Ok(buf) if buf.finished => break,
            Ok(_) => {}
            Err(e) => return PlaybackOutcome::Failed(format!("playback buffer lock poisoned: {e}")),
        }
    }

    drop(stream);
    PlaybackOutcome::Completed
}

fn build_output_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    buffer: Arc<Mutex<PlaybackBuffer>>,
) -> Result<cpal::Stream> {
    let device = open_output(device_name)?;
    let device_label = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_label}");

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut buf = match buffer.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };

                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start output stream: {e}")))?;
    Ok(stream)
}

/// Decode an encoded clip into mono f32 samples and its sample rate.
fn decode(audio: &[u8]) -> Result<(Vec<f32>, u32)> {
    let cursor = std::io::Cursor::new(audio.to_vec());
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());
    let detected = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SpeechError::Audio(format!("unrecognized audio format: {e}")))?;
    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SpeechError::Audio("no audio track".into()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let mut sample_rate = params.sample_rate.unwrap_or(24_000);
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| SpeechError::Audio(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(DecodeError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SpeechError::Audio(format!("read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(DecodeError::DecodeError(_)) => continue,
            Err(e) => return Err(SpeechError::Audio(format!("decode: {e}"))),
        };
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count() as u16;
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        if channels > 1 {
            samples.extend(to_mono(buf.samples(), channels));
        } else {
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(SpeechError::Audio("clip decoded to silence".into()));
    }
    Ok((samples, sample_rate))
}
