//! Microphone recording using cpal.
//!
//! Captures at the device's native sample rate, downsamples to the
//! configured input rate, and hands the clip over as 16-bit mono WAV.

use crate::audio::{AudioRecorder, RecordedClip, Recording};
use crate::config::AudioConfig;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use bytes::Bytes;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{error, info};

/// Records from a cpal input device.
#[derive(Debug, Clone)]
pub struct CpalRecorder {
    device_name: Option<String>,
    target_sample_rate: u32,
}

impl CpalRecorder {
    /// Create a recorder for the configured input device.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.input_device.clone(),
            target_sample_rate: config.input_sample_rate,
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
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

fn open_input(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        host.input_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SpeechError::Audio(format!("input device '{name}' not found")))
    } else {
        host.default_input_device()
            .ok_or_else(|| SpeechError::Audio("no default input device".into()))
    }
}

#[async_trait]
impl AudioRecorder for CpalRecorder {
    fn name(&self) -> &str {
        "cpal"
    }

    async fn start(&self) -> Result<Box<dyn Recording>> {
        let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let target_rate = self.target_sample_rate;
        let sink = Arc::clone(&samples);

        // cpal streams are not Send; the stream lives on its own thread.
        let thread = std::thread::spawn(move || {
            let stream = match build_input_stream(device_name.as_deref(), target_rate, sink) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
            info!("audio capture stopped");
        });

        ready_rx
            .await
            .map_err(|_| SpeechError::Audio("capture thread exited".into()))??;

        Ok(Box::new(CpalRecording {
            samples,
            sample_rate: target_rate,
            stop: stop_tx,
            thread: Some(thread),
        }))
    }
}

fn build_input_stream(
    device_name: Option<&str>,
    target_rate: u32,
    sink: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream> {
    let device = open_input(device_name)?;
    let default_config = device
        .default_input_config()
        .map_err(|e| SpeechError::Audio(format!("no default input config: {e}")))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if native_channels > 1 {
                    to_mono(data, native_channels)
                } else {
                    data.to_vec()
                };
                let resampled = downsample(&mono, native_rate, target_rate);
                if let Ok(mut buf) = sink.lock() {
                    buf.extend_from_slice(&resampled);
                }
            },
            move |err| {
                error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start input stream: {e}")))?;

    info!(
        "audio capture started: native {}Hz -> target {}Hz",
        native_rate, target_rate
    );
    Ok(stream)
}

struct CpalRecording {
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    stop: std::sync::mpsc::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalRecording {
    async fn stop_stream(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }
    }
}

#[async_trait]
impl Recording for CpalRecording {
    async fn finish(self: Box<Self>) -> Result<RecordedClip> {
        let mut this = self;
        this.stop_stream().await;
        let samples = this
            .samples
            .lock()
            .map_err(|e| SpeechError::Audio(format!("capture buffer lock poisoned: {e}")))?
            .split_off(0);
        if samples.is_empty() {
            return Ok(RecordedClip { bytes: Bytes::new() });
        }
        let bytes = encode_wav(&samples, this.sample_rate)?;
        Ok(RecordedClip {
            bytes: Bytes::from(bytes),
        })
    }

    async fn abort(self: Box<Self>) {
        let mut this = self;
        this.stop_stream().await;
    }
}

/// Encode mono f32 samples as 16-bit PCM WAV.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SpeechError::Audio(format!("wav encode: {e}")))?;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(v)
                .map_err(|e| SpeechError::Audio(format!("wav encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SpeechError::Audio(format!("wav encode: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub(crate) fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels.max(1) as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation resampler.
///
/// Adequate for speech: energy sits below 8kHz, so no anti-alias filter is
/// applied when going from 48kHz to 16kHz.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}
