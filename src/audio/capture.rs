//! Microphone capture via cpal.
//!
//! A dedicated thread owns the input stream (cpal streams are not `Send`).
//! The cpal callback downmixes to mono, resamples to 16 kHz, quantizes to
//! 16-bit PCM, and pushes into the ring buffer; the owning thread forwards
//! full 1024-sample chunks to the core event channel while the gate is
//! open. `start()`/`stop()` from the session map to stream play/pause.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{error, info};

use super::ring_buffer::{sample_ring_buffer, SampleProducer};
use super::MicSource;
use crate::events::{CoreEvent, EventSender};

/// Sample rate the controller expects on `VoiceAssistantAudio`.
const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Samples per forwarded chunk (64 ms at 16 kHz, 2048 bytes of PCM).
const CHUNK_SAMPLES: usize = 1024;

/// Forwarder tick while waiting for gate commands.
const FORWARD_INTERVAL: Duration = Duration::from_millis(30);

enum CaptureCommand {
    Start,
    Stop,
}

/// Cloneable gate handle; the capture thread holds the stream.
#[derive(Clone)]
pub struct CaptureHandle {
    cmd_tx: mpsc::Sender<CaptureCommand>,
}

impl MicSource for CaptureHandle {
    fn start(&self) {
        let _ = self.cmd_tx.send(CaptureCommand::Start);
    }

    fn stop(&self) {
        let _ = self.cmd_tx.send(CaptureCommand::Stop);
    }
}

/// Spawn the capture thread and open the input device.
///
/// Returns once the stream is built, so a missing microphone surfaces at
/// startup instead of mid-session.
pub fn start_capture(
    events: EventSender,
    device_name: Option<String>,
) -> Result<CaptureHandle, String> {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (init_tx, init_rx) = mpsc::channel::<Result<(), String>>();

    std::thread::Builder::new()
        .name("mic-capture".into())
        .spawn(move || {
            let (producer, mut consumer) = sample_ring_buffer(None);
            let stream = match build_stream(device_name.as_deref(), producer) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };
            let _ = stream.pause();
            let _ = init_tx.send(Ok(()));

            let mut streaming = false;
            let mut chunk = vec![0i16; CHUNK_SAMPLES];
            loop {
                match cmd_rx.recv_timeout(FORWARD_INTERVAL) {
                    Ok(CaptureCommand::Start) => {
                        consumer.clear();
                        if let Err(e) = stream.play() {
                            error!("failed to resume input stream: {e}");
                        }
                        streaming = true;
                    }
                    Ok(CaptureCommand::Stop) => {
                        let _ = stream.pause();
                        consumer.clear();
                        streaming = false;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if !streaming {
                    continue;
                }
                while consumer.available() >= CHUNK_SAMPLES {
                    let n = consumer.pop_slice(&mut chunk);
                    let mut bytes = Vec::with_capacity(n * 2);
                    for sample in &chunk[..n] {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    if events.send(CoreEvent::MicChunk(bytes)).is_err() {
                        return; // core gone, shut the thread down
                    }
                }
            }
        })
        .map_err(|e| format!("failed to spawn capture thread: {e}"))?;

    match init_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(Ok(())) => Ok(CaptureHandle { cmd_tx }),
        Ok(Err(e)) => Err(e),
        Err(_) => Err("capture thread did not report readiness".into()),
    }
}

/// Open the input device and wire the conversion pipeline into its callback.
fn build_stream(device_name: Option<&str>, mut producer: SampleProducer) -> Result<Stream, String> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| format!("failed to enumerate input devices: {e}"))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| format!("input device not found: {name}"))?
    } else {
        host.default_input_device()
            .ok_or_else(|| "no default input device available".to_string())?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

    let default_config = device
        .default_input_config()
        .map_err(|e| format!("failed to get default input config: {e}"))?;
    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = %dev_name,
        native_rate,
        channels,
        "input device opened (resampling to {} Hz mono)",
        TARGET_SAMPLE_RATE,
    );

    let needs_resample = native_rate != TARGET_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };
                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE)
                } else {
                    mono
                };
                let pcm: Vec<i16> = resampled.iter().map(|s| quantize(*s)).collect();
                producer.push_slice(&pcm);
            },
            move |err| {
                error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| format!("failed to build input stream: {e}"))?;

    Ok(stream)
}

/// Clamp a float sample to [-1, 1] and scale to 16-bit.
fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Down-mix interleaved multi-channel audio by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear resampler, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(2.0), 32767);
        assert_eq!(quantize(-2.0), -32767);
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = [0.0, 1.0, 0.5, 0.5];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn test_resample_halves_length() {
        let input = vec![0.0f32; 320];
        let out = resample_linear(&input, 32_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.25f32, 0.5, 0.75];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }
}
