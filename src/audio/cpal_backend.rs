use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::backend::{AudioBackend, AudioFrame};
use crate::config::AudioConfig;
use crate::error::CaptureError;

/// Microphone capture backend built on cpal.
///
/// cpal streams are `!Send`, so the stream lives on a dedicated thread
/// that holds the device open until stopped; frames cross over to the
/// async side through a tokio channel.
pub struct CpalBackend {
    config: AudioConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.is_capturing() {
            return Err(CaptureError::Stream("capture already running".to_string()));
        }
        if self.config.channels != 1 {
            return Err(CaptureError::UnsupportedFormat(
                "only mono capture is supported".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let device_name = self.config.device.clone();
        let target_rate = self.config.sample_rate;

        let thread = std::thread::spawn(move || {
            capture_thread(device_name, target_rate, frame_tx, ready_tx, stop_rx);
        });

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = stop_tx.send(());
                Err(CaptureError::Stream(
                    "capture thread did not start in time".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        // Abnormal teardown still releases the device
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

fn capture_thread(
    device_name: Option<String>,
    target_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: std_mpsc::Sender<Result<(), CaptureError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_stream(device_name.as_deref(), target_rate, frame_tx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Hold the stream (and the input device) until told to stop.
    let _ = stop_rx.recv();
    drop(stream);
    info!("Audio capture stopped, device released");
}

fn open_stream(
    device_name: Option<&str>,
    target_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();

    let device = match device_name {
        None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
        Some(name) => host
            .input_devices()
            .map_err(|e| CaptureError::Stream(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
    };

    info!(
        "Input device: {}",
        device.name().unwrap_or_else(|_| "<unknown>".to_string())
    );

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;

    info!(
        "Device format: {:?}, {}Hz, {}ch",
        supported.sample_format(),
        supported.sample_rate().0,
        supported.channels()
    );

    let stream_config = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, target_rate, frame_tx)?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, target_rate, frame_tx)?
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, target_rate, frame_tx)?
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(&device, &stream_config, target_rate, frame_tx)?
        }
        other => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    target_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Sample + Send + 'static,
    <T as Sample>::Float: Into<f32>,
{
    let channels = config.channels;
    let device_rate = config.sample_rate.0;
    // Integer-ratio decimation, as close to the target as the device rate
    // allows
    let ratio = (device_rate / target_rate).max(1);
    let mut samples_sent: u64 = 0;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                let pcm: Vec<i16> = data
                    .iter()
                    .map(|&sample| {
                        let f: f32 = sample.to_float_sample().into();
                        (f.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                    })
                    .collect();

                let mono = downmix_to_mono(&pcm, channels);
                let samples = decimate(&mono, ratio);
                if samples.is_empty() {
                    return;
                }

                let timestamp_ms = samples_sent * 1000 / target_rate as u64;
                samples_sent += samples.len() as u64;

                // The capture callback must never block; a full channel
                // means the consumer is lagging and the frame is dropped.
                let _ = frame_tx.try_send(AudioFrame {
                    samples,
                    sample_rate: target_rate,
                    channels: 1,
                    timestamp_ms,
                });
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    Ok(stream)
}

/// Sum all channels into one (no division, clamped to i16 range).
fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let mut mono = Vec::with_capacity(samples.len() / channels as usize);
    for frame in samples.chunks_exact(channels as usize) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }
    mono
}

/// Downsample by taking every Nth sample.
fn decimate(samples: &[i16], ratio: u32) -> Vec<i16> {
    if ratio <= 1 {
        return samples.to_vec();
    }
    samples.iter().step_by(ratio as usize).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_sums_channels_with_clamping() {
        let stereo = vec![100, 200, -50, 25, i16::MAX, i16::MAX];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![300, -25, i16::MAX]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mono = vec![1, 2, 3];
        assert_eq!(downmix_to_mono(&mono, 1), mono);
    }

    #[test]
    fn decimation_keeps_every_nth_sample() {
        let samples = vec![0, 1, 2, 3, 4, 5, 6];
        assert_eq!(decimate(&samples, 3), vec![0, 3, 6]);
        assert_eq!(decimate(&samples, 1), samples);
    }
}
