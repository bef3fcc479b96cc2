//! Microphone capture.
//!
//! Opens the default input device in mono at the configured sample rate
//! and streams each callback's samples, converted to 16-bit little-endian
//! PCM, into a bounded channel consumed by the session loop. When the
//! channel is full the newest frame is dropped; live transcription would
//! rather lose audio than fall behind it.
//!
//! The returned [`CaptureHandle`] owns the device stream; capture stops
//! when it is dropped. `cpal` streams are not `Send`, so the handle must
//! stay on the thread that created it.

use anyhow::{Context, Result};
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::mpsc;

const CHANNELS: u16 = 1;
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Keeps the input stream alive for the duration of a session.
pub struct CaptureHandle {
    _stream: Stream,
}

/// Start capturing from the default input device.
///
/// Returns the handle that owns the stream and the receiving end of the
/// frame channel. Closing the receiver (or dropping the handle) ends the
/// capture.
pub fn start_capture(sample_rate: u32) -> Result<(CaptureHandle, mpsc::Receiver<Bytes>)> {
    let device = cpal::default_host()
        .default_input_device()
        .context("no input device available")?;

    let config = StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &_| {
                let frame = pcm_frame(data);
                if tx.try_send(frame).is_err() {
                    tracing::trace!("frame channel full, dropping frame");
                }
            },
            |e| tracing::warn!(error = %e, "input stream error"),
            None,
        )
        .context("failed to build input stream")?;

    stream.play().context("failed to start input stream")?;
    tracing::debug!(sample_rate, "microphone capture started");

    Ok((CaptureHandle { _stream: stream }, rx))
}

/// Convert one callback's float samples to 16-bit little-endian PCM.
fn pcm_frame(data: &[f32]) -> Bytes {
    let mut frame = Vec::with_capacity(data.len() * 2);
    for &sample in data {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        frame.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_frame_is_two_bytes_per_sample() {
        let frame = pcm_frame(&[0.0, 0.5, -0.5]);
        assert_eq!(frame.len(), 6);
    }

    #[test]
    fn pcm_frame_converts_sign_and_silence() {
        let frame = pcm_frame(&[0.0, 1.0, -1.0]);
        let s0 = i16::from_le_bytes([frame[0], frame[1]]);
        let s1 = i16::from_le_bytes([frame[2], frame[3]]);
        let s2 = i16::from_le_bytes([frame[4], frame[5]]);
        assert_eq!(s0, 0);
        assert_eq!(s1, i16::MAX);
        assert_eq!(s2, -i16::MAX);
    }

    #[test]
    fn pcm_frame_clamps_out_of_range_input() {
        let frame = pcm_frame(&[2.0, -3.0]);
        let s0 = i16::from_le_bytes([frame[0], frame[1]]);
        let s1 = i16::from_le_bytes([frame[2], frame[3]]);
        assert_eq!(s0, i16::MAX);
        assert_eq!(s1, -i16::MAX);
    }
}
