//! Microphone input through `cpal`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::microphone::{InputDevice, InputStream, StreamFormat};
use crate::{Error, Result};

/// How long a read may wait for audio before the stream is considered dead
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval while waiting for a full frame
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The default input device of the default host
#[derive(Debug, Default)]
pub struct CpalInputDevice;

impl CpalInputDevice {
    /// Create a handle to the default input device
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl InputDevice for CpalInputDevice {
    fn open(&mut self, format: StreamFormat) -> Result<Box<dyn InputStream>> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let rate = SampleRate(format.sample_rate);
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
            .ok_or_else(|| {
                Error::Audio(format!(
                    "no mono input config at {} Hz",
                    format.sample_rate
                ))
            })?;

        let config: StreamConfig = supported.with_sample_rate(rate).config();

        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let data_buffer = Arc::clone(&buffer);
        let error_alive = Arc::clone(&alive);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = data_buffer.lock() {
                        buf.extend(data.iter().map(|&s| f32_to_i16(s)));
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio input stream error");
                    error_alive.store(false, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            frame_length = format.frame_length,
            "input stream opened"
        );

        Ok(Box::new(CpalInputStream {
            stream: Some(stream),
            buffer,
            alive,
            frame_length: format.frame_length,
        }))
    }
}

/// A running `cpal` input stream buffering mono 16-bit samples
struct CpalInputStream {
    stream: Option<Stream>,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    alive: Arc<AtomicBool>,
    frame_length: usize,
}

impl InputStream for CpalInputStream {
    fn read_frame(&mut self) -> Result<Vec<i16>> {
        let start = Instant::now();

        loop {
            if !self.is_active() {
                return Err(Error::Audio("input stream is closed".to_string()));
            }

            {
                let mut buf = self
                    .buffer
                    .lock()
                    .map_err(|_| Error::Audio("input buffer poisoned".to_string()))?;
                if buf.len() >= self.frame_length {
                    return Ok(buf.drain(..self.frame_length).collect());
                }
            }

            if start.elapsed() > READ_TIMEOUT {
                self.alive.store(false, Ordering::SeqCst);
                return Err(Error::Audio("no audio from input device".to_string()));
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some() && self.alive.load(Ordering::SeqCst)
    }

    fn clear(&mut self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "failed to pause input stream");
            }
            drop(stream);
            self.clear();
            tracing::debug!("input stream closed");
        }
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
