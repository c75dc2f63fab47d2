//! Microphone arbitration
//!
//! There is one physical input device and two consumers: the keyword
//! spotter and the utterance capturer. The arbiter hands the device to one
//! of them at a time. A hand-over always closes the previous stream and
//! waits a short settling delay before the next one is opened.

use std::time::Duration;

use crate::{Error, Result};

/// Default delay between closing one stream and opening the next
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Logical consumer of the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumer {
    /// Always-on keyword spotter
    Spotter,
    /// On-demand utterance capturer
    Capturer,
}

impl std::fmt::Display for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spotter => f.write_str("spotter"),
            Self::Capturer => f.write_str("capturer"),
        }
    }
}

/// Shape of the frames a stream delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Samples per frame
    pub frame_length: usize,
}

/// An open input stream
pub trait InputStream {
    /// Block until one full frame is available and return it
    ///
    /// # Errors
    ///
    /// Returns error if the stream died or delivered nothing in time
    fn read_frame(&mut self) -> Result<Vec<i16>>;

    /// Whether the stream is still delivering audio
    fn is_active(&self) -> bool;

    /// Drop any audio buffered but not yet read
    fn clear(&mut self);

    /// Stop and close the stream, releasing the device
    fn close(&mut self);
}

/// The physical input device
pub trait InputDevice {
    /// Open a new stream
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened with this format
    fn open(&mut self, format: StreamFormat) -> Result<Box<dyn InputStream>>;
}

struct Lease {
    holder: Consumer,
    format: StreamFormat,
    stream: Box<dyn InputStream>,
}

/// Grants the input device to exactly one consumer at a time
pub struct MicrophoneArbiter {
    device: Box<dyn InputDevice>,
    lease: Option<Lease>,
    settle_delay: Duration,
}

impl MicrophoneArbiter {
    /// Create an arbiter over a device
    #[must_use]
    pub fn new(device: Box<dyn InputDevice>, settle_delay: Duration) -> Self {
        Self {
            device,
            lease: None,
            settle_delay,
        }
    }

    /// Hand the device to `consumer`, closing any other holder's stream first
    ///
    /// Re-acquiring for the current holder returns its stream if it is still
    /// active and has the same format.
    ///
    /// # Errors
    ///
    /// Returns `Microphone` if the new stream cannot be opened
    pub fn acquire_for(
        &mut self,
        consumer: Consumer,
        format: StreamFormat,
    ) -> Result<&mut dyn InputStream> {
        let reusable = self.lease.as_ref().is_some_and(|l| {
            l.holder == consumer && l.format == format && l.stream.is_active()
        });

        if !reusable {
            self.release();

            let stream = self.device.open(format).map_err(|e| {
                tracing::error!(%consumer, error = %e, "failed to open microphone stream");
                Error::Microphone(format!("failed to open stream for {consumer}: {e}"))
            })?;

            tracing::debug!(
                %consumer,
                sample_rate = format.sample_rate,
                frame_length = format.frame_length,
                "microphone granted"
            );

            self.lease = Some(Lease {
                holder: consumer,
                format,
                stream,
            });
        }

        match self.lease.as_mut() {
            Some(l) => Ok(l.stream.as_mut()),
            None => Err(Error::Microphone("stream vanished after open".to_string())),
        }
    }

    /// Close the current holder's stream, if any, and let the device settle
    ///
    /// Returns the consumer that was holding the device.
    pub fn release(&mut self) -> Option<Consumer> {
        let mut lease = self.lease.take()?;
        lease.stream.close();
        tracing::debug!(consumer = %lease.holder, "microphone released");

        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        Some(lease.holder)
    }

    /// Stream of `consumer`, if it currently holds the device
    pub fn stream_mut(&mut self, consumer: Consumer) -> Option<&mut dyn InputStream> {
        match self.lease.as_mut() {
            Some(l) if l.holder == consumer => Some(l.stream.as_mut()),
            _ => None,
        }
    }

    /// Current holder of the device
    #[must_use]
    pub fn holder(&self) -> Option<Consumer> {
        self.lease.as_ref().map(|l| l.holder)
    }

    /// Whether `consumer` holds the device with a live stream
    #[must_use]
    pub fn is_active(&self, consumer: Consumer) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|l| l.holder == consumer && l.stream.is_active())
    }

    /// Settling delay applied after each release
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

impl Drop for MicrophoneArbiter {
    fn drop(&mut self) {
        if let Some(mut lease) = self.lease.take() {
            lease.stream.close();
        }
    }
}
