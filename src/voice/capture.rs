//! Utterance capture
//!
//! The capturer borrows the microphone from the keyword spotter, measures
//! the room, records one spoken phrase and gives the microphone back before
//! anything touches the network. Elapsed time is counted in consumed
//! samples, not wall-clock time.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};

use super::microphone::{Consumer, InputStream, MicrophoneArbiter, StreamFormat};
use super::stt::Transcriber;
use crate::artifacts::ArtifactStore;
use crate::shutdown::ShutdownFlag;
use crate::{Error, Result};

/// Sample rate for utterance capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How to treat follow-ups that mention none of the topic keywords
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicMode {
    /// No topic check
    Off,
    /// Log off-topic follow-ups but accept them
    #[default]
    Flag,
    /// Reject off-topic follow-ups
    Block,
}

/// Tunables for recording and validation
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Samples per frame read from the capture stream
    pub frame_length: usize,
    /// Ambient noise measurement window
    pub calibration: Duration,
    /// Multiplier applied to the ambient level
    pub calibration_factor: f64,
    /// Minimum onset threshold
    pub energy_floor: f64,
    /// Minimum onset threshold when speech is validated
    pub follow_up_energy_floor: f64,
    /// Audio kept from before the onset
    pub pre_roll: Duration,
    /// Continuous quiet that ends a phrase
    pub pause: Duration,
    /// Smallest WAV accepted, in bytes
    pub min_utterance_bytes: usize,
    /// Shortest accepted follow-up transcript, in characters
    pub min_follow_up_chars: usize,
    /// Words that mark a follow-up as on topic
    pub topic_keywords: Vec<String>,
    /// Policy for follow-ups matching no topic keyword
    pub topic_mode: TopicMode,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_length: 512,
            calibration: Duration::from_millis(300),
            calibration_factor: 1.5,
            energy_floor: 300.0,
            follow_up_energy_floor: 600.0,
            pre_roll: Duration::from_millis(300),
            pause: Duration::from_millis(800),
            min_utterance_bytes: 8000,
            min_follow_up_chars: 3,
            topic_keywords: Vec::new(),
            topic_mode: TopicMode::default(),
        }
    }
}

/// Limits for one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// How long to wait for speech to start
    pub timeout: Duration,
    /// Longest phrase recorded after onset
    pub phrase_limit: Duration,
    /// Transcribe and check the result before accepting it
    pub validate_speech: bool,
}

/// A recorded and accepted utterance
#[derive(Debug, Clone)]
pub struct CapturedUtterance {
    /// WAV bytes
    pub audio: Vec<u8>,
    /// Where the WAV was persisted
    pub path: PathBuf,
    /// When recording finished
    pub captured_at: DateTime<Local>,
    /// Transcript, when the capture ran speech validation
    pub transcript: Option<String>,
}

/// Records single utterances through the shared microphone
pub struct UtteranceCapturer {
    settings: CaptureSettings,
    store: ArtifactStore,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl UtteranceCapturer {
    /// Create a capturer writing artifacts to `store`
    #[must_use]
    pub fn new(
        settings: CaptureSettings,
        store: ArtifactStore,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            settings,
            store,
            transcriber,
        }
    }

    /// Stream format the capturer opens the microphone with
    #[must_use]
    pub const fn format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: SAMPLE_RATE,
            frame_length: self.settings.frame_length,
        }
    }

    /// Record one utterance
    ///
    /// Takes the microphone from the spotter and always hands it back to a
    /// fresh spotter stream with `spotter_format` before returning, unless
    /// shutdown was requested. Returns `None` when nobody spoke, the
    /// recording was too short, or validation rejected it.
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream fails or the artifact cannot be
    /// written
    #[allow(clippy::future_not_send)]
    pub async fn capture(
        &self,
        mic: &mut MicrophoneArbiter,
        spotter_format: StreamFormat,
        request: CaptureRequest,
        shutdown: &ShutdownFlag,
    ) -> Result<Option<CapturedUtterance>> {
        let recorded = self.record(mic, request, shutdown);
        restore_spotter(mic, spotter_format, shutdown);

        let Some(samples) = recorded? else {
            return Ok(None);
        };

        let audio = samples_to_wav(&samples, SAMPLE_RATE)?;
        let path = self.store.save_capture(&audio)?;
        let captured_at = Local::now();

        if !meets_size_floor(audio.len(), self.settings.min_utterance_bytes) {
            tracing::info!(
                bytes = audio.len(),
                min = self.settings.min_utterance_bytes,
                "utterance below noise floor, discarded"
            );
            return Ok(None);
        }

        let transcript = if request.validate_speech {
            match self.validate(&audio).await {
                Some(text) => Some(text),
                None => return Ok(None),
            }
        } else {
            None
        };

        tracing::info!(path = %path.display(), bytes = audio.len(), "utterance captured");

        Ok(Some(CapturedUtterance {
            audio,
            path,
            captured_at,
            transcript,
        }))
    }

    fn record(
        &self,
        mic: &mut MicrophoneArbiter,
        request: CaptureRequest,
        shutdown: &ShutdownFlag,
    ) -> Result<Option<Vec<i16>>> {
        let stream = mic.acquire_for(Consumer::Capturer, self.format())?;
        stream.clear();

        let floor = if request.validate_speech {
            self.settings.follow_up_energy_floor
        } else {
            self.settings.energy_floor
        };

        let Some(ambient) = self.calibrate(stream, shutdown)? else {
            return Ok(None);
        };
        let threshold = calibrated_threshold(ambient, floor, self.settings.calibration_factor);
        tracing::debug!(ambient, threshold, "capture threshold calibrated");

        let timeout = samples_for(request.timeout);
        let pre_roll_len = samples_for(self.settings.pre_roll);
        let mut pre_roll: VecDeque<i16> = VecDeque::with_capacity(pre_roll_len);
        let mut waited = 0;

        let onset = loop {
            if shutdown.is_raised() {
                return Ok(None);
            }
            if waited >= timeout {
                tracing::debug!(timeout = ?request.timeout, "no speech before timeout");
                return Ok(None);
            }

            let frame = stream.read_frame()?;
            waited += frame.len();

            if rms(&frame) > threshold {
                break frame;
            }

            pre_roll.extend(frame);
            while pre_roll.len() > pre_roll_len {
                pre_roll.pop_front();
            }
        };

        let phrase_limit = samples_for(request.phrase_limit);
        let pause = samples_for(self.settings.pause);
        let mut since_onset = onset.len();
        let mut quiet = 0;
        let mut samples: Vec<i16> = pre_roll.into_iter().collect();
        samples.extend(onset);

        while since_onset < phrase_limit {
            if shutdown.is_raised() {
                return Ok(None);
            }

            let frame = stream.read_frame()?;
            since_onset += frame.len();

            if rms(&frame) > threshold {
                quiet = 0;
            } else {
                quiet += frame.len();
            }
            samples.extend(frame);

            if quiet >= pause {
                break;
            }
        }

        tracing::debug!(samples = samples.len(), "recording finished");
        Ok(Some(samples))
    }

    fn calibrate(
        &self,
        stream: &mut dyn InputStream,
        shutdown: &ShutdownFlag,
    ) -> Result<Option<f64>> {
        let window = samples_for(self.settings.calibration).max(1);
        let mut consumed = 0;
        let mut levels = Vec::new();

        while consumed < window {
            if shutdown.is_raised() {
                return Ok(None);
            }
            let frame = stream.read_frame()?;
            consumed += frame.len();
            levels.push(rms(&frame));
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = levels.iter().sum::<f64>() / levels.len() as f64;
        Ok(Some(mean))
    }

    async fn validate(&self, wav: &[u8]) -> Option<String> {
        let Some(transcriber) = &self.transcriber else {
            tracing::info!("no transcriber available, follow-up rejected");
            return None;
        };

        let text = match transcriber.transcribe(wav).await {
            Ok(text) => text,
            Err(e) => {
                tracing::info!(error = %e, "follow-up not recognized");
                return None;
            }
        };

        if check_transcript(&text, &self.settings) {
            Some(text.trim().to_string())
        } else {
            None
        }
    }
}

/// Hand the microphone back to the spotter
///
/// A failure is logged; the session retries before giving up.
fn restore_spotter(mic: &mut MicrophoneArbiter, format: StreamFormat, shutdown: &ShutdownFlag) {
    mic.release();

    if shutdown.is_raised() {
        return;
    }

    if let Err(e) = mic.acquire_for(Consumer::Spotter, format) {
        tracing::warn!(error = %e, "failed to reopen spotter stream after capture");
    }
}

/// Whether a follow-up transcript is long enough and passes the topic policy
#[must_use]
pub fn check_transcript(text: &str, settings: &CaptureSettings) -> bool {
    let text = text.trim();
    let chars = text.chars().count();

    if chars < settings.min_follow_up_chars {
        tracing::info!(chars, min = settings.min_follow_up_chars, "follow-up too short");
        return false;
    }

    if settings.topic_mode == TopicMode::Off || settings.topic_keywords.is_empty() {
        return true;
    }

    let lower = text.to_lowercase();
    let on_topic = settings
        .topic_keywords
        .iter()
        .any(|k| lower.contains(&k.to_lowercase()));

    match (on_topic, settings.topic_mode) {
        (true, _) => true,
        (false, TopicMode::Block) => {
            tracing::info!(transcript = %text, "off-topic follow-up rejected");
            false
        }
        (false, _) => {
            tracing::info!(transcript = %text, "off-topic follow-up");
            true
        }
    }
}

/// Root mean square level of a frame
#[must_use]
pub fn rms(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum: f64 = frame
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let mean = sum / frame.len() as f64;
    mean.sqrt()
}

/// Onset threshold from the ambient level
#[must_use]
pub fn calibrated_threshold(ambient: f64, floor: f64, factor: f64) -> f64 {
    floor.max(ambient * factor)
}

/// Whether a WAV of `len` bytes is large enough to hold speech
#[must_use]
pub const fn meets_size_floor(len: usize, min: usize) -> bool {
    len >= min
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn samples_for(duration: Duration) -> usize {
    (duration.as_secs_f64() * f64::from(SAMPLE_RATE)).round() as usize
}

/// Encode mono 16-bit samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
