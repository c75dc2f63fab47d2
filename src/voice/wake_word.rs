//! Wake word detection
//!
//! A keyword spotter consumes fixed-size frames of 16-bit audio and reports
//! when the trigger phrase was heard. Frame length and sample rate are fixed
//! by the engine and the microphone stream must be opened to match.

use std::path::{Path, PathBuf};

use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};
use secrecy::{ExposeSecret, SecretString};

use super::microphone::StreamFormat;
use crate::{Error, Result};

/// Sample rate the spotter is configured for
pub const SPOTTER_SAMPLE_RATE: u32 = 16000;

/// Detection score threshold used when none is configured
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Detects a trigger phrase in a stream of audio frames
pub trait KeywordSpotter {
    /// Samples per second the spotter expects
    fn sample_rate(&self) -> u32;

    /// Exact number of samples per frame
    fn frame_length(&self) -> usize;

    /// Feed one frame; returns true when the trigger phrase was recognized
    ///
    /// # Errors
    ///
    /// Returns error if the frame length does not match `frame_length`
    fn process(&mut self, frame: &[i16]) -> Result<bool>;

    /// Stream format the microphone must be opened with
    fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate(),
            frame_length: self.frame_length(),
        }
    }
}

/// Keyword spotter backed by a `rustpotter` wake word model
pub struct RustpotterSpotter {
    detector: Rustpotter,
    model_path: PathBuf,
    frame_length: usize,
}

impl RustpotterSpotter {
    /// Load a wake word model
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredential` if the access key is malformed,
    /// `ModelNotFound` if the model file is missing, or `WakeWord` if the
    /// engine rejects the model
    pub fn initialize(
        model_path: &Path,
        access_key: &SecretString,
        threshold: f32,
    ) -> Result<Self> {
        validate_credential(access_key)?;

        if !model_path.is_file() {
            return Err(Error::ModelNotFound {
                attempted: vec![model_path.to_path_buf()],
            });
        }

        let mut config = RustpotterConfig::default();
        config.fmt.sample_rate = SPOTTER_SAMPLE_RATE as usize;
        config.fmt.channels = 1;
        config.fmt.sample_format = SampleFormat::F32;
        config.detector.threshold = threshold;

        let mut detector = Rustpotter::new(&config)
            .map_err(|e| Error::WakeWord(format!("failed to create detector: {e}")))?;

        let key = model_path
            .file_stem()
            .map_or_else(|| "wakeword".to_string(), |s| s.to_string_lossy().into_owned());
        let path_str = model_path.to_string_lossy();
        detector
            .add_wakeword_from_file(&key, &path_str)
            .map_err(|e| Error::WakeWord(format!("failed to load {}: {e}", model_path.display())))?;

        let frame_length = detector.get_samples_per_frame();

        tracing::info!(
            model = %model_path.display(),
            sample_rate = SPOTTER_SAMPLE_RATE,
            frame_length,
            threshold,
            "wake word detector initialized"
        );

        Ok(Self {
            detector,
            model_path: model_path.to_path_buf(),
            frame_length,
        })
    }
}

impl KeywordSpotter for RustpotterSpotter {
    fn sample_rate(&self) -> u32 {
        SPOTTER_SAMPLE_RATE
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        check_frame(frame, self.frame_length)?;

        let samples: Vec<f32> = frame.iter().map(|&s| f32::from(s) / 32768.0).collect();

        match self.detector.process_samples(samples) {
            Some(detection) => {
                tracing::debug!(name = %detection.name, score = detection.score, "keyword spotted");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for RustpotterSpotter {
    fn drop(&mut self) {
        tracing::debug!(model = %self.model_path.display(), "wake word model released");
    }
}

/// Reject frames that do not match the engine's frame length
///
/// # Errors
///
/// Returns `WakeWord` on a length mismatch
pub fn check_frame(frame: &[i16], expected: usize) -> Result<()> {
    if frame.len() == expected {
        Ok(())
    } else {
        Err(Error::WakeWord(format!(
            "frame length mismatch: got {} samples, expected {expected}",
            frame.len()
        )))
    }
}

/// Validate the wake word access credential
///
/// # Errors
///
/// Returns `InvalidCredential` if the key is empty or contains whitespace
/// or control characters
pub fn validate_credential(access_key: &SecretString) -> Result<()> {
    let key = access_key.expose_secret();

    if key.is_empty() {
        return Err(Error::InvalidCredential("access key is empty".to_string()));
    }

    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidCredential(
            "access key contains whitespace or control characters".to_string(),
        ));
    }

    Ok(())
}
