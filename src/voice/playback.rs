//! Audio playback to speakers

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{Error, Result};

/// Plays an audio file to completion
pub trait Player {
    /// Block until the file has been played
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded or the device fails
    fn play(&mut self, path: &Path) -> Result<()>;
}

/// What happened to a playback request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The artifact was played to the end
    Played,
    /// There was nothing to play
    Skipped,
    /// Decoding or the output device failed
    Failed,
}

/// Plays response artifacts, never failing the caller
pub struct PlaybackController {
    player: Box<dyn Player>,
}

impl PlaybackController {
    /// Create a controller over a player
    #[must_use]
    pub fn new(player: Box<dyn Player>) -> Self {
        Self { player }
    }

    /// Play an artifact if there is one
    pub fn play(&mut self, artifact: Option<&Path>) -> PlaybackOutcome {
        let Some(path) = artifact else {
            tracing::info!("no response audio to play");
            return PlaybackOutcome::Skipped;
        };

        if !path.is_file() {
            tracing::warn!(path = %path.display(), "response audio missing, skipping playback");
            return PlaybackOutcome::Skipped;
        }

        match self.player.play(path) {
            Ok(()) => PlaybackOutcome::Played,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "playback failed");
                PlaybackOutcome::Failed
            }
        }
    }
}

/// Plays audio files through the default output device
#[derive(Debug, Default)]
pub struct AudioPlayback;

impl AudioPlayback {
    /// Create a player for the default output device
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn play_samples_blocking(samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?
            .into();
        let channels = usize::from(config.channels);
        let device_rate = config.sample_rate.0;

        let samples = if sample_rate == device_rate {
            samples
        } else {
            resample(&samples, sample_rate, device_rate)?
        };
        let sample_count = samples.len();

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None::<String>));

        let cb_samples = Arc::clone(&samples);
        let cb_position = Arc::clone(&position);
        let cb_finished = Arc::clone(&finished);
        let cb_failure = Arc::clone(&failure);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = cb_position.load(Ordering::Relaxed);

                    for frame in data.chunks_mut(channels) {
                        let sample = cb_samples.get(pos).copied().unwrap_or_else(|| {
                            cb_finished.store(true, Ordering::Release);
                            0.0
                        });
                        frame.fill(sample);
                        pos = (pos + 1).min(cb_samples.len());
                    }

                    cb_position.store(pos, Ordering::Relaxed);
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    if let Ok(mut slot) = cb_failure.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(device_rate.max(1));
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!("playback did not report completion in time");
                break;
            }
            if failure.lock().map(|f| f.is_some()).unwrap_or(false) {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
        drop(stream);

        if let Some(err) = failure.lock().ok().and_then(|mut f| f.take()) {
            return Err(Error::Audio(err));
        }

        tracing::debug!(samples = sample_count, "playback complete");
        Ok(())
    }
}

impl Player for AudioPlayback {
    fn play(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        let (samples, rate) = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") => decode_wav(&data)?,
            _ => decode_mp3(&data)?,
        };

        tracing::debug!(path = %path.display(), samples = samples.len(), rate, "playing");
        Self::play_samples_blocking(samples, rate)
    }
}

/// Decode WAV bytes to mono f32 samples and their rate
///
/// # Errors
///
/// Returns error if the data is not a readable WAV file
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples and their rate
///
/// # Errors
///
/// Returns error if the data contains no decodable frames
#[allow(clippy::cast_sign_loss)]
pub fn decode_mp3(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        1 => interleaved.to_vec(),
        2 => interleaved
            .chunks(2)
            .map(|c| f32::midpoint(c[0], c.get(1).copied().unwrap_or(c[0])))
            .collect(),
        n => interleaved
            .chunks(n)
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect(),
    }
}

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output =
        Vec::with_capacity(samples.len() * to_rate as usize / from_rate.max(1) as usize + 1);

    for chunk in input.chunks(chunk_size) {
        let result = if chunk.len() == chunk_size {
            resampler.process(&[chunk.to_vec()], None)
        } else {
            let tail = vec![chunk.to_vec()];
            resampler.process_partial(Some(tail.as_slice()), None)
        }
        .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;

        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct CountingPlayer {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl Player for CountingPlayer {
        fn play(&mut self, _path: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(Error::Audio("device gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn controller(fail: bool) -> (PlaybackController, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let player = CountingPlayer {
            calls: Rc::clone(&calls),
            fail,
        };
        (PlaybackController::new(Box::new(player)), calls)
    }

    #[test]
    fn test_missing_artifact_is_skipped() {
        let (mut playback, calls) = controller(false);

        assert_eq!(playback.play(None), PlaybackOutcome::Skipped);
        assert_eq!(
            playback.play(Some(Path::new("/nonexistent/response.mp3"))),
            PlaybackOutcome::Skipped
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_player_failure_is_reported() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (mut playback, calls) = controller(true);

        assert_eq!(playback.play(Some(file.path())), PlaybackOutcome::Failed);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_existing_artifact_is_played() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (mut playback, _) = controller(false);

        assert_eq!(playback.play(Some(file.path())), PlaybackOutcome::Played);
    }

    #[test]
    fn test_decode_wav_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..10 {
                writer.write_sample(16384_i16).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let (samples, rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(rate, 22050);
        assert_eq!(samples.len(), 10);
        assert!((samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_garbage_mp3_fails() {
        assert!(decode_mp3(b"not audio").is_err());
    }

    #[test]
    fn test_resample_changes_length() {
        let input = vec![0.0_f32; 4800];
        let output = resample(&input, 48000, 16000).unwrap();
        assert!(output.len() > 1000 && output.len() < 2200);
    }
}
