//! Voice processing module
//!
//! Handles wake word detection, microphone hand-over between the spotter and
//! the capturer, utterance capture, speech services and playback.

mod capture;
mod device;
mod microphone;
mod model;
mod playback;
mod stt;
mod tts;
mod wake_word;

pub use capture::{
    CaptureRequest, CaptureSettings, CapturedUtterance, SAMPLE_RATE, TopicMode,
    UtteranceCapturer, calibrated_threshold, check_transcript, meets_size_floor, rms,
    samples_to_wav,
};
pub use device::{CpalInputDevice, f32_to_i16};
pub use microphone::{
    Consumer, DEFAULT_SETTLE_DELAY, InputDevice, InputStream, MicrophoneArbiter, StreamFormat,
};
pub use model::{ModelResolver, ModelSpec, Platform, is_portable_target};
pub use playback::{
    AudioPlayback, PlaybackController, PlaybackOutcome, Player, decode_mp3, decode_wav, resample,
};
pub use stt::{DEFAULT_SERVICE_TIMEOUT, DEFAULT_STT_BASE_URL, Transcriber, WhisperTranscriber};
pub use tts::{
    DEFAULT_ELEVENLABS_MODEL, DEFAULT_ELEVENLABS_VOICE, ElevenLabsSynthesizer, OpenAiSynthesizer,
    Synthesizer,
};
pub use wake_word::{
    DEFAULT_THRESHOLD, KeywordSpotter, RustpotterSpotter, SPOTTER_SAMPLE_RATE, check_frame,
    validate_credential,
};
