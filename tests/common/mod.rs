//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, the wake word engine and the
//! network services, all reporting into one `EventLog`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mentor_voice::response::{Generator, ProviderFactory, ResponseOrchestrator};
use mentor_voice::voice::{
    CaptureSettings, InputDevice, InputStream, KeywordSpotter, MicrophoneArbiter,
    PlaybackController, Player, StreamFormat, Synthesizer, Transcriber, UtteranceCapturer,
    check_frame,
};
use mentor_voice::{
    ArtifactStore, Error, ResponsePayload, ResponseProvider, ResponseSource, Result,
    SessionLoop, SessionParts, SessionTimings, ShutdownFlag, UserInput,
};

/// Frame length of the mock spotter
pub const SPOTTER_FRAME: usize = 4;

/// Frame length used by the capturer in tests (10 ms)
pub const CAPTURE_FRAME: usize = 160;

/// Amplitude of a frame carrying the wake word
pub const WAKE_LEVEL: i16 = 7777;

/// Amplitude of a speech frame
pub const SPEECH_LEVEL: i16 = 3000;

/// Frames the capturer spends calibrating (0.3 s)
pub const CALIBRATION_FRAMES: usize = 30;

/// Quiet frames that end a phrase (0.8 s)
pub const PAUSE_FRAMES: usize = 80;

/// What one scripted frame contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Silence,
    Speech,
    Wake,
}

impl Sound {
    const fn level(self) -> i16 {
        match self {
            Self::Silence => 0,
            Self::Speech => SPEECH_LEVEL,
            Self::Wake => WAKE_LEVEL,
        }
    }
}

/// Spotter frames: `quiet` frames of silence, then the wake word
pub fn wake_after(quiet: usize) -> Vec<Sound> {
    let mut frames = vec![Sound::Silence; quiet];
    frames.push(Sound::Wake);
    frames
}

/// Capture frames for one spoken phrase of `speech` frames
pub fn utterance(speech: usize) -> Vec<Sound> {
    let mut frames = vec![Sound::Silence; CALIBRATION_FRAMES];
    frames.extend(vec![Sound::Speech; speech]);
    frames.extend(vec![Sound::Silence; PAUSE_FRAMES]);
    frames
}

/// WAV size the capturer produces for `utterance(speech)`
pub const fn utterance_wav_len(speech: usize) -> usize {
    44 + 2 * CAPTURE_FRAME * (speech + PAUSE_FRAMES)
}

/// Records what the mocks observed
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<EventLogState>>,
}

#[derive(Default)]
struct EventLogState {
    events: Vec<String>,
    open_now: usize,
    max_open: usize,
}

impl EventLog {
    pub fn event(&self, event: impl Into<String>) {
        self.inner.lock().unwrap().events.push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn max_open(&self) -> usize {
        self.inner.lock().unwrap().max_open
    }

    pub fn open_now(&self) -> usize {
        self.inner.lock().unwrap().open_now
    }

    fn opened(&self, name: &str) {
        let mut s = self.inner.lock().unwrap();
        s.open_now += 1;
        s.max_open = s.max_open.max(s.open_now);
        s.events.push(format!("open {name}"));
    }

    fn closed(&self, name: &str) {
        let mut s = self.inner.lock().unwrap();
        s.open_now -= 1;
        s.events.push(format!("close {name}"));
    }
}

fn stream_name(format: StreamFormat) -> &'static str {
    if format.frame_length == SPOTTER_FRAME {
        "spotter"
    } else {
        "capture"
    }
}

/// Microphone fed from two scripts, one per consumer
///
/// An exhausted spotter script raises the shutdown flag; an exhausted
/// capture script yields silence.
pub struct MockDevice {
    spotter: Arc<Mutex<VecDeque<Sound>>>,
    capture: Arc<Mutex<VecDeque<Sound>>>,
    log: EventLog,
    shutdown: ShutdownFlag,
    spotter_opens: usize,
    spotter_open_limit: Option<usize>,
}

impl MockDevice {
    pub fn new(
        spotter: Vec<Sound>,
        capture: Vec<Sound>,
        log: EventLog,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            spotter: Arc::new(Mutex::new(spotter.into())),
            capture: Arc::new(Mutex::new(capture.into())),
            log,
            shutdown,
            spotter_opens: 0,
            spotter_open_limit: None,
        }
    }

    /// Fail every spotter open after the first `limit`
    pub const fn fail_spotter_after(mut self, limit: usize) -> Self {
        self.spotter_open_limit = Some(limit);
        self
    }
}

impl InputDevice for MockDevice {
    fn open(&mut self, format: StreamFormat) -> Result<Box<dyn InputStream>> {
        let name = stream_name(format);

        if name == "spotter" {
            if self
                .spotter_open_limit
                .is_some_and(|limit| self.spotter_opens >= limit)
            {
                self.log.event("open spotter failed");
                return Err(Error::Audio("device busy".to_string()));
            }
            self.spotter_opens += 1;
        }

        self.log.opened(name);

        let script = if name == "spotter" {
            Arc::clone(&self.spotter)
        } else {
            Arc::clone(&self.capture)
        };

        Ok(Box::new(MockStream {
            name,
            format,
            script,
            log: self.log.clone(),
            shutdown: self.shutdown.clone(),
            open: true,
        }))
    }
}

struct MockStream {
    name: &'static str,
    format: StreamFormat,
    script: Arc<Mutex<VecDeque<Sound>>>,
    log: EventLog,
    shutdown: ShutdownFlag,
    open: bool,
}

impl InputStream for MockStream {
    fn read_frame(&mut self) -> Result<Vec<i16>> {
        if !self.open {
            return Err(Error::Audio("closed".to_string()));
        }

        let sound = self.script.lock().unwrap().pop_front();
        let sound = sound.unwrap_or_else(|| {
            if self.name == "spotter" {
                self.shutdown.raise();
            }
            Sound::Silence
        });

        Ok(vec![sound.level(); self.format.frame_length])
    }

    fn is_active(&self) -> bool {
        self.open
    }

    fn clear(&mut self) {}

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.log.closed(self.name);
        }
    }
}

/// Spotter that fires on a wake-level frame
pub struct MockSpotter {
    log: EventLog,
}

impl MockSpotter {
    pub const fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl KeywordSpotter for MockSpotter {
    fn sample_rate(&self) -> u32 {
        16000
    }

    fn frame_length(&self) -> usize {
        SPOTTER_FRAME
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        check_frame(frame, SPOTTER_FRAME)?;
        let detected = frame[0] == WAKE_LEVEL;
        if detected {
            self.log.event("wake");
        }
        Ok(detected)
    }
}

impl Drop for MockSpotter {
    fn drop(&mut self) {
        self.log.event("spotter dropped");
    }
}

/// Remote service that always succeeds or always fails
pub struct MockRemote {
    pub calls: Arc<AtomicUsize>,
    fail: bool,
    audio: Option<PathBuf>,
    log: EventLog,
}

impl MockRemote {
    pub fn new(fail: bool, audio: Option<PathBuf>, log: EventLog) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail,
            audio,
            log,
        }
    }
}

#[async_trait]
impl ResponseProvider for MockRemote {
    fn name(&self) -> &'static str {
        "mock-remote"
    }

    async fn respond(&self, _input: &UserInput) -> Result<ResponsePayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.event("remote");

        if self.fail {
            return Err(Error::Remote("connection refused".to_string()));
        }

        Ok(ResponsePayload {
            text: "Here is what I think.".to_string(),
            audio: self.audio.clone(),
            emotion: "neutral".to_string(),
            latency: Duration::ZERO,
            source: ResponseSource::Remote,
        })
    }
}

impl Drop for MockRemote {
    fn drop(&mut self) {
        self.log.event("remote dropped");
    }
}

/// Transcriber answering from a script; `None` entries fail
pub struct ScriptedTranscriber {
    pub calls: Arc<AtomicUsize>,
    replies: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedTranscriber {
    pub fn new(replies: Vec<Option<&str>>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| Error::Stt("could not decode audio".to_string()))
    }
}

/// Generator that counts calls
pub struct CountingGenerator {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, _system_prompt: &str, user_text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("About {user_text}: keep going."))
    }
}

/// Synthesizer that counts calls
pub struct CountingSynthesizer {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Synthesizer for CountingSynthesizer {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"ID3".to_vec())
    }
}

/// Player that records each file it is asked to play
pub struct CountingPlayer {
    log: EventLog,
}

impl CountingPlayer {
    pub const fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl Player for CountingPlayer {
    fn play(&mut self, _path: &Path) -> Result<()> {
        self.log.event("play");
        Ok(())
    }
}

/// Loop limits scaled down for tests
pub fn test_timings() -> SessionTimings {
    SessionTimings {
        capture_timeout: Duration::from_secs(1),
        phrase_limit: Duration::from_secs(10),
        follow_up_window: Duration::from_secs(1),
        max_follow_ups: 3,
        reopen_attempts: 2,
    }
}

/// Capture settings with 10 ms frames
pub fn capture_settings() -> CaptureSettings {
    CaptureSettings {
        frame_length: CAPTURE_FRAME,
        ..CaptureSettings::default()
    }
}

/// Factory that counts builds and always fails
pub fn unused_factory(builds: Arc<AtomicUsize>) -> ProviderFactory {
    Box::new(move || {
        builds.fetch_add(1, Ordering::SeqCst);
        Err(Error::Config("fallback not configured".to_string()))
    })
}

/// Write a stand-in answer file and return its path
pub fn answer_file(dir: &Path) -> PathBuf {
    let path = dir.join("answer.mp3");
    std::fs::write(&path, b"ID3").unwrap();
    path
}

/// Accept connections on an ephemeral port and never answer; returns the
/// base URL
pub async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

/// Assemble a session over mocks
pub struct Rig {
    pub log: EventLog,
    pub shutdown: ShutdownFlag,
    pub dir: tempfile::TempDir,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            log: EventLog::default(),
            shutdown: ShutdownFlag::new(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(self.dir.path()).unwrap()
    }

    pub fn arbiter(&self, device: MockDevice) -> MicrophoneArbiter {
        MicrophoneArbiter::new(Box::new(device), Duration::ZERO)
    }

    pub fn device(&self, spotter: Vec<Sound>, capture: Vec<Sound>) -> MockDevice {
        MockDevice::new(spotter, capture, self.log.clone(), self.shutdown.clone())
    }

    pub fn session(
        &self,
        device: MockDevice,
        transcriber: Option<Arc<dyn Transcriber>>,
        orchestrator: ResponseOrchestrator,
    ) -> SessionLoop {
        SessionLoop::new(SessionParts {
            spotter: Box::new(MockSpotter::new(self.log.clone())),
            mic: self.arbiter(device),
            capturer: UtteranceCapturer::new(capture_settings(), self.store(), transcriber),
            orchestrator,
            playback: PlaybackController::new(Box::new(CountingPlayer::new(self.log.clone()))),
            timings: test_timings(),
            shutdown: self.shutdown.clone(),
        })
    }
}
