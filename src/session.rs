//! Session state machine
//!
//! Sequences one interaction at a time: wait for the wake word, capture the
//! question, answer it, play the answer, then listen briefly for a follow-up
//! before going back to waiting. Audio phases block; only the response call
//! awaits.

use std::collections::VecDeque;
use std::time::Duration;

use crate::response::{ResponseOrchestrator, UserInput};
use crate::shutdown::ShutdownFlag;
use crate::voice::{
    CaptureRequest, Consumer, KeywordSpotter, MicrophoneArbiter, PlaybackController,
    StreamFormat, UtteranceCapturer,
};
use crate::{Error, Result};

/// Number of past states kept for inspection
const HISTORY_LEN: usize = 64;

/// Phase of the interaction loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not running
    Idle,
    /// Waiting for the wake word
    WakeListening,
    /// Recording the user's question
    Capturing,
    /// Producing an answer
    Responding,
    /// Playing the answer
    Playing,
    /// Listening for a follow-up without the wake word
    FollowUpWindow,
}

impl SessionState {
    /// Status label printed for operators
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WakeListening => "listening",
            Self::Capturing => "capturing",
            Self::Responding => "responding",
            Self::Playing => "playing",
            Self::FollowUpWindow => "follow_up",
        }
    }

    /// Whether the loop may move from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Capturing, FollowUpWindow, Idle, Playing, Responding, WakeListening};

        matches!(
            (self, next),
            (Idle, WakeListening)
                | (WakeListening, Capturing)
                | (Capturing, Responding | WakeListening)
                | (Responding, Playing)
                | (Playing, FollowUpWindow)
                | (FollowUpWindow, Responding | WakeListening)
                | (_, Idle)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Limits applied by the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Wait for speech after the wake word
    pub capture_timeout: Duration,
    /// Longest question
    pub phrase_limit: Duration,
    /// Wait for speech after an answer
    pub follow_up_window: Duration,
    /// Follow-ups allowed per wake word
    pub max_follow_ups: usize,
    /// Tries to reopen the spotter stream before giving up
    pub reopen_attempts: usize,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(5),
            phrase_limit: Duration::from_secs(10),
            follow_up_window: Duration::from_secs(4),
            max_follow_ups: 3,
            reopen_attempts: 2,
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Back to waiting for the wake word
    Continue,
    /// Shutdown was requested
    Shutdown,
}

/// Everything the loop drives
pub struct SessionParts {
    /// Wake word engine
    pub spotter: Box<dyn KeywordSpotter>,
    /// Shared microphone
    pub mic: MicrophoneArbiter,
    /// Question recorder
    pub capturer: UtteranceCapturer,
    /// Answer source
    pub orchestrator: ResponseOrchestrator,
    /// Answer player
    pub playback: PlaybackController,
    /// Loop limits
    pub timings: SessionTimings,
    /// Stop signal
    pub shutdown: ShutdownFlag,
}

/// The wake-word-gated interaction loop
pub struct SessionLoop {
    state: SessionState,
    history: VecDeque<SessionState>,
    spotter: Option<Box<dyn KeywordSpotter>>,
    mic: MicrophoneArbiter,
    capturer: Option<UtteranceCapturer>,
    orchestrator: Option<ResponseOrchestrator>,
    playback: PlaybackController,
    timings: SessionTimings,
    shutdown: ShutdownFlag,
    print_status: bool,
}

impl SessionLoop {
    /// Create an idle loop
    #[must_use]
    pub fn new(parts: SessionParts) -> Self {
        Self {
            state: SessionState::Idle,
            history: VecDeque::with_capacity(HISTORY_LEN),
            spotter: Some(parts.spotter),
            mic: parts.mic,
            capturer: Some(parts.capturer),
            orchestrator: Some(parts.orchestrator),
            playback: parts.playback,
            timings: parts.timings,
            shutdown: parts.shutdown,
            print_status: false,
        }
    }

    /// Print `ts=... status=...` lines on stdout at each transition
    #[must_use]
    pub const fn with_status_lines(mut self, enabled: bool) -> Self {
        self.print_status = enabled;
        self
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// States entered so far, oldest first (bounded)
    #[must_use]
    pub const fn history(&self) -> &VecDeque<SessionState> {
        &self.history
    }

    /// Run until shutdown, then tear down
    ///
    /// # Errors
    ///
    /// Returns error if the microphone is lost for good or the state machine
    /// is misused
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("session starting");
        let result = self.run_until_shutdown().await;

        if let Err(e) = &result {
            tracing::error!(error = %e, state = %self.state, "session stopped on error");
        }

        self.teardown();
        result
    }

    #[allow(clippy::future_not_send)]
    async fn run_until_shutdown(&mut self) -> Result<()> {
        self.transition(SessionState::WakeListening)?;

        while !self.shutdown.is_raised() {
            match self.run_cycle().await {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::Shutdown) => break,
                Err(e) if e.is_fatal() || matches!(e, Error::Session(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        state = %self.state,
                        "cycle failed, listening again"
                    );
                    self.recover();
                }
            }
        }

        Ok(())
    }

    /// One wake word to back-to-listening cycle
    ///
    /// # Errors
    ///
    /// Returns error if the spotter stream cannot be reopened or a frame is
    /// rejected by the spotter
    #[allow(clippy::future_not_send)]
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        if !self.listen_for_wake()? {
            return Ok(CycleOutcome::Shutdown);
        }

        self.status("detected");
        tracing::info!("wake word detected");
        self.transition(SessionState::Capturing)?;

        let request = CaptureRequest {
            timeout: self.timings.capture_timeout,
            phrase_limit: self.timings.phrase_limit,
            validate_speech: false,
        };

        let utterance = match self.capture(request).await {
            Ok(Some(utterance)) => utterance,
            Ok(None) => {
                tracing::info!("no question heard");
                self.transition(SessionState::WakeListening)?;
                return Ok(self.outcome());
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture failed");
                self.transition(SessionState::WakeListening)?;
                return Ok(self.outcome());
            }
        };

        let mut input = UserInput::Audio(utterance);
        let mut follow_ups = 0;

        loop {
            self.transition(SessionState::Responding)?;
            let payload = self.orchestrator()?.respond(&input).await;
            tracing::info!(reply = %payload.text, "answering");

            self.transition(SessionState::Playing)?;
            let outcome = self.playback.play(payload.audio.as_deref());
            tracing::debug!(?outcome, "playback finished");

            self.transition(SessionState::FollowUpWindow)?;

            if self.shutdown.is_raised() || follow_ups >= self.timings.max_follow_ups {
                break;
            }

            let request = CaptureRequest {
                timeout: self.timings.follow_up_window,
                phrase_limit: self.timings.phrase_limit,
                validate_speech: true,
            };

            match self.capture(request).await {
                Ok(Some(utterance)) => {
                    follow_ups += 1;
                    tracing::info!(follow_ups, "follow-up accepted");
                    input = UserInput::Audio(utterance);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "follow-up capture failed");
                    break;
                }
            }
        }

        self.transition(SessionState::WakeListening)?;
        Ok(self.outcome())
    }

    /// Block until the wake word is heard; false on shutdown
    fn listen_for_wake(&mut self) -> Result<bool> {
        self.ensure_spotter()?;

        if let Some(stream) = self.mic.stream_mut(Consumer::Spotter) {
            stream.clear();
        }

        loop {
            if self.shutdown.is_raised() {
                return Ok(false);
            }

            let frame = match self.mic.stream_mut(Consumer::Spotter) {
                Some(stream) => stream.read_frame(),
                None => Err(Error::Microphone("spotter does not hold the microphone".to_string())),
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "spotter stream lost, reopening");
                    self.mic.release();
                    self.ensure_spotter()?;
                    continue;
                }
            };

            let spotter = self
                .spotter
                .as_mut()
                .ok_or_else(|| Error::Session("spotter already released".to_string()))?;

            if spotter.process(&frame)? {
                return Ok(true);
            }
        }
    }

    /// Make sure the spotter holds a live stream, retrying a bounded number
    /// of times
    ///
    /// # Errors
    ///
    /// Returns `Microphone` once every attempt has failed
    pub fn ensure_spotter(&mut self) -> Result<()> {
        let format = self.spotter_format()?;

        if self.mic.is_active(Consumer::Spotter) {
            return Ok(());
        }

        let attempts = self.timings.reopen_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if self.mic.holder().is_none() && !self.mic.settle_delay().is_zero() {
                std::thread::sleep(self.mic.settle_delay());
            }

            match self.mic.acquire_for(Consumer::Spotter, format) {
                Ok(_) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "spotter stream reopened");
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "failed to open spotter stream");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Microphone(format!(
            "spotter stream could not be reopened after {attempts} attempts: {}",
            last_error.map_or_else(String::new, |e| e.to_string())
        )))
    }

    #[allow(clippy::future_not_send)]
    async fn capture(
        &mut self,
        request: CaptureRequest,
    ) -> Result<Option<crate::voice::CapturedUtterance>> {
        let format = self.spotter_format()?;
        let capturer = self
            .capturer
            .as_ref()
            .ok_or_else(|| Error::Session("capturer already released".to_string()))?;
        capturer
            .capture(&mut self.mic, format, request, &self.shutdown)
            .await
    }

    /// Release everything: capture stream, spotter stream, model, network.
    /// The capturer owns the follow-up transcriber and leaves with the
    /// network clients.
    pub fn teardown(&mut self) {
        if self.mic.holder() == Some(Consumer::Capturer) {
            self.mic.release();
        }
        if self.mic.holder() == Some(Consumer::Spotter) {
            self.mic.release();
        }

        drop(self.spotter.take());
        drop(self.capturer.take());
        drop(self.orchestrator.take());

        if self.state != SessionState::Idle {
            self.state = SessionState::Idle;
            self.record(SessionState::Idle);
        }

        tracing::info!("session torn down");
    }

    /// Move to `next`, rejecting illegal transitions
    ///
    /// # Errors
    ///
    /// Returns `Session` if the move is not allowed from the current state
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Session(format!(
                "illegal transition {} -> {next}",
                self.state
            )));
        }

        tracing::debug!(from = %self.state, to = %next, "state change");
        self.state = next;
        self.record(next);
        Ok(())
    }

    fn recover(&mut self) {
        if self.state != SessionState::WakeListening {
            self.state = SessionState::WakeListening;
            self.record(SessionState::WakeListening);
        }
    }

    fn record(&mut self, state: SessionState) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(state);
        self.status(state.label());
    }

    fn status(&self, label: &str) {
        if self.print_status {
            println!("ts={} status={label}", chrono::Local::now().to_rfc3339());
        }
    }

    fn outcome(&self) -> CycleOutcome {
        if self.shutdown.is_raised() {
            CycleOutcome::Shutdown
        } else {
            CycleOutcome::Continue
        }
    }

    fn spotter_format(&self) -> Result<StreamFormat> {
        self.spotter
            .as_ref()
            .map(|s| s.stream_format())
            .ok_or_else(|| Error::Session("spotter already released".to_string()))
    }

    fn orchestrator(&mut self) -> Result<&mut ResponseOrchestrator> {
        self.orchestrator
            .as_mut()
            .ok_or_else(|| Error::Session("response providers already released".to_string()))
    }
}
