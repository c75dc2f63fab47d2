//! Response generation
//!
//! Every user turn is answered by the remote service when it can be reached.
//! Any remote failure falls back to a local pipeline that is built the first
//! time it is needed and reused afterwards.

mod emotion;
mod generate;
mod local;
mod remote;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;

pub use emotion::analyze_text;
pub use generate::{ChatGenerator, DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL, Generator};
pub use local::{LocalPipeline, NOT_HEARD_APOLOGY, UNAVAILABLE_APOLOGY};
pub use remote::{DEFAULT_REMOTE_TIMEOUT, RemoteProvider};

use crate::Result;
use crate::voice::CapturedUtterance;

/// What the user said
#[derive(Debug, Clone)]
pub enum UserInput {
    /// A recorded utterance
    Audio(CapturedUtterance),
    /// Text typed or already transcribed
    Text(String),
}

impl UserInput {
    /// Short description for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::Text(_) => "text",
        }
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// The remote answer service
    Remote,
    /// The local fallback pipeline
    Local,
    /// An apology after a failure
    Degraded,
}

/// An answer ready to be played
#[derive(Debug, Clone)]
pub struct ResponsePayload {
    /// Reply text
    pub text: String,
    /// Synthesized reply, if any
    pub audio: Option<PathBuf>,
    /// Emotion tag for the reply
    pub emotion: String,
    /// Time taken to produce the reply
    pub latency: Duration,
    /// Which path produced it
    pub source: ResponseSource,
}

impl ResponsePayload {
    /// An apology payload
    #[must_use]
    pub fn degraded(text: impl Into<String>, audio: Option<PathBuf>) -> Self {
        Self {
            text: text.into(),
            audio,
            emotion: emotion::ERROR.to_string(),
            latency: Duration::ZERO,
            source: ResponseSource::Degraded,
        }
    }
}

/// Produces a reply for one user turn
#[async_trait]
pub trait ResponseProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Answer the user
    ///
    /// # Errors
    ///
    /// Returns error if no reply could be produced
    async fn respond(&self, input: &UserInput) -> Result<ResponsePayload>;
}

/// Builds the fallback provider on first use
pub type ProviderFactory = Box<dyn Fn() -> Result<Box<dyn ResponseProvider>> + Send + Sync>;

/// Remote-first responder with a lazily built local fallback
pub struct ResponseOrchestrator {
    remote: Box<dyn ResponseProvider>,
    fallback: Option<Box<dyn ResponseProvider>>,
    factory: ProviderFactory,
}

impl ResponseOrchestrator {
    /// Create an orchestrator; `factory` runs only once a remote call fails
    #[must_use]
    pub fn new(remote: Box<dyn ResponseProvider>, factory: ProviderFactory) -> Self {
        Self {
            remote,
            fallback: None,
            factory,
        }
    }

    /// Answer the user, never failing
    pub async fn respond(&mut self, input: &UserInput) -> ResponsePayload {
        let start = Instant::now();

        let mut payload = match self.remote.respond(input).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    provider = self.remote.name(),
                    input = input.kind(),
                    error = %e,
                    "remote response failed, using local fallback"
                );
                self.respond_locally(input).await
            }
        };

        payload.latency = start.elapsed();
        tracing::info!(
            source = ?payload.source,
            emotion = %payload.emotion,
            latency_ms = u64::try_from(payload.latency.as_millis()).unwrap_or(u64::MAX),
            has_audio = payload.audio.is_some(),
            "response ready"
        );

        payload
    }

    /// Whether the fallback provider has been built
    #[must_use]
    pub const fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    async fn respond_locally(&mut self, input: &UserInput) -> ResponsePayload {
        if self.fallback.is_none() {
            match (self.factory)() {
                Ok(provider) => {
                    tracing::info!(provider = provider.name(), "local fallback initialized");
                    self.fallback = Some(provider);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to build local fallback");
                    return ResponsePayload::degraded(UNAVAILABLE_APOLOGY, None);
                }
            }
        }

        let Some(fallback) = self.fallback.as_ref() else {
            return ResponsePayload::degraded(UNAVAILABLE_APOLOGY, None);
        };

        match fallback.respond(input).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(provider = fallback.name(), error = %e, "local fallback failed");
                ResponsePayload::degraded(UNAVAILABLE_APOLOGY, None)
            }
        }
    }
}

impl Drop for ResponseOrchestrator {
    fn drop(&mut self) {
        tracing::debug!(fallback_built = self.fallback.is_some(), "response providers released");
    }
}
