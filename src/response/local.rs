//! Local fallback pipeline: transcribe, generate, synthesize

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::generate::Generator;
use super::{ResponsePayload, ResponseProvider, ResponseSource, UserInput, emotion};
use crate::artifacts::ArtifactStore;
use crate::voice::{Synthesizer, Transcriber};
use crate::{Error, Result};

/// Spoken when the user's audio could not be understood
pub const NOT_HEARD_APOLOGY: &str =
    "Sorry, I didn't catch that. Could you say it again?";

/// Spoken when no reply could be generated
pub const UNAVAILABLE_APOLOGY: &str =
    "Sorry, I'm having trouble thinking right now. Please try again in a moment.";

/// Answers on this machine using hosted speech and chat services
pub struct LocalPipeline {
    transcriber: Option<Arc<dyn Transcriber>>,
    generator: Option<Box<dyn Generator>>,
    synthesizers: Vec<Box<dyn Synthesizer>>,
    system_prompt: String,
    store: ArtifactStore,
}

impl LocalPipeline {
    /// Create a pipeline; each stage is optional
    ///
    /// Synthesizers are tried in order.
    #[must_use]
    pub fn new(
        transcriber: Option<Arc<dyn Transcriber>>,
        generator: Option<Box<dyn Generator>>,
        synthesizers: Vec<Box<dyn Synthesizer>>,
        system_prompt: String,
        store: ArtifactStore,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizers,
            system_prompt,
            store,
        }
    }

    async fn user_text(&self, input: &UserInput) -> Result<String> {
        let utterance = match input {
            UserInput::Text(text) => return Ok(text.clone()),
            UserInput::Audio(utterance) => utterance,
        };

        if let Some(transcript) = &utterance.transcript {
            return Ok(transcript.clone());
        }

        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| Error::Stt("no transcriber configured".to_string()))?;

        let text = transcriber.transcribe(&utterance.audio).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Stt("empty transcript".to_string()));
        }

        Ok(text.to_string())
    }

    async fn reply(&self, user_text: &str) -> Result<String> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| Error::Generation("no generator configured".to_string()))?;

        generator.generate(&self.system_prompt, user_text).await
    }

    /// Synthesize with the first synthesizer that succeeds
    async fn speak(&self, text: &str) -> Option<PathBuf> {
        for tts in &self.synthesizers {
            match tts.synthesize(text).await {
                Ok(audio) => match self.store.save_response(&audio, tts.extension()) {
                    Ok(path) => return Some(path),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to save synthesized audio");
                        return None;
                    }
                },
                Err(e) => {
                    tracing::warn!(tts = tts.name(), error = %e, "synthesis failed");
                }
            }
        }

        None
    }

    async fn apologize(&self, text: &str) -> ResponsePayload {
        let audio = self.speak(text).await;
        ResponsePayload::degraded(text, audio)
    }
}

#[async_trait]
impl ResponseProvider for LocalPipeline {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn respond(&self, input: &UserInput) -> Result<ResponsePayload> {
        let user_text = match self.user_text(input).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "local transcription failed");
                return Ok(self.apologize(NOT_HEARD_APOLOGY).await);
            }
        };

        tracing::info!(user_text = %user_text, "local pipeline handling turn");

        let reply = match self.reply(&user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "local generation failed");
                return Ok(self.apologize(UNAVAILABLE_APOLOGY).await);
            }
        };

        let Some(audio) = self.speak(&reply).await else {
            tracing::warn!("no synthesizer produced audio");
            return Ok(ResponsePayload::degraded(reply, None));
        };

        Ok(ResponsePayload {
            text: reply,
            audio: Some(audio),
            emotion: emotion::analyze_text(&user_text).to_string(),
            latency: Duration::ZERO,
            source: ResponseSource::Local,
        })
    }
}
