//! Daemon - the voice assistant service
//!
//! Builds every component from the configuration and runs the session loop
//! until Ctrl-C.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::artifacts::ArtifactStore;
use crate::config::{ApiKeys, Config, FallbackConfig};
use crate::persona::Persona;
use crate::response::{
    ChatGenerator, Generator, LocalPipeline, ProviderFactory, RemoteProvider,
    ResponseOrchestrator, ResponseProvider,
};
use crate::session::{SessionLoop, SessionParts};
use crate::shutdown::ShutdownFlag;
use crate::voice::{
    AudioPlayback, CpalInputDevice, ElevenLabsSynthesizer, MicrophoneArbiter, ModelResolver,
    OpenAiSynthesizer, PlaybackController, RustpotterSpotter, Synthesizer, Transcriber,
    UtteranceCapturer, WhisperTranscriber, validate_credential,
};
use crate::{Error, Result};

/// Chat endpoint used when only an `OpenAI` key is available
const OPENAI_CHAT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat model used when only an `OpenAI` key is available
const OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

/// The voice assistant daemon
pub struct Daemon {
    config: Config,
    shutdown: ShutdownFlag,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the wake word model or credential is unusable, or
    /// the microphone is lost
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let ctrl_c = self.shutdown.raise_on_ctrl_c();

        let mut session = self.build_session()?.with_status_lines(true);
        let result = session.run().await;

        ctrl_c.abort();
        result
    }

    fn build_session(&self) -> Result<SessionLoop> {
        let config = &self.config;
        let store = ArtifactStore::new(&config.data_dir)?;

        validate_credential(&config.wake_word.access_key)?;

        let model_path = ModelResolver::new(
            config.wake_word.model.clone(),
            config.wake_word.search_dirs.clone(),
        )
        .with_explicit(config.wake_word.model_path.clone())
        .resolve()?;

        let spotter = RustpotterSpotter::initialize(
            &model_path,
            &config.wake_word.access_key,
            config.wake_word.threshold,
        )?;

        let transcriber = build_transcriber(&config.api_keys, &config.fallback);

        let capturer = UtteranceCapturer::new(
            config.capture.clone(),
            store.clone(),
            transcriber.clone(),
        );

        let remote = RemoteProvider::new(
            &config.remote.api_url,
            config.remote.user_id.clone(),
            config.remote.timeout,
            store.clone(),
        )?;

        let factory = fallback_factory(
            FallbackKeys::from(&config.api_keys),
            config.fallback.clone(),
            config.persona.clone(),
            transcriber,
            store,
        );

        tracing::info!(
            model = %model_path.display(),
            api_url = %config.remote.api_url,
            user_id = %config.remote.user_id,
            data_dir = %config.data_dir.display(),
            persona = %config.persona.name,
            "voice assistant ready"
        );

        Ok(SessionLoop::new(SessionParts {
            spotter: Box::new(spotter),
            mic: MicrophoneArbiter::new(Box::new(CpalInputDevice::new()), config.settle_delay),
            capturer,
            orchestrator: ResponseOrchestrator::new(Box::new(remote), factory),
            playback: PlaybackController::new(Box::new(AudioPlayback::new())),
            timings: config.session,
            shutdown: self.shutdown.clone(),
        }))
    }
}

/// Fallback credentials, owned by the factory
struct FallbackKeys {
    openai: Option<SecretString>,
    groq: Option<SecretString>,
    elevenlabs: Option<SecretString>,
}

impl From<&ApiKeys> for FallbackKeys {
    fn from(keys: &ApiKeys) -> Self {
        Self {
            openai: keys.openai.as_ref().map(duplicate),
            groq: keys.groq.as_ref().map(duplicate),
            elevenlabs: keys.elevenlabs.as_ref().map(duplicate),
        }
    }
}

fn duplicate(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

fn build_transcriber(keys: &ApiKeys, fallback: &FallbackConfig) -> Option<Arc<dyn Transcriber>> {
    let key = keys.openai.as_ref()?;

    let built = WhisperTranscriber::new(duplicate(key), fallback.stt_model.clone())
        .and_then(|stt| {
            stt.with_base_url(fallback.stt_base_url.clone())
                .with_timeout(fallback.timeout)
        });

    match built {
        Ok(stt) => Some(Arc::new(stt)),
        Err(e) => {
            tracing::warn!(error = %e, "transcription unavailable");
            None
        }
    }
}

/// Build the local pipeline lazily; nothing here runs until the remote
/// service first fails
fn fallback_factory(
    keys: FallbackKeys,
    fallback: FallbackConfig,
    persona: Persona,
    transcriber: Option<Arc<dyn Transcriber>>,
    store: ArtifactStore,
) -> ProviderFactory {
    Box::new(move || {
        let generator: Box<dyn Generator> = match (&keys.groq, &keys.openai) {
            (Some(groq), _) => Box::new(
                ChatGenerator::new(duplicate(groq))?
                    .with_base_url(fallback.chat_base_url.clone())
                    .with_model(fallback.chat_model.clone())
                    .with_timeout(fallback.timeout)?,
            ),
            (None, Some(openai)) => Box::new(
                ChatGenerator::new(duplicate(openai))?
                    .with_base_url(OPENAI_CHAT_BASE_URL)
                    .with_model(OPENAI_CHAT_MODEL)
                    .with_timeout(fallback.timeout)?,
            ),
            (None, None) => {
                return Err(Error::Config(
                    "no GROQ_API_KEY or OPENAI_API_KEY for local fallback".to_string(),
                ));
            }
        };

        let mut synthesizers: Vec<Box<dyn Synthesizer>> = Vec::new();

        if let Some(key) = &keys.elevenlabs {
            let voice_id = persona.voice.elevenlabs_voice.clone();
            synthesizers.push(Box::new(
                ElevenLabsSynthesizer::new(duplicate(key), voice_id)?
                    .with_timeout(fallback.timeout)?,
            ));
        }

        if let Some(key) = &keys.openai {
            synthesizers.push(Box::new(
                OpenAiSynthesizer::new(
                    duplicate(key),
                    persona.voice.openai_voice.clone(),
                    persona.voice.speed,
                )?
                .with_model(fallback.tts_model.clone())
                .with_timeout(fallback.timeout)?,
            ));
        }

        if synthesizers.is_empty() {
            tracing::warn!("no speech synthesis keys, local replies will be silent");
        }

        let pipeline = LocalPipeline::new(
            transcriber.clone(),
            Some(generator),
            synthesizers,
            persona.system_prompt(),
            store.clone(),
        );

        Ok(Box::new(pipeline) as Box<dyn ResponseProvider>)
    })
}
