//! Configuration management for the voice assistant
//!
//! Values are layered: built-in defaults, then the optional TOML file, then
//! environment variables. Command-line flags are applied on top by the
//! binary.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::persona::Persona;
use crate::response::{DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_REMOTE_TIMEOUT};
use crate::session::SessionTimings;
use crate::voice::{
    CaptureSettings, DEFAULT_SERVICE_TIMEOUT, DEFAULT_SETTLE_DELAY, DEFAULT_STT_BASE_URL,
    DEFAULT_THRESHOLD, ModelSpec,
};
use crate::Result;
use file::MentorConfigFile;

/// Voice assistant configuration
#[derive(Debug)]
pub struct Config {
    /// Wake word engine
    pub wake_word: WakeWordConfig,

    /// Remote answer service
    pub remote: RemoteConfig,

    /// API keys for fallback services
    pub api_keys: ApiKeys,

    /// Local fallback services
    pub fallback: FallbackConfig,

    /// Recording thresholds
    pub capture: CaptureSettings,

    /// Loop limits
    pub session: SessionTimings,

    /// Pause between closing one microphone stream and opening the next
    pub settle_delay: Duration,

    /// Root for captured and synthesized audio
    pub data_dir: PathBuf,

    /// Active persona
    pub persona: Persona,
}

/// Wake word configuration
#[derive(Debug)]
pub struct WakeWordConfig {
    /// Engine access credential
    pub access_key: SecretString,

    /// Explicit model file, tried first
    pub model_path: Option<PathBuf>,

    /// Model naming
    pub model: ModelSpec,

    /// Directories searched for the model
    pub search_dirs: Vec<PathBuf>,

    /// Detection score threshold
    pub threshold: f32,
}

/// Remote answer service configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL; requests go to `{api_url}/api/ask`
    pub api_url: String,

    /// User id sent with each request
    pub user_id: String,

    /// Bound on one request
    pub timeout: Duration,
}

/// API keys for fallback services
#[derive(Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub groq: Option<SecretString>,
    pub elevenlabs: Option<SecretString>,
}

/// Local fallback service configuration
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Whisper model
    pub stt_model: String,

    /// Whisper-compatible base URL
    pub stt_base_url: String,

    /// Chat model
    pub chat_model: String,

    /// OpenAI-compatible chat base URL
    pub chat_base_url: String,

    /// `OpenAI` TTS model
    pub tts_model: String,

    /// Bound on one request to any fallback service
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a numeric environment value cannot be parsed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::from_sources(fc, |key| std::env::var(key).ok())?;

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a numeric environment value cannot be parsed
    pub fn from_sources(
        fc: MentorConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Data directory (~/.local/share/mentor on Linux)
        let data_dir = env("MENTOR_DATA_DIR")
            .map(PathBuf::from)
            .or(fc.data_dir)
            .unwrap_or_else(default_data_dir);

        let persona_path = env("MENTOR_PERSONA_PATH").map(PathBuf::from).or(fc.persona_path);
        let persona = Persona::load_or_default(persona_path.as_deref());

        let ww = fc.wake_word;
        let defaults = ModelSpec::default();
        let model = ModelSpec {
            keyword: env("WAKE_WORD_KEYWORD").or(ww.keyword).unwrap_or(defaults.keyword),
            language: ww.language.unwrap_or(defaults.language),
            version: ww.version.unwrap_or(defaults.version),
            extension: defaults.extension,
        };

        let mut search_dirs = ww.search_dirs;
        search_dirs.extend(default_model_dirs(&data_dir));

        let threshold = match env("WAKE_WORD_THRESHOLD") {
            Some(v) => parse_env("WAKE_WORD_THRESHOLD", &v)?,
            None => ww.threshold.unwrap_or(DEFAULT_THRESHOLD),
        };

        let wake_word = WakeWordConfig {
            access_key: SecretString::from(
                env("WAKE_WORD_ACCESS_KEY").or(ww.access_key).unwrap_or_default(),
            ),
            model_path: env("WAKE_WORD_MODEL_PATH").map(PathBuf::from).or(ww.model_path),
            model,
            search_dirs,
            threshold,
        };

        let timeout = match env("MENTOR_API_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_env("MENTOR_API_TIMEOUT_SECS", &v)?),
            None => fc
                .remote
                .timeout_secs
                .map_or(DEFAULT_REMOTE_TIMEOUT, Duration::from_secs),
        };

        let remote = RemoteConfig {
            api_url: env("MENTOR_API_URL")
                .or(fc.remote.api_url)
                .unwrap_or_else(|| "http://localhost:5000".to_string()),
            user_id: env("MENTOR_USER_ID")
                .or(fc.remote.user_id)
                .unwrap_or_else(|| "anonymous".to_string()),
            timeout,
        };

        // Load API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai).map(SecretString::from),
            groq: env("GROQ_API_KEY").or(fc.api_keys.groq).map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
        };

        let fb = fc.fallback;
        let fallback_timeout = match env("MENTOR_FALLBACK_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_env("MENTOR_FALLBACK_TIMEOUT_SECS", &v)?),
            None => fb.timeout_secs.map_or(DEFAULT_SERVICE_TIMEOUT, Duration::from_secs),
        };
        let fallback = FallbackConfig {
            stt_model: fb.stt_model.unwrap_or_else(|| "whisper-1".to_string()),
            stt_base_url: fb
                .stt_base_url
                .unwrap_or_else(|| DEFAULT_STT_BASE_URL.to_string()),
            chat_model: fb.chat_model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            chat_base_url: fb
                .chat_base_url
                .unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string()),
            tts_model: fb.tts_model.unwrap_or_else(|| "tts-1".to_string()),
            timeout: fallback_timeout,
        };

        let cf = fc.capture;
        let cd = CaptureSettings::default();
        let capture = CaptureSettings {
            energy_floor: cf.energy_floor.unwrap_or(cd.energy_floor),
            follow_up_energy_floor: cf
                .follow_up_energy_floor
                .unwrap_or(cd.follow_up_energy_floor),
            min_utterance_bytes: cf.min_utterance_bytes.unwrap_or(cd.min_utterance_bytes),
            min_follow_up_chars: cf.min_follow_up_chars.unwrap_or(cd.min_follow_up_chars),
            topic_keywords: cf.topic_keywords,
            topic_mode: cf.topic_mode.unwrap_or(cd.topic_mode),
            ..cd
        };
        let settle_delay = cf
            .settle_delay_ms
            .map_or(DEFAULT_SETTLE_DELAY, Duration::from_millis);

        let sf = fc.session;
        let sd = SessionTimings::default();
        let session = SessionTimings {
            capture_timeout: sf
                .capture_timeout_secs
                .map_or(sd.capture_timeout, Duration::from_secs),
            phrase_limit: sf.phrase_limit_secs.map_or(sd.phrase_limit, Duration::from_secs),
            follow_up_window: sf
                .follow_up_window_secs
                .map_or(sd.follow_up_window, Duration::from_secs),
            max_follow_ups: sf.max_follow_ups.unwrap_or(sd.max_follow_ups),
            reopen_attempts: sf.reopen_attempts.unwrap_or(sd.reopen_attempts).max(1),
        };

        Ok(Self {
            wake_word,
            remote,
            api_keys,
            fallback,
            capture,
            session,
            settle_delay,
            data_dir,
            persona,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("invalid {key}={value}: {e}")))
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/mentor"),
        |d| d.data_dir().join("mentor"),
    )
}

/// Model search directories, in priority order
fn default_model_dirs(data_dir: &std::path::Path) -> Vec<PathBuf> {
    let mut dirs = vec![data_dir.join("models"), PathBuf::from("models")];

    if let Some(d) = directories::BaseDirs::new() {
        dirs.push(d.config_dir().join("mentor").join("models"));
    }

    dirs
}
