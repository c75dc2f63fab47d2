//! TOML configuration file loading
//!
//! Supports `~/.config/mentor/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::voice::TopicMode;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MentorConfigFile {
    /// Root for captured and synthesized audio
    pub data_dir: Option<PathBuf>,

    /// Persona TOML file
    pub persona_path: Option<PathBuf>,

    /// Wake word engine
    #[serde(default)]
    pub wake_word: WakeWordFileConfig,

    /// Remote answer service
    #[serde(default)]
    pub remote: RemoteFileConfig,

    /// API keys for fallback services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Local fallback services
    #[serde(default)]
    pub fallback: FallbackFileConfig,

    /// Recording thresholds
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Loop limits
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    pub access_key: Option<String>,
    pub model_path: Option<PathBuf>,
    pub keyword: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub threshold: Option<f32>,
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,
}

/// Remote answer service configuration
#[derive(Debug, Default, Deserialize)]
pub struct RemoteFileConfig {
    pub api_url: Option<String>,
    pub user_id: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub groq: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Fallback service configuration
#[derive(Debug, Default, Deserialize)]
pub struct FallbackFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Whisper-compatible base URL
    pub stt_base_url: Option<String>,

    /// Chat model for replies
    pub chat_model: Option<String>,

    /// OpenAI-compatible chat base URL
    pub chat_base_url: Option<String>,

    /// `OpenAI` TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// Request timeout for every fallback service
    pub timeout_secs: Option<u64>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub energy_floor: Option<f64>,
    pub follow_up_energy_floor: Option<f64>,
    pub min_utterance_bytes: Option<usize>,
    pub min_follow_up_chars: Option<usize>,
    pub settle_delay_ms: Option<u64>,
    #[serde(default)]
    pub topic_keywords: Vec<String>,
    pub topic_mode: Option<TopicMode>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub capture_timeout_secs: Option<u64>,
    pub phrase_limit_secs: Option<u64>,
    pub follow_up_window_secs: Option<u64>,
    pub max_follow_ups: Option<usize>,
    pub reopen_attempts: Option<usize>,
}

/// Load the TOML config file if it exists
///
/// Returns `MentorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MentorConfigFile {
    let Some(path) = config_file_path() else {
        return MentorConfigFile::default();
    };

    if !path.exists() {
        return MentorConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            MentorConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MentorConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> crate::Result<MentorConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/mentor/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("mentor").join("config.toml"))
}
