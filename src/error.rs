//! Error types for the voice assistant

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No compatible wake word model at any candidate path
    #[error("wake word model not found; tried: {}", format_paths(.attempted))]
    ModelNotFound {
        /// Every path that was checked, in priority order
        attempted: Vec<PathBuf>,
    },

    /// Wake word access credential rejected
    #[error("invalid access credential: {0}")]
    InvalidCredential(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone could not be opened or handed over
    #[error("microphone error: {0}")]
    Microphone(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Reply generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// Remote answer service error
    #[error("remote error: {0}")]
    Remote(String),

    /// Session state machine misuse
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the error must stop the process rather than the current cycle
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound { .. } | Self::InvalidCredential(_) | Self::Microphone(_)
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<no candidates>".to_string();
    }

    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
