//! Mentor Voice - hands-free, wake-word gated voice assistant
//!
//! This library provides the pieces of the assistant loop:
//! - Wake word detection and model resolution
//! - Microphone hand-over between the spotter and the utterance capturer
//! - Remote-first response generation with a local fallback pipeline
//! - Playback and the session state machine tying it together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     SessionLoop                       │
//! │  listening → capturing → responding → playing → ...   │
//! └───────┬──────────────────┬──────────────────┬────────┘
//!         │                  │                  │
//! ┌───────▼────────┐ ┌───────▼────────┐ ┌───────▼────────┐
//! │   Microphone   │ │    Response    │ │    Playback    │
//! │ spotter/capture│ │ remote │ local │ │  wav │ mp3     │
//! └────────────────┘ └────────────────┘ └────────────────┘
//! ```

pub mod artifacts;
pub mod config;
pub mod daemon;
pub mod error;
pub mod persona;
pub mod response;
pub mod session;
pub mod shutdown;
pub mod voice;

pub use artifacts::ArtifactStore;
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use persona::Persona;
pub use response::{
    ResponseOrchestrator, ResponsePayload, ResponseProvider, ResponseSource, UserInput,
};
pub use session::{SessionLoop, SessionParts, SessionState, SessionTimings};
pub use shutdown::ShutdownFlag;
