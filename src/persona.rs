//! Persona configuration
//!
//! The persona is the fixed context handed to the local reply generator and
//! the voices used to speak its replies. It is read from a TOML file; every
//! field is optional and falls back to the built-in mentor.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Identity and voice of the assistant
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Persona {
    /// Display name
    pub name: String,

    /// Opening role statement
    pub role: String,

    /// How the assistant comes across
    pub personality: String,

    /// Level explanations are pitched at
    pub difficulty_level: String,

    /// What the user is working towards
    pub learning_goals: Vec<String>,

    /// Extra instructions appended to the prompt
    pub instructions: Option<String>,

    /// Voice configuration
    pub voice: Voice,
}

/// Voices used for synthesis
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Voice {
    /// ElevenLabs voice id
    pub elevenlabs_voice: String,

    /// `OpenAI` voice name
    pub openai_voice: String,

    /// Speech rate multiplier
    pub speed: f32,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            elevenlabs_voice: crate::voice::DEFAULT_ELEVENLABS_VOICE.to_string(),
            openai_voice: "alloy".to_string(),
            speed: 1.0,
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Mentor".to_string(),
            role: "You are Mentor, a voice learning companion.".to_string(),
            personality: "friendly and educational".to_string(),
            difficulty_level: "beginner".to_string(),
            learning_goals: Vec::new(),
            instructions: None,
            voice: Voice::default(),
        }
    }
}

impl Persona {
    /// Load a persona from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let persona: Self = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), name = %persona.name, "loaded persona");
        Ok(persona)
    }

    /// Load from `path` if given, otherwise use the built-in persona
    ///
    /// A file that cannot be loaded is logged and ignored.
    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        path.map_or_else(Self::default, |p| {
            Self::load(p).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %p.display(),
                    error = %e,
                    "failed to load persona, using default"
                );
                Self::default()
            })
        })
    }

    /// Render the system prompt for reply generation
    #[must_use]
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("{}\n\nPersonality: {}", self.role, self.personality);

        prompt.push_str(&format!(
            "\n\nAdapt your explanations for a {} level learner.",
            self.difficulty_level
        ));

        if !self.learning_goals.is_empty() {
            prompt.push_str(&format!(
                "\n\nTheir learning goals include: {}",
                self.learning_goals.join(", ")
            ));
        }

        if let Some(instructions) = self.instructions.as_deref().filter(|s| !s.is_empty()) {
            prompt.push_str("\n\n");
            prompt.push_str(instructions);
        }

        prompt.push_str(&format!(
            "\n\nYour name is {}. Your replies are spoken aloud, so keep them short and conversational.",
            self.name
        ));

        prompt
    }
}
