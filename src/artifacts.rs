//! On-disk audio artifacts
//!
//! Captured utterances and synthesized responses are written under fixed
//! directories, named by timestamp, and kept for audit and replay.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Result;

/// Writes captured and synthesized audio to disk
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    captures_dir: PathBuf,
    responses_dir: PathBuf,
    seq: Arc<AtomicU64>,
}

impl ArtifactStore {
    /// Create the store under `root`, creating its directories
    ///
    /// # Errors
    ///
    /// Returns error if the directories cannot be created
    pub fn new(root: &Path) -> Result<Self> {
        let captures_dir = root.join("captures");
        let responses_dir = root.join("responses");

        std::fs::create_dir_all(&captures_dir)?;
        std::fs::create_dir_all(&responses_dir)?;

        tracing::debug!(root = %root.display(), "artifact store ready");

        Ok(Self {
            captures_dir,
            responses_dir,
            seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Persist a captured utterance (WAV bytes)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save_capture(&self, wav: &[u8]) -> Result<PathBuf> {
        let path = self.captures_dir.join(self.stamped_name("utterance", "wav"));
        std::fs::write(&path, wav)?;
        tracing::debug!(path = %path.display(), bytes = wav.len(), "utterance saved");
        Ok(path)
    }

    /// Persist synthesized response audio
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save_response(&self, audio: &[u8], extension: &str) -> Result<PathBuf> {
        let path = self
            .responses_dir
            .join(self.stamped_name("response", extension));
        std::fs::write(&path, audio)?;
        tracing::debug!(path = %path.display(), bytes = audio.len(), "response audio saved");
        Ok(path)
    }

    /// Directory holding captured utterances
    #[must_use]
    pub fn captures_dir(&self) -> &Path {
        &self.captures_dir
    }

    /// Directory holding synthesized responses
    #[must_use]
    pub fn responses_dir(&self) -> &Path {
        &self.responses_dir
    }

    fn stamped_name(&self, prefix: &str, extension: &str) -> String {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{ts}_{seq}.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let a = store.save_capture(b"RIFF").unwrap();
        let b = store.save_capture(b"RIFF").unwrap();
        let r = store.save_response(b"ID3", "mp3").unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with(dir.path().join("captures")));
        assert!(r.starts_with(dir.path().join("responses")));
        assert_eq!(r.extension().unwrap(), "mp3");
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("utterance_")
        );
    }
}
