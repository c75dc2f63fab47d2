//! Wake word model resolution
//!
//! Models are distributed per platform, named
//! `<keyword>_<lang>_<variant>_<version>.<ext>`, either flat in a search
//! directory or inside a folder of the same stem. Resolution walks a
//! prioritized candidate list and returns the first existing file that is
//! not built for a portable target.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Markers in a model name that indicate a portable/interpreted target
const PORTABLE_MARKERS: &[&str] = &["wasm", "_web_"];

/// Operating system and CPU architecture used to pick model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// `std::env::consts::OS` style name
    pub os: &'static str,
    /// `std::env::consts::ARCH` style name
    pub arch: &'static str,
}

impl Platform {
    /// The platform this process is running on
    #[must_use]
    pub const fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    /// Model variant names to try, most specific first
    #[must_use]
    pub fn variants(&self) -> Vec<&'static str> {
        let arm = self.arch.contains("arm") || self.arch.contains("aarch");

        match self.os {
            "macos" if arm => vec!["mac_arm64", "mac", "mac_x86_64"],
            "macos" => vec!["mac_x86_64", "mac", "mac_arm64"],
            "linux" if arm => vec!["linux_arm64", "linux"],
            "windows" => vec!["windows"],
            _ => vec!["linux_x86_64", "linux"],
        }
    }
}

/// Naming convention of the model files
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Keyword stem, e.g. `hey-mentor`
    pub keyword: String,
    /// Language code
    pub language: String,
    /// Model format version tag
    pub version: String,
    /// File extension without the dot
    pub extension: String,
}

impl ModelSpec {
    /// File stem for a platform variant
    #[must_use]
    pub fn stem(&self, variant: &str) -> String {
        format!(
            "{}_{}_{}_{}",
            self.keyword, self.language, variant, self.version
        )
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            keyword: "hey-mentor".to_string(),
            language: "en".to_string(),
            version: "v3_0_0".to_string(),
            extension: "rpw".to_string(),
        }
    }
}

/// Resolves the wake word model from an explicit path or search directories
#[derive(Debug, Clone)]
pub struct ModelResolver {
    explicit: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    spec: ModelSpec,
    platform: Platform,
}

impl ModelResolver {
    /// Create a resolver for the current platform
    #[must_use]
    pub fn new(spec: ModelSpec, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            explicit: None,
            search_dirs,
            spec,
            platform: Platform::current(),
        }
    }

    /// Check this path before any convention-based candidate
    #[must_use]
    pub fn with_explicit(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    /// Resolve as if running on another platform
    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Candidate paths in priority order
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self.explicit.iter().cloned().collect();

        for variant in self.platform.variants() {
            let stem = self.spec.stem(variant);
            let file = format!("{stem}.{}", self.spec.extension);

            for dir in &self.search_dirs {
                out.push(dir.join(&stem).join(&file));
                out.push(dir.join(&file));
            }
        }

        out
    }

    /// Resolve using the real filesystem
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` naming every attempted path
    pub fn resolve(&self) -> Result<PathBuf> {
        self.resolve_with(Path::is_file)
    }

    /// Resolve with an injected existence check
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` naming every attempted path
    pub fn resolve_with(&self, exists: impl Fn(&Path) -> bool) -> Result<PathBuf> {
        let candidates = self.candidates();

        for path in &candidates {
            if is_portable_target(path) {
                tracing::debug!(path = %path.display(), "skipping portable-target model");
                continue;
            }
            if exists(path) {
                tracing::info!(path = %path.display(), "wake word model resolved");
                return Ok(path.clone());
            }
        }

        Err(Error::ModelNotFound {
            attempted: candidates,
        })
    }
}

/// Whether the model name marks a target this process cannot load
#[must_use]
pub fn is_portable_target(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let lower = name.to_string_lossy().to_lowercase();
    PORTABLE_MARKERS.iter().any(|m| lower.contains(m))
}
