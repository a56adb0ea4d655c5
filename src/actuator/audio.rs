//! Static catalogue of the audio feedback clips.
//!
//! Clips are a closed enum mapped to file names. The library checks every file
//! once at startup; a missing clip resolves to the fallback clip, and a lookup
//! only fails when the fallback itself is missing.

use crate::core::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Language of the spoken feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ita,
    #[default]
    Eng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioClip {
    NonDangerousIta,
    NonDangerousEng,
    DangerousIta,
    DangerousEng,
    /// Played when a severity clip is missing on disk
    Fallback,
}

impl AudioClip {
    pub const ALL: [AudioClip; 5] = [
        AudioClip::NonDangerousIta,
        AudioClip::NonDangerousEng,
        AudioClip::DangerousIta,
        AudioClip::DangerousEng,
        AudioClip::Fallback,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            AudioClip::NonDangerousIta => "non_dangerous_ita.mp3",
            AudioClip::NonDangerousEng => "non_dangerous_eng.mp3",
            AudioClip::DangerousIta => "dangerous_ita.mp3",
            AudioClip::DangerousEng => "dangerous_eng.mp3",
            AudioClip::Fallback => "default.mp3",
        }
    }

    /// Clip played for a severity in the given language.
    pub fn for_severity(severity: Severity, language: Language) -> Self {
        match (severity, language) {
            (Severity::Mild, Language::Ita) => AudioClip::NonDangerousIta,
            (Severity::Mild, Language::Eng) => AudioClip::NonDangerousEng,
            (Severity::Strong, Language::Ita) => AudioClip::DangerousIta,
            (Severity::Strong, Language::Eng) => AudioClip::DangerousEng,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio clip {clip:?} missing at {path:?} and no fallback available")]
    Missing { clip: AudioClip, path: PathBuf },
}

/// Clip paths resolved against an audio directory.
#[derive(Debug, Clone)]
pub struct AudioLibrary {
    base_path: PathBuf,
    available: HashMap<AudioClip, PathBuf>,
}

impl AudioLibrary {
    /// Check every clip under `base_path`. Never fails; see [`AudioLibrary::missing`].
    pub fn resolve(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        let mut available = HashMap::new();

        for clip in AudioClip::ALL {
            let path = base_path.join(clip.file_name());
            if path.is_file() {
                available.insert(clip, path);
            } else {
                tracing::warn!(clip = ?clip, path = %path.display(), "Missing audio file");
            }
        }

        Self {
            base_path,
            available,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path to play for `clip`, falling back to the default clip.
    pub fn path(&self, clip: AudioClip) -> Result<&Path, AudioError> {
        self.available
            .get(&clip)
            .or_else(|| self.available.get(&AudioClip::Fallback))
            .map(PathBuf::as_path)
            .ok_or_else(|| AudioError::Missing {
                clip,
                path: self.base_path.join(clip.file_name()),
            })
    }

    /// Clips whose file was not found at startup.
    pub fn missing(&self) -> Vec<AudioClip> {
        AudioClip::ALL
            .into_iter()
            .filter(|clip| !self.available.contains_key(clip))
            .collect()
    }
}
