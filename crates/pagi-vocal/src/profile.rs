//! Persona → voice resolution.

use crate::config::{VocalConfig, VoiceEntry};
use serde::Serialize;

/// The voice a persona speaks with. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceProfile {
    /// Persona key that matched, or `None` for the fallback voice.
    pub persona: Option<String>,
    pub voice_id: String,
    pub speed: f32,
}

/// Ordered persona table loaded once at startup.
///
/// Lookup is deterministic: entries are checked in order and the first whose key
/// is contained in the display name (case-insensitive) wins.
#[derive(Debug, Clone)]
pub struct VoiceBook {
    entries: Vec<VoiceProfile>,
    fallback: VoiceProfile,
}

impl VoiceBook {
    pub fn new(entries: &[VoiceEntry], default_voice: &str, default_speed: f32) -> Self {
        let entries = entries
            .iter()
            .map(|e| VoiceProfile {
                persona: Some(e.persona.trim().to_lowercase()),
                voice_id: e.voice.clone(),
                speed: e.speed.unwrap_or(default_speed),
            })
            .collect();
        Self {
            entries,
            fallback: VoiceProfile {
                persona: None,
                voice_id: default_voice.to_string(),
                speed: default_speed,
            },
        }
    }

    pub fn from_config(config: &VocalConfig) -> Self {
        Self::new(&config.voices, &config.default_voice, config.default_speed)
    }

    /// Resolve a persona display name. Unmatched or empty names get the fallback voice.
    pub fn resolve(&self, persona: &str) -> &VoiceProfile {
        let name = persona.to_lowercase();
        self.entries
            .iter()
            .find(|p| p.persona.as_deref().is_some_and(|key| name.contains(key)))
            .unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &VoiceProfile {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
