//! Vocal configuration loaded from TOML and environment.
//!
//! | Key / Env | Default | Description |
//! |-----------|---------|-------------|
//! | `enabled` / PAGI_VOCAL__ENABLED | true | Voice toggle. When false every `speak*` call is a no-op. |
//! | `min_flush_chars` / PAGI_VOCAL__MIN_FLUSH_CHARS | 15 | Trimmed length a unit must exceed before a sentence delimiter flushes it. |
//! | `min_play_samples` / PAGI_VOCAL__MIN_PLAY_SAMPLES | 12000 | Samples accumulated before a frame is queued (~0.5s at 24kHz). |
//! | `sample_rate` / PAGI_VOCAL__SAMPLE_RATE | 24000 | Engine output rate. |
//! | `queue_poll_ms` | 1000 | Playback worker wait timeout on an empty queue. |
//! | `halt_poll_ms` | 20 | How often the device checks for completion / interruption. |
//! | `default_voice` | pm_alex | Voice for personas with no matching entry. |
//! | `default_speed` | 0.9 | Speech rate for the fallback voice and entries without `speed`. |
//! | `tts_api_url` / TTS_API_URL | http://localhost:8880/v1 | OpenAI-compatible speech endpoint base. |
//! | `tts_api_key` / TTS_API_KEY | (none) | Bearer key, optional for local servers. |
//! | `output_device` | (none) | Substring of the output device name; default device when unset. |

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One persona → voice mapping entry, as written in `[[voices]]` tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Persona key, matched as a case-insensitive substring of the display name.
    pub persona: String,
    /// Synthesizer voice identifier (e.g. `pm_alex`).
    pub voice: String,
    /// Speech rate multiplier; falls back to `default_speed` when absent.
    #[serde(default)]
    pub speed: Option<f32>,
}

impl VoiceEntry {
    fn new(persona: &str, voice: &str) -> Self {
        Self {
            persona: persona.to_string(),
            voice: voice.to_string(),
            speed: None,
        }
    }
}

fn default_voices() -> Vec<VoiceEntry> {
    vec![
        VoiceEntry::new("The Architect", "pm_alex"),
        VoiceEntry::new("The Strategist", "pm_alex"),
        VoiceEntry::new("The Operator", "pm_alex"),
        VoiceEntry::new("The Polymath", "pf_dora"),
    ]
}

/// Configuration for the voice response pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VocalConfig {
    pub enabled: bool,
    pub min_flush_chars: usize,
    pub min_play_samples: usize,
    pub sample_rate: u32,
    pub queue_poll_ms: u64,
    pub halt_poll_ms: u64,
    pub default_voice: String,
    pub default_speed: f32,
    /// Ordered persona table; first match wins.
    pub voices: Vec<VoiceEntry>,
    pub tts_api_url: Option<String>,
    pub tts_api_key: Option<String>,
    /// TTS model name sent to the endpoint (`kokoro` for a local Kokoro server, `tts-1` for OpenAI).
    pub tts_model: String,
    pub tts_timeout_secs: u64,
    pub output_device: Option<String>,
}

impl Default for VocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_flush_chars: 15,
            min_play_samples: 12_000,
            sample_rate: 24_000,
            queue_poll_ms: 1_000,
            halt_poll_ms: 20,
            default_voice: "pm_alex".to_string(),
            default_speed: 0.9,
            voices: default_voices(),
            tts_api_url: None,
            tts_api_key: None,
            tts_model: "kokoro".to_string(),
            tts_timeout_secs: 60,
            output_device: None,
        }
    }
}

impl VocalConfig {
    /// Load config from file and environment.
    ///
    /// Precedence: `PAGI_VOCAL__*` env > file (`PAGI_VOCAL_CONFIG` path, else `config/vocal.toml`) > defaults.
    /// `TTS_API_URL` / `TTS_API_KEY` fill the endpoint fields when neither source set them.
    pub fn load() -> VoiceResult<Self> {
        let config_path =
            std::env::var("PAGI_VOCAL_CONFIG").unwrap_or_else(|_| "config/vocal.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same as [`VocalConfig::load`] with an explicit file path (missing file is not an error).
    pub fn load_from(path: &Path) -> VoiceResult<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("PAGI_VOCAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Self = built.try_deserialize()?;
        cfg.apply_endpoint_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> VoiceResult<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_endpoint_env(&mut self) {
        if self.tts_api_url.is_none() {
            self.tts_api_url = env_opt_string("TTS_API_URL");
        }
        if self.tts_api_key.is_none() {
            self.tts_api_key =
                env_opt_string("TTS_API_KEY").or_else(|| env_opt_string("OPENAI_API_KEY"));
        }
    }

    /// Reject values that would stall or corrupt the pipeline.
    pub fn validate(&self) -> VoiceResult<()> {
        if self.sample_rate == 0 {
            return Err(VoiceError::Config("sample_rate must be > 0".to_string()));
        }
        if self.min_play_samples == 0 {
            return Err(VoiceError::Config("min_play_samples must be > 0".to_string()));
        }
        if self.queue_poll_ms == 0 || self.halt_poll_ms == 0 {
            return Err(VoiceError::Config(
                "queue_poll_ms and halt_poll_ms must be > 0".to_string(),
            ));
        }
        check_speed("default_speed", self.default_speed)?;
        for entry in &self.voices {
            if entry.persona.trim().is_empty() {
                return Err(VoiceError::Config(format!(
                    "voice entry '{}' has an empty persona key",
                    entry.voice
                )));
            }
            if let Some(speed) = entry.speed {
                check_speed(&entry.persona, speed)?;
            }
        }
        Ok(())
    }

    /// Endpoint base without trailing slash.
    pub fn tts_base_url(&self) -> String {
        self.tts_api_url
            .as_deref()
            .unwrap_or("http://localhost:8880/v1")
            .trim_end_matches('/')
            .to_string()
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn halt_poll(&self) -> Duration {
        Duration::from_millis(self.halt_poll_ms)
    }
}

fn check_speed(label: &str, speed: f32) -> VoiceResult<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(VoiceError::Config(format!(
            "speed for '{}' must be a positive number, got {}",
            label, speed
        )));
    }
    Ok(())
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
