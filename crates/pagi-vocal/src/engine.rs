//! Speech engines: turn cleaned text into a stream of raw sample sub-chunks.
//!
//! Implement [`SpeechEngine`] for any local or remote TTS. The stream may hand back
//! chunks of any size; sizing them for playback is the synthesizer's job.

use crate::config::VocalConfig;
use crate::error::{VoiceError, VoiceResult};
use std::io::{ErrorKind, Read};
use std::time::Duration;
use tracing::{debug, info};

/// Lazy, finite, non-restartable sequence of mono f32 sub-chunks.
pub type ChunkStream = Box<dyn Iterator<Item = VoiceResult<Vec<f32>>> + Send>;

/// Backend that synthesizes speech incrementally.
pub trait SpeechEngine: Send + Sync {
    /// Sample rate of every chunk this engine produces.
    fn sample_rate(&self) -> u32;

    /// Start synthesizing `text` with `voice` at `speed`. Errors here mean nothing was produced.
    fn stream(&self, text: &str, voice: &str, speed: f32) -> VoiceResult<ChunkStream>;
}

/// Placeholder engine: produces no audio. Use for wiring the pipeline without a TTS server.
#[derive(Debug, Clone)]
pub struct PlaceholderEngine {
    pub sample_rate: u32,
}

impl Default for PlaceholderEngine {
    fn default() -> Self {
        Self { sample_rate: 24_000 }
    }
}

impl SpeechEngine for PlaceholderEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stream(&self, text: &str, voice: &str, _speed: f32) -> VoiceResult<ChunkStream> {
        debug!("PlaceholderEngine: skipping '{}' ({})", text, voice);
        Ok(Box::new(std::iter::empty()))
    }
}

/// Bytes requested from the HTTP body per read: 0.1s of 24kHz s16le.
const PCM_READ_BYTES: usize = 4_800;

/// OpenAI-compatible `/audio/speech` engine (OpenAI, a local Kokoro server, etc.).
///
/// Requests `response_format = "pcm"` (24kHz mono signed 16-bit little-endian) and
/// reads the body incrementally, so the first frame is ready before the server
/// has finished the whole sentence.
#[derive(Debug, Clone)]
pub struct HttpSpeechEngine {
    /// Base URL without trailing slash (e.g. http://localhost:8880/v1).
    pub base_url: String,
    /// Bearer key; local servers usually need none.
    pub api_key: Option<String>,
    pub model: String,
    sample_rate: u32,
    client: reqwest::blocking::Client,
}

impl HttpSpeechEngine {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| VoiceError::EngineInit(format!("invalid TTS url '{}': {}", base_url, e)))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::EngineInit(e.to_string()))?;
        Ok(Self {
            base_url,
            api_key,
            model: model.into(),
            sample_rate: 24_000,
            client,
        })
    }

    pub fn from_config(config: &VocalConfig) -> VoiceResult<Self> {
        let engine = Self::new(
            config.tts_base_url(),
            config.tts_api_key.clone(),
            config.tts_model.clone(),
            Duration::from_secs(config.tts_timeout_secs),
        )?;
        if engine.sample_rate != config.sample_rate {
            return Err(VoiceError::Config(format!(
                "PCM speech endpoint produces {}Hz, config expects {}Hz",
                engine.sample_rate, config.sample_rate
            )));
        }
        info!("🔈 HttpSpeechEngine: {} (model {})", engine.base_url, engine.model);
        Ok(engine)
    }
}

impl SpeechEngine for HttpSpeechEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stream(&self, text: &str, voice: &str, speed: f32) -> VoiceResult<ChunkStream> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice,
            "speed": speed,
            "response_format": "pcm",
        });
        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let res = request.send()?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "TTS API error {}: {}",
                status, body
            )));
        }
        Ok(Box::new(PcmChunks::new(res)))
    }
}

/// Reads s16le PCM from any reader and yields normalized f32 sub-chunks.
pub struct PcmChunks<R> {
    reader: R,
    buf: Vec<u8>,
    carry: Option<u8>,
    done: bool,
}

impl<R: Read> PcmChunks<R> {
    pub fn new(reader: R) -> Self {
        Self::with_read_size(reader, PCM_READ_BYTES)
    }

    pub fn with_read_size(reader: R, read_bytes: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; read_bytes.max(2)],
            carry: None,
            done: false,
        }
    }
}

impl<R: Read> Iterator for PcmChunks<R> {
    type Item = VoiceResult<Vec<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let n = match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(VoiceError::Synthesis(format!(
                        "reading PCM body: {}",
                        e
                    ))));
                }
            };

            // A read may split a sample; keep the odd byte for the next round.
            let mut bytes = Vec::with_capacity(n + 1);
            bytes.extend(self.carry.take());
            bytes.extend_from_slice(&self.buf[..n]);
            if bytes.len() % 2 == 1 {
                self.carry = bytes.pop();
            }
            if bytes.is_empty() {
                continue;
            }
            let samples = bytes
                .chunks_exact(2)
                .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
                .collect();
            return Some(Ok(samples));
        }
    }
}
