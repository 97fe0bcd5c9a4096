//! Test doubles: a scripted speech engine and a recording playback device.

#![allow(dead_code)]

use pagi_vocal::{
    AudioFrame, CancelToken, ChunkStream, DeviceFactory, PlayOutcome, PlaybackDevice,
    SpeechEngine, VocalConfig, VoiceError, VoiceResult, VoiceSession,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SAMPLES_PER_WORD: usize = 100;

/// Sample value of chunk `index` of request `request`.
fn marker(request: usize, index: usize) -> f32 {
    (request * 1_000 + index) as f32
}

fn unmark(sample: f32) -> (usize, usize) {
    let value = sample.round() as usize;
    (value / 1_000, value % 1_000)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("pagi_vocal=debug")
        .try_init();
}

/// Small thresholds so every word becomes one frame.
pub fn test_config() -> VocalConfig {
    VocalConfig {
        min_flush_chars: 10,
        min_play_samples: SAMPLES_PER_WORD,
        queue_poll_ms: 20,
        halt_poll_ms: 1,
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

/// Emits one chunk per word. Every sample of chunk `i` of request `n` encodes
/// `(n, i)`, so the device can tell which request a frame came from and where.
#[derive(Default)]
pub struct ScriptedEngine {
    pub requests: Mutex<Vec<Request>>,
    /// Requests whose text contains this word fail after their first chunk.
    pub fail_on: Option<String>,
    /// Pause before the first chunk, like a server warming up.
    pub delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn texts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.text.clone()).collect()
    }
}

impl SpeechEngine for ScriptedEngine {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn stream(&self, text: &str, voice: &str, speed: f32) -> VoiceResult<ChunkStream> {
        let request = {
            let mut requests = self.requests.lock();
            requests.push(Request {
                text: text.to_string(),
                voice: voice.to_string(),
                speed,
            });
            requests.len() - 1
        };
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let words = text.split_whitespace().count().max(1);
        let fail = self
            .fail_on
            .as_deref()
            .is_some_and(|word| text.contains(word));
        Ok(Box::new((0..words).map(move |i| {
            if fail && i == 1 {
                Err(VoiceError::Synthesis("scripted failure".to_string()))
            } else {
                Ok(vec![marker(request, i); SAMPLES_PER_WORD])
            }
        })))
    }
}

/// `(request, chunk)` of each frame the device saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Played {
    Finished((usize, usize)),
    Interrupted((usize, usize)),
}

/// Shared view of what the device did.
#[derive(Clone, Default)]
pub struct DeviceLog {
    pub played: Arc<Mutex<Vec<Played>>>,
    pub started: Arc<Mutex<usize>>,
    /// While set, `play` blocks until released or cancelled.
    pub hold: Arc<AtomicBool>,
}

impl DeviceLog {
    /// Request index of every frame played to completion, in play order.
    pub fn finished(&self) -> Vec<usize> {
        self.finished_frames().into_iter().map(|(request, _)| request).collect()
    }

    pub fn finished_frames(&self) -> Vec<(usize, usize)> {
        self.played
            .lock()
            .iter()
            .filter_map(|p| match p {
                Played::Finished(frame) => Some(*frame),
                Played::Interrupted(_) => None,
            })
            .collect()
    }

    pub fn interrupted(&self) -> usize {
        self.played
            .lock()
            .iter()
            .filter(|p| matches!(p, Played::Interrupted(_)))
            .count()
    }

    pub fn wait_started(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while *self.started.lock() < count {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn factory(&self) -> DeviceFactory {
        let log = self.clone();
        Box::new(move || Ok(Box::new(RecordingDevice { log }) as Box<dyn PlaybackDevice>))
    }
}

struct RecordingDevice {
    log: DeviceLog,
}

impl PlaybackDevice for RecordingDevice {
    fn play(&mut self, frame: &AudioFrame, cancel: &CancelToken) -> VoiceResult<PlayOutcome> {
        *self.log.started.lock() += 1;
        let id = unmark(frame.samples.first().copied().unwrap_or(0.0));
        while self.log.hold.load(Ordering::SeqCst) {
            if cancel.is_cancelled() {
                self.log.played.lock().push(Played::Interrupted(id));
                return Ok(PlayOutcome::Interrupted);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.log.played.lock().push(Played::Finished(id));
        Ok(PlayOutcome::Finished)
    }
}

pub fn session_with(engine: Arc<ScriptedEngine>, config: VocalConfig) -> (VoiceSession, DeviceLog) {
    init_tracing();
    let log = DeviceLog::default();
    let session = VoiceSession::with_parts(config, engine, log.factory())
        .expect("session should start with test doubles");
    (session, log)
}

pub fn session() -> (VoiceSession, Arc<ScriptedEngine>, DeviceLog) {
    let engine = Arc::new(ScriptedEngine::default());
    let (session, log) = session_with(Arc::clone(&engine), test_config());
    (session, engine, log)
}
