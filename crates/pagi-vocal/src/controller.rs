//! **VoiceSession** - public entry point of the voice response pipeline.
//!
//! Owns the session state, the synthesizer and the playback worker. Every public
//! method takes `&self`, so one session can be shared (`Arc<VoiceSession>`) between
//! the token-producing handler and whatever issues `stop()`.
//!
//! Nothing here returns an error to the caller. If the speech engine or the output
//! device cannot be initialized the session degrades to a silent no-op.

use crate::clean::is_blank;
use crate::config::VocalConfig;
use crate::device::{DeviceFactory, RodioDevice};
use crate::engine::{HttpSpeechEngine, SpeechEngine};
use crate::error::{VoiceError, VoiceResult};
use crate::events::{EventSink, VoiceEvent};
use crate::playback::{PlaybackQueue, PlaybackWorker, WorkerState};
use crate::profile::{VoiceBook, VoiceProfile};
use crate::segmenter::TextUnit;
use crate::session::{CancelToken, SessionState};
use crate::synth::Synthesizer;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Everything a running session needs; shared with blocking synthesis tasks.
struct LiveSession {
    state: SessionState,
    voices: VoiceBook,
    synth: Synthesizer,
    queue: PlaybackQueue,
    events: EventSink,
    /// Set once the worker is gone; nothing may be queued after that.
    closed: AtomicBool,
    /// Units currently being synthesized (not yet fully queued).
    rendering: Arc<AtomicUsize>,
}

/// Counts one in-flight render for as long as it lives.
struct RenderGuard(Arc<AtomicUsize>);

impl RenderGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LiveSession {
    /// Start an utterance: resolve the voice, clear the stop flag.
    fn begin(&self, persona: &str) -> Option<(CancelToken, VoiceProfile)> {
        if self.closed.load(Ordering::SeqCst) || !self.state.is_enabled() {
            debug!("voice muted, ignoring speech request");
            return None;
        }
        let profile = self.voices.resolve(persona).clone();
        let token = self.state.begin(profile.clone());
        Some((token, profile))
    }

    /// Synthesize one unit and queue its frames. Runs on the calling thread.
    fn render(&self, text: &str, profile: &VoiceProfile, token: &CancelToken) {
        if token.is_cancelled() || !self.state.is_enabled() {
            return;
        }
        let _busy = RenderGuard::enter(&self.rendering);
        self.events.unit_flushed(text, &profile.voice_id);
        let mut queued = 0usize;
        for frame in self
            .synth
            .synthesize(text, &profile.voice_id, profile.speed, token.clone())
        {
            if token.is_cancelled() {
                break;
            }
            self.queue.push_frame(frame, token.clone());
            queued += 1;
        }
        debug!("queued {} frame(s) for {:?}", queued, text);
    }

    fn stop(&self) {
        self.state.stop.raise();
        let dropped = self.queue.clear();
        self.events.interrupted(dropped);
        if dropped > 0 {
            info!("⏹️ Voice interrupted, {} queued frame(s) dropped", dropped);
        } else {
            debug!("⏹️ Voice stop (nothing queued)");
        }
    }
}

/// The voice session controller.
pub struct VoiceSession {
    live: Option<Arc<LiveSession>>,
    worker: Mutex<Option<PlaybackWorker>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<VoiceEvent>>>,
    disabled_reason: Option<String>,
}

impl VoiceSession {
    /// Production wiring: HTTP speech engine + rodio output. Never fails; on any
    /// initialization error the session is disabled and every call becomes a no-op.
    ///
    /// Build it outside an async context (or inside `spawn_blocking`): the HTTP
    /// engine uses a blocking client.
    pub fn start(config: VocalConfig) -> Self {
        match Self::try_start(config) {
            Ok(session) => session,
            Err(e) => {
                error!("🔇 Voice subsystem disabled: {}", e);
                Self::disabled(e.to_string())
            }
        }
    }

    /// Like [`VoiceSession::start`] but reports the initialization error.
    pub fn try_start(config: VocalConfig) -> VoiceResult<Self> {
        config.validate()?;
        let engine = HttpSpeechEngine::from_config(&config)?;
        let factory = RodioDevice::factory(config.output_device.clone(), config.halt_poll());
        Self::with_parts(config, Arc::new(engine), factory)
    }

    /// Wire a session from any engine and device.
    pub fn with_parts(
        config: VocalConfig,
        engine: Arc<dyn SpeechEngine>,
        device_factory: DeviceFactory,
    ) -> VoiceResult<Self> {
        info!("🎙️ Initializing voice session");
        config.validate()?;
        if engine.sample_rate() != config.sample_rate {
            return Err(VoiceError::Config(format!(
                "engine sample rate ({}) must match configured sample rate ({})",
                engine.sample_rate(),
                config.sample_rate
            )));
        }

        let (events, events_rx) = EventSink::channel();
        let queue = PlaybackQueue::new();
        let worker = PlaybackWorker::spawn(
            queue.clone(),
            device_factory,
            events.clone(),
            config.queue_poll(),
        )?;

        let voices = VoiceBook::from_config(&config);
        let state = SessionState::new(
            config.min_flush_chars,
            voices.fallback().clone(),
            config.enabled,
        );
        let synth = Synthesizer::new(engine, config.min_play_samples, events.clone());

        info!(
            "✅ Voice session online ({} persona voices, fallback {})",
            voices.len(),
            voices.fallback().voice_id
        );

        Ok(Self {
            live: Some(Arc::new(LiveSession {
                state,
                voices,
                synth,
                queue,
                events,
                closed: AtomicBool::new(false),
                rendering: Arc::new(AtomicUsize::new(0)),
            })),
            worker: Mutex::new(Some(worker)),
            events_rx: Mutex::new(Some(events_rx)),
            disabled_reason: None,
        })
    }

    /// A session that swallows every call.
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            live: None,
            worker: Mutex::new(None),
            events_rx: Mutex::new(None),
            disabled_reason: Some(reason.into()),
        }
    }

    /// False when initialization failed and the session is a no-op.
    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    /// Speak a complete string as a single unit (system notifications).
    pub fn speak_text(&self, text: &str, persona: &str) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        if is_blank(text) {
            return;
        }
        let Some((token, profile)) = live.begin(persona) else {
            return;
        };
        live.render(text, &profile, &token);
    }

    /// Speak with the fallback voice.
    pub fn announce(&self, text: &str) {
        self.speak_text(text, "");
    }

    /// Speak a token stream. The end of the iterator is the end-of-stream signal.
    ///
    /// Each flushed unit is synthesized on this thread before the next fragment is
    /// read; playback happens on the worker.
    pub fn speak_stream<I, S>(&self, fragments: I, persona: &str)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let Some((token, profile)) = live.begin(persona) else {
            return;
        };
        let mut segmenter = live.state.segmenter();
        for fragment in fragments {
            if token.is_cancelled() {
                debug!("utterance interrupted, abandoning token stream");
                return;
            }
            if let Some(unit) = segmenter.ingest(fragment.as_ref()) {
                live.render(&unit.text, &profile, &token);
            }
        }
        if !token.is_cancelled() {
            if let Some(unit) = segmenter.finish() {
                live.render(&unit.text, &profile, &token);
            }
        }
    }

    /// Async variant of [`VoiceSession::speak_stream`]. Synthesis runs on the
    /// blocking pool, one unit at a time, so order is preserved.
    pub async fn speak_stream_async<St>(&self, fragments: St, persona: &str)
    where
        St: Stream<Item = String>,
    {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let Some((token, profile)) = live.begin(persona) else {
            return;
        };
        let mut segmenter = live.state.segmenter();
        futures::pin_mut!(fragments);
        while let Some(fragment) = fragments.next().await {
            if token.is_cancelled() {
                debug!("utterance interrupted, abandoning token stream");
                return;
            }
            if let Some(unit) = segmenter.ingest(&fragment) {
                render_blocking(live, unit, &profile, &token).await;
            }
        }
        if !token.is_cancelled() {
            if let Some(unit) = segmenter.finish() {
                render_blocking(live, unit, &profile, &token).await;
            }
        }
    }

    /// Interrupt: raise the stop flag, drop queued audio, silence the device.
    /// Safe to call from any thread, any number of times.
    pub fn stop(&self) {
        if let Some(live) = self.live.as_ref() {
            live.stop();
        }
    }

    /// Voice toggle. Muting also stops whatever is playing.
    pub fn set_enabled(&self, enabled: bool) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        if live.closed.load(Ordering::SeqCst) {
            return;
        }
        let was = live.state.enabled.swap(enabled, Ordering::SeqCst);
        if was && !enabled {
            live.stop();
            info!("🤫 Voice muted");
        } else if !was && enabled {
            info!("🗣️ Voice enabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|l| !l.closed.load(Ordering::SeqCst) && l.state.is_enabled())
    }

    /// True while a unit is being synthesized or its frames are queued or playing.
    ///
    /// A stream waiting for its next token is not speaking.
    pub fn is_speaking(&self) -> bool {
        self.live.as_ref().is_some_and(|l| {
            l.rendering.load(Ordering::SeqCst) > 0 || l.queue.unfinished() > 0
        })
    }

    /// Block until the queue has drained or `timeout` passes. Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_speaking() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// The profile `persona` would speak with.
    pub fn voice_for(&self, persona: &str) -> Option<VoiceProfile> {
        self.live.as_ref().map(|l| l.voices.resolve(persona).clone())
    }

    /// Voice of the most recent speech request.
    pub fn current_voice(&self) -> Option<VoiceProfile> {
        self.live.as_ref().map(|l| l.state.current_voice())
    }

    /// Take the event receiver. Only the first call returns `Some`.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<VoiceEvent>> {
        self.events_rx.lock().take()
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        self.worker.lock().as_ref().map(|w| w.state())
    }

    /// Stop speech and end the playback worker. Later calls are no-ops.
    pub fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            if let Some(live) = self.live.as_ref() {
                live.closed.store(true, Ordering::SeqCst);
            }
            self.stop();
            worker.shutdown();
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn render_blocking(
    live: &Arc<LiveSession>,
    unit: TextUnit,
    profile: &VoiceProfile,
    token: &CancelToken,
) {
    let busy = RenderGuard::enter(&live.rendering);
    let live = Arc::clone(live);
    let profile = profile.clone();
    let token = token.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || {
        let _busy = busy;
        live.render(&unit.text, &profile, &token)
    })
    .await
    {
        warn!("synthesis task did not complete: {}", e);
    }
}
