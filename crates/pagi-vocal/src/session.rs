//! Session state shared between the controller, the synthesizer and the playback worker.
//!
//! The stop flag is an atomic boolean paired with a generation counter. Every
//! utterance captures a [`CancelToken`] when it starts; `stop()` sets the flag and
//! bumps the generation, so a token from an interrupted utterance stays cancelled
//! even after the next request clears the flag.

use crate::profile::VoiceProfile;
use crate::segmenter::TextSegmenter;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StopShared {
    stopped: AtomicBool,
    generation: AtomicU64,
}

/// Cross-thread stop signal. Cheap to clone; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    shared: Arc<StopShared>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and invalidate every token issued so far.
    pub fn raise(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Clear the flag for a new utterance and hand out its token.
    pub fn begin_utterance(&self) -> CancelToken {
        self.shared.stopped.store(false, Ordering::SeqCst);
        CancelToken {
            shared: Arc::clone(&self.shared),
            generation: self.shared.generation.load(Ordering::SeqCst),
        }
    }

    pub fn is_raised(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }
}

/// Per-utterance view of the stop flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<StopShared>,
    generation: u64,
}

impl CancelToken {
    /// A token that is never cancelled by any session (tests, one-off synthesis).
    pub fn detached() -> Self {
        Self {
            shared: Arc::new(StopShared::default()),
            generation: 0,
        }
    }

    /// True once the flag is raised or a later `stop()` made this generation stale.
    pub fn is_cancelled(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
            || self.shared.generation.load(Ordering::SeqCst) != self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Process-lifetime mutable state of one voice session.
///
/// Written only through the controller's public operations; the synthesizer and
/// worker only ever poll the stop flag through their [`CancelToken`].
///
/// Text buffers are not session state: every streamed utterance owns its own
/// [`TextSegmenter`], so concurrent requests never see each other's text.
pub struct SessionState {
    pub(crate) stop: StopFlag,
    pub(crate) voice: RwLock<VoiceProfile>,
    pub(crate) enabled: AtomicBool,
    min_flush_chars: usize,
}

impl SessionState {
    pub fn new(min_flush_chars: usize, voice: VoiceProfile, enabled: bool) -> Self {
        Self {
            stop: StopFlag::new(),
            voice: RwLock::new(voice),
            enabled: AtomicBool::new(enabled),
            min_flush_chars,
        }
    }

    /// Start a speech request: switch voice, clear the stop flag.
    pub(crate) fn begin(&self, voice: VoiceProfile) -> CancelToken {
        *self.voice.write() = voice;
        self.stop.begin_utterance()
    }

    /// Fresh buffer for one streamed utterance.
    pub fn segmenter(&self) -> TextSegmenter {
        TextSegmenter::new(self.min_flush_chars)
    }

    pub fn current_voice(&self) -> VoiceProfile {
        self.voice.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
