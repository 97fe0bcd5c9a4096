//! Pipeline events for UI / log consumers.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

/// Events emitted while an utterance moves through the pipeline
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// A text unit left the segmenter and is about to be synthesized
    UnitFlushed {
        text: String,
        voice_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The worker finished playing a frame
    FramePlayed {
        samples: usize,
        timestamp: DateTime<Utc>,
    },

    /// The worker drained a frame without playing it (stop flag set)
    FrameSkipped {
        samples: usize,
        timestamp: DateTime<Utc>,
    },

    /// `stop()` was called
    Interrupted {
        dropped_entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// The engine failed mid-utterance; the rest of that unit is silent
    SynthesisFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The device failed on one frame; the worker keeps running
    PlaybackFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Sending half of the event channel. Sends never fail the pipeline.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<VoiceEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<VoiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sink whose receiver is already gone.
    pub fn discard() -> Self {
        Self::channel().0
    }

    pub fn emit(&self, event: VoiceEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("voice event dropped (no receiver): {:?}", e.0);
        }
    }

    pub fn unit_flushed(&self, text: &str, voice_id: &str) {
        self.emit(VoiceEvent::UnitFlushed {
            text: text.to_string(),
            voice_id: voice_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn frame_played(&self, samples: usize) {
        self.emit(VoiceEvent::FramePlayed {
            samples,
            timestamp: Utc::now(),
        });
    }

    pub fn frame_skipped(&self, samples: usize) {
        self.emit(VoiceEvent::FrameSkipped {
            samples,
            timestamp: Utc::now(),
        });
    }

    pub fn interrupted(&self, dropped_entries: usize) {
        self.emit(VoiceEvent::Interrupted {
            dropped_entries,
            timestamp: Utc::now(),
        });
    }

    pub fn synthesis_failed(&self, message: impl Into<String>) {
        self.emit(VoiceEvent::SynthesisFailed {
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn playback_failed(&self, message: impl Into<String>) {
        self.emit(VoiceEvent::PlaybackFailed {
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}
