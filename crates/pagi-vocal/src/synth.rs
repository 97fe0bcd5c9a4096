//! **Synthesizer** - wraps a [`SpeechEngine`] and yields playable [`AudioFrame`]s.
//!
//! Text is cleaned of markup first. Engine sub-chunks are accumulated until a frame
//! holds at least `min_play_samples`, the cancel token is checked between every
//! sub-chunk, and an engine error ends the utterance quietly.

use crate::audio::{AudioFrame, FrameAccumulator};
use crate::clean::clean_for_speech;
use crate::engine::{ChunkStream, SpeechEngine};
use crate::events::EventSink;
use crate::session::CancelToken;
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapter between a speech engine and the playback queue.
#[derive(Clone)]
pub struct Synthesizer {
    engine: Arc<dyn SpeechEngine>,
    min_play_samples: usize,
    events: EventSink,
}

impl Synthesizer {
    pub fn new(engine: Arc<dyn SpeechEngine>, min_play_samples: usize, events: EventSink) -> Self {
        Self {
            engine,
            min_play_samples: min_play_samples.max(1),
            events,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    /// Lazily synthesize `text`. Blank text (after cleaning) never reaches the engine.
    pub fn synthesize(&self, text: &str, voice_id: &str, speed: f32, cancel: CancelToken) -> FrameStream {
        let cleaned = clean_for_speech(text);
        let spoken = cleaned.trim();
        let accumulator = FrameAccumulator::new(self.min_play_samples, self.engine.sample_rate());

        if spoken.is_empty() || cancel.is_cancelled() {
            return FrameStream::finished(accumulator, cancel, self.events.clone());
        }

        debug!("🗣️ synthesizing '{}' with {} @ {:.2}", spoken, voice_id, speed);
        let chunks = match self.engine.stream(spoken, voice_id, speed) {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                warn!("speech engine refused utterance: {}", e);
                self.events.synthesis_failed(e.to_string());
                None
            }
        };

        FrameStream {
            chunks,
            accumulator,
            cancel,
            events: self.events.clone(),
        }
    }
}

/// Lazy sequence of frames for one text unit. Finite and non-restartable.
pub struct FrameStream {
    chunks: Option<ChunkStream>,
    accumulator: FrameAccumulator,
    cancel: CancelToken,
    events: EventSink,
}

impl FrameStream {
    fn finished(accumulator: FrameAccumulator, cancel: CancelToken, events: EventSink) -> Self {
        Self {
            chunks: None,
            accumulator,
            cancel,
            events,
        }
    }

    /// Drop the engine stream so the backend can stop producing.
    fn close(&mut self) {
        self.chunks = None;
    }
}

impl Iterator for FrameStream {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        loop {
            let chunks = self.chunks.as_mut()?;

            if self.cancel.is_cancelled() {
                let dropped = self.accumulator.discard();
                debug!("synthesis cancelled ({} buffered samples dropped)", dropped);
                self.close();
                return None;
            }

            match chunks.next() {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if let Some(frame) = self.accumulator.push(&chunk) {
                        return Some(frame);
                    }
                }
                Some(Err(e)) => {
                    warn!("synthesis failed mid-utterance: {}", e);
                    self.events.synthesis_failed(e.to_string());
                    self.accumulator.discard();
                    self.close();
                    return None;
                }
                None => {
                    self.close();
                    return self.accumulator.flush();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{VoiceError, VoiceResult};
    use crate::events::VoiceEvent;
    use crate::session::StopFlag;
    use parking_lot::Mutex;

    /// Emits `chunks` sub-chunks of `size` samples, optionally failing at index `fail_at`.
    struct ChunkedEngine {
        chunks: usize,
        size: usize,
        fail_at: Option<usize>,
        requests: Mutex<Vec<String>>,
    }

    impl ChunkedEngine {
        fn new(chunks: usize, size: usize) -> Self {
            Self { chunks, size, fail_at: None, requests: Mutex::new(Vec::new()) }
        }
    }

    impl SpeechEngine for ChunkedEngine {
        fn sample_rate(&self) -> u32 {
            24_000
        }

        fn stream(&self, text: &str, _voice: &str, _speed: f32) -> VoiceResult<ChunkStream> {
            self.requests.lock().push(text.to_string());
            let size = self.size;
            let fail_at = self.fail_at;
            Ok(Box::new((0..self.chunks).map(move |i| {
                if Some(i) == fail_at {
                    Err(VoiceError::Synthesis("engine exploded".into()))
                } else {
                    Ok(vec![i as f32; size])
                }
            })))
        }
    }

    fn synth(engine: Arc<ChunkedEngine>, min: usize) -> (Synthesizer, tokio::sync::mpsc::UnboundedReceiver<VoiceEvent>) {
        let (events, rx) = EventSink::channel();
        (Synthesizer::new(engine, min, events), rx)
    }

    #[test]
    fn frames_reach_minimum_and_residual_is_kept() {
        let engine = Arc::new(ChunkedEngine::new(5, 5_000));
        let (synth, _rx) = synth(engine, 12_000);
        let frames: Vec<_> = synth
            .synthesize("Hello there.", "pm_alex", 1.0, CancelToken::detached())
            .collect();
        let sizes: Vec<_> = frames.iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![15_000, 10_000]);
        assert_eq!(frames[0].sample_rate, 24_000);
    }

    #[test]
    fn sends_cleaned_text_to_engine() {
        let engine = Arc::new(ChunkedEngine::new(1, 10));
        let (synth, _rx) = synth(Arc::clone(&engine), 12_000);
        let frames: Vec<_> = synth
            .synthesize("Status: **OK**", "pm_alex", 1.0, CancelToken::detached())
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(*engine.requests.lock(), vec!["Status: OK".to_string()]);
    }

    #[test]
    fn blank_text_skips_engine() {
        let engine = Arc::new(ChunkedEngine::new(1, 10));
        let (synth, _rx) = synth(Arc::clone(&engine), 12_000);
        assert_eq!(synth.synthesize("  ** ", "v", 1.0, CancelToken::detached()).count(), 0);
        assert!(engine.requests.lock().is_empty());
    }

    #[test]
    fn cancellation_stops_between_chunks() {
        let engine = Arc::new(ChunkedEngine::new(10, 6_000));
        let (synth, _rx) = synth(engine, 12_000);
        let flag = StopFlag::new();
        let mut stream = synth.synthesize("A long enough sentence.", "v", 1.0, flag.begin_utterance());
        assert_eq!(stream.next().map(|f| f.len()), Some(12_000));
        flag.raise();
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn already_cancelled_token_skips_engine() {
        let engine = Arc::new(ChunkedEngine::new(1, 10));
        let (synth, _rx) = synth(Arc::clone(&engine), 12_000);
        let flag = StopFlag::new();
        let token = flag.begin_utterance();
        flag.raise();
        assert_eq!(synth.synthesize("Hello", "v", 1.0, token).count(), 0);
        assert!(engine.requests.lock().is_empty());
    }

    #[test]
    fn engine_error_ends_without_partial_frame() {
        let mut engine = ChunkedEngine::new(6, 5_000);
        engine.fail_at = Some(3);
        let (synth, mut rx) = synth(Arc::new(engine), 12_000);
        let sizes: Vec<_> = synth
            .synthesize("Hello there.", "v", 1.0, CancelToken::detached())
            .map(|f| f.len())
            .collect();
        // chunks 0..=2 make one 15k frame; chunk 3 fails before any residual builds up.
        assert_eq!(sizes, vec![15_000]);
        assert!(matches!(rx.try_recv(), Ok(VoiceEvent::SynthesisFailed { .. })));
    }

    #[test]
    fn engine_refusal_is_absorbed() {
        struct Refuses;
        impl SpeechEngine for Refuses {
            fn sample_rate(&self) -> u32 {
                24_000
            }
            fn stream(&self, _: &str, _: &str, _: f32) -> VoiceResult<ChunkStream> {
                Err(VoiceError::Synthesis("offline".into()))
            }
        }
        let (events, mut rx) = EventSink::channel();
        let synth = Synthesizer::new(Arc::new(Refuses), 100, events);
        assert_eq!(synth.synthesize("Hello", "v", 1.0, CancelToken::detached()).count(), 0);
        assert!(matches!(rx.try_recv(), Ok(VoiceEvent::SynthesisFailed { .. })));
    }
}
