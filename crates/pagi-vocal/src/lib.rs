//! # PAGI Vocal - Streaming Voice Responses
//!
//! Turns a token stream from a language model into speech while the text is still
//! being generated. Tokens are grouped into speakable phrases, each phrase is
//! synthesized with the voice of the persona that produced it, and the audio is
//! played by a single background worker. A stop request silences output
//! immediately and drops everything queued.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        VoiceSession                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │  Token Tap   │→ │  Segmenter   │→ │ Synthesizer  │       │
//! │  │ (broadcast)  │  │ (phrases)    │  │ (HTTP / PCM) │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │                                             ↓                │
//! │  ┌──────────────┐                   ┌──────────────┐        │
//! │  │  Audio Out   │←──────────────────│ Playback Q   │        │
//! │  │   (rodio)    │   single worker   │   (FIFO)     │        │
//! │  └──────────────┘                   └──────────────┘        │
//! │         ↑                                                    │
//! │      stop() ── stop flag + generation ── cancel tokens       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod clean;
pub mod config;
pub mod controller;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;
pub mod profile;
pub mod segmenter;
pub mod session;
pub mod synth;
pub mod tap;

pub use audio::{AudioFrame, FrameAccumulator};
pub use clean::clean_for_speech;
pub use config::{VocalConfig, VoiceEntry};
pub use controller::VoiceSession;
pub use device::{list_output_devices, DeviceFactory, PlayOutcome, PlaybackDevice, RodioDevice};
pub use engine::{ChunkStream, HttpSpeechEngine, PcmChunks, PlaceholderEngine, SpeechEngine};
pub use error::{VoiceError, VoiceResult};
pub use events::{EventSink, VoiceEvent};
pub use playback::{PlaybackEntry, PlaybackQueue, PlaybackWorker, WorkerState};
pub use profile::{VoiceBook, VoiceProfile};
pub use segmenter::{TextSegmenter, TextUnit};
pub use session::{CancelToken, SessionState, StopFlag};
pub use synth::{FrameStream, Synthesizer};
pub use tap::{TokenEvent, TokenTap};
