//! Example: streaming voice responses
//!
//! Simulates an LLM token stream through a `TokenTap` and speaks it as it arrives.
//! Needs an OpenAI-compatible TTS server (TTS_API_URL, default http://localhost:8880/v1)
//! and an audio output device. Without either, the session degrades and the demo
//! just prints the tokens.

use pagi_vocal::{list_output_devices, TokenTap, VocalConfig, VoiceSession};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const RESPONSE: &[&str] = &[
    "**Good", " morning", ".**", " All", " systems", " are", " nominal", ".",
    " The", " overnight", " build", " finished", " without", " errors", "!\n",
    "Would", " you", " like", " the", " `full_report`", "?",
];

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🎙️ PAGI Vocal Demo");
    info!("==================");
    if let Ok(devices) = list_output_devices() {
        info!("🔊 Output devices: {:?}", devices);
    }

    let config = match VocalConfig::load() {
        Ok(config) => config,
        Err(e) => {
            info!("Using default vocal config ({})", e);
            VocalConfig::default()
        }
    };

    // The HTTP engine uses a blocking client, so build the session before the runtime.
    let session = Arc::new(VoiceSession::start(config));
    if let Some(reason) = session.disabled_reason() {
        info!("🔇 Voice unavailable: {}", reason);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let tap = TokenTap::default();
        let voice = tap.voice_stream();
        let mut transport = tap.subscribe();

        let printer = tokio::spawn(async move {
            let mut line = String::new();
            while let Ok(pagi_vocal::TokenEvent::Token(token)) = transport.recv().await {
                line.push_str(&token);
            }
            info!("📝 Transport saw: {}", line);
        });

        let producer = {
            let tap = tap.clone();
            tokio::spawn(async move {
                for token in RESPONSE {
                    tap.publish(*token);
                    tokio::time::sleep(Duration::from_millis(40)).await;
                }
                tap.finish();
            })
        };

        session.speak_stream_async(voice, "The Architect").await;
        let _ = producer.await;
        let _ = printer.await;
    });

    info!("⏳ Waiting for playback to drain...");
    session.wait_idle(Duration::from_secs(30));

    session.announce("Demo complete.");
    session.wait_idle(Duration::from_secs(10));
    session.shutdown();

    info!("👋 Goodbye!");
    Ok(())
}
