//! **Token tap** - fan one LLM token stream out to independent consumers.
//!
//! The transport layer (websocket emission) and the voice pipeline each subscribe
//! to the same broadcast; neither sees the other's buffers. Subscribe before the
//! first token is published, or the early tokens are missed.

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// One event of a generated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Token(String),
    /// Explicit end of the response stream.
    End,
}

/// Publisher side of a token stream.
#[derive(Debug, Clone)]
pub struct TokenTap {
    tx: broadcast::Sender<TokenEvent>,
}

impl TokenTap {
    /// `capacity`: tokens a slow subscriber may fall behind before it starts losing them.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one token. Returns the number of subscribers that will see it.
    pub fn publish(&self, token: impl Into<String>) -> usize {
        self.send(TokenEvent::Token(token.into()))
    }

    /// Mark the end of the current response.
    pub fn finish(&self) -> usize {
        self.send(TokenEvent::End)
    }

    /// Raw subscription (transport layers usually want every event).
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.tx.subscribe()
    }

    /// Subscription shaped for `VoiceSession::speak_stream_async`: tokens only,
    /// ending at the first `End`.
    pub fn voice_stream(&self) -> impl Stream<Item = String> + Send + Unpin + 'static {
        BroadcastStream::new(self.tx.subscribe())
            .take_while(|event| !matches!(event, Ok(TokenEvent::End)))
            .filter_map(|event| match event {
                Ok(TokenEvent::Token(token)) => Some(token),
                Ok(TokenEvent::End) => None,
                Err(lagged) => {
                    warn!("voice subscriber fell behind: {}", lagged);
                    None
                }
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, event: TokenEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("token published with no subscribers");
                0
            }
        }
    }
}

impl Default for TokenTap {
    fn default() -> Self {
        Self::new(1024)
    }
}
