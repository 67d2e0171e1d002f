//! Chat transport seam
//!
//! The bot never talks to a chat platform directly. Replies go through a
//! [`ChatTransport`]; the bundled [`EventBusTransport`] publishes them on the
//! event bus, where an adapter picks them up over SSE.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::Utc;
use std::path::PathBuf;
use thiserror::Error;
use vcover_common::events::{BotEvent, EventBus, ReplyPayload};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No chat adapter is listening")]
    NoSubscribers,

    #[error("Failed to read record {path}: {source}")]
    RecordUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A reply addressed to a chat session
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Plain(String),
    /// Forwarded node, rendered as a message from `name`/`uin`
    Forward { name: String, uin: u64, text: String },
    /// Voice record read from a local audio file
    Record(PathBuf),
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        OutboundMessage::Plain(text.into())
    }
}

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, session_id: &str, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Publishes replies as [`BotEvent::Reply`]
///
/// Records are read and inlined as base64 at send time, so the audio file
/// can be deleted as soon as `send` returns.
#[derive(Clone)]
pub struct EventBusTransport {
    event_bus: EventBus,
}

impl EventBusTransport {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

#[async_trait]
impl ChatTransport for EventBusTransport {
    async fn send(&self, session_id: &str, message: OutboundMessage) -> Result<(), TransportError> {
        let payload = match message {
            OutboundMessage::Plain(text) => ReplyPayload::Plain { text },
            OutboundMessage::Forward { name, uin, text } => {
                ReplyPayload::Forward { name, uin, text }
            }
            OutboundMessage::Record(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| TransportError::RecordUnreadable {
                        path: path.clone(),
                        source,
                    })?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "cover.wav".to_string());
                ReplyPayload::Record {
                    file_name,
                    audio_base64: BASE64_STANDARD.encode(bytes),
                }
            }
        };

        self.event_bus
            .emit(BotEvent::Reply {
                session_id: session_id.to_string(),
                payload,
                timestamp: Utc::now(),
            })
            .map(|_| ())
            .map_err(|_| TransportError::NoSubscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_reply_published() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let transport = EventBusTransport::new(bus);

        transport
            .send("group:42", OutboundMessage::plain("你好"))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            BotEvent::Reply { session_id, payload, .. } => {
                assert_eq!(session_id, "group:42");
                assert_eq!(payload, ReplyPayload::Plain { text: "你好".to_string() });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_inlined_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let transport = EventBusTransport::new(bus);
        transport
            .send("s", OutboundMessage::Record(path))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            BotEvent::Reply {
                payload: ReplyPayload::Record { file_name, audio_base64 },
                ..
            } => {
                assert_eq!(file_name, "cover.wav");
                assert_eq!(audio_base64, "UklGRg==");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_is_an_error() {
        let transport = EventBusTransport::new(EventBus::new(10));
        let result = transport.send("s", OutboundMessage::plain("x")).await;
        assert!(matches!(result, Err(TransportError::NoSubscribers)));
    }

    #[tokio::test]
    async fn test_missing_record_file() {
        let bus = EventBus::new(10);
        let _rx = bus.subscribe();
        let transport = EventBusTransport::new(bus);
        let result = transport
            .send("s", OutboundMessage::Record(PathBuf::from("/nonexistent/x.wav")))
            .await;
        assert!(matches!(result, Err(TransportError::RecordUnreadable { .. })));
    }
}
