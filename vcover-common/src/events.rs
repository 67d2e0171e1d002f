//! Event types for the vcover event system
//!
//! Every chat reply and every invocation state transition is published on
//! the [`EventBus`]. Chat adapters subscribe to it (over SSE) to forward
//! replies back to the chat platform.

use crate::config::BackendKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// States of one cover invocation
///
/// ```text
/// ParseArgs → SearchSongs → AwaitSongChoice → AwaitModelChoice → Dispatch → Deliver → Completed
/// ```
/// Any state may end in `Cancelled` (selection timeout) or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    ParseArgs,
    SearchSongs,
    AwaitSongChoice,
    AwaitModelChoice,
    Dispatch,
    Deliver,
    Completed,
    Cancelled,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationState::Completed | InvocationState::Cancelled | InvocationState::Failed
        )
    }
}

/// Reply content as published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPayload {
    /// Plain text message
    Plain { text: String },
    /// Forwarded node (shown as a message from `name`/`uin`)
    Forward { name: String, uin: u64, text: String },
    /// Voice record, inlined so it outlives the temp file
    Record {
        file_name: String,
        audio_base64: String,
    },
}

/// vcover event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BotEvent {
    /// Reply addressed to a chat session
    Reply {
        session_id: String,
        payload: ReplyPayload,
        timestamp: DateTime<Utc>,
    },

    /// Invocation moved between states
    InvocationStateChanged {
        invocation_id: Uuid,
        backend: BackendKind,
        sender_id: String,
        old_state: InvocationState,
        new_state: InvocationState,
        timestamp: DateTime<Utc>,
    },

    /// Model catalog replaced after a refresh
    CatalogRefreshed {
        backend: BackendKind,
        model_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Backend base URL changed by an admin command
    BackendUrlChanged {
        backend: BackendKind,
        base_url: String,
        timestamp: DateTime<Utc>,
    },
}

impl BotEvent {
    /// Event type name, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::Reply { .. } => "Reply",
            BotEvent::InvocationStateChanged { .. } => "InvocationStateChanged",
            BotEvent::CatalogRefreshed { .. } => "CatalogRefreshed",
            BotEvent::BackendUrlChanged { .. } => "BackendUrlChanged",
        }
    }
}

/// Broadcast bus for [`BotEvent`]s
///
/// Cloning the bus is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: BotEvent) -> Result<usize, broadcast::error::SendError<BotEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: BotEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("No subscribers for {} event", e.0.event_type());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
