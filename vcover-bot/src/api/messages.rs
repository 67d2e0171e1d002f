//! Inbound chat message endpoint

use crate::error::{ApiError, ApiResult};
use crate::models::InboundMessage;
use crate::router::{Routed, RoutedLabel};
use crate::BotState;
use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// POST /messages response
#[derive(Debug, Serialize)]
pub struct MessageAccepted {
    /// How the message was handled
    pub routed: RoutedLabel,
    /// Invocation whose selection step claimed the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<Uuid>,
}

/// POST /messages
///
/// Accepts one inbound chat event. Commands run in the background; their
/// replies appear on `/events`.
pub async fn post_message(
    State(state): State<BotState>,
    Json(msg): Json<InboundMessage>,
) -> ApiResult<Json<MessageAccepted>> {
    if msg.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session_id must not be empty".to_string()));
    }
    if msg.sender_id.trim().is_empty() {
        return Err(ApiError::BadRequest("sender_id must not be empty".to_string()));
    }

    debug!(session_id = %msg.session_id, sender_id = %msg.sender_id, "Inbound message");

    let routed = state.router.route(msg);
    let invocation_id = match &routed {
        Routed::Selection { invocation_id, .. } | Routed::SelectionIgnored { invocation_id } => {
            Some(*invocation_id)
        }
        _ => None,
    };

    Ok(Json(MessageAccepted {
        routed: routed.label(),
        invocation_id,
    }))
}

/// Build message routes
pub fn message_routes() -> Router<BotState> {
    Router::new().route("/messages", post(post_message))
}
