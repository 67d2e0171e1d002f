//! HTTP API handlers for vcover-bot
//!
//! A chat adapter posts inbound chat events to `/messages` and reads the
//! bot's replies from the `/events` SSE stream.

pub mod health;
pub mod messages;
pub mod sse;

pub use health::health_routes;
pub use messages::message_routes;
pub use sse::event_stream;
