//! Data models for cover invocations

pub mod invocation;
pub mod message;
pub mod song;

pub use invocation::{Invocation, InvocationOutcome, StateTransition};
pub use message::InboundMessage;
pub use song::{format_song_listing, SongCandidate, MAX_SONG_CANDIDATES};
