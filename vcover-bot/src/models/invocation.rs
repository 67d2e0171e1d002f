//! Cover invocation state machine
//!
//! One invocation spans the initial command and every follow-up reply of
//! the same sender until it is delivered, cancelled or fails:
//!
//! ```text
//! ParseArgs → SearchSongs ─(empty)→ Failed
//!           → AwaitSongChoice ─(timeout)→ Cancelled
//!           → AwaitModelChoice ─(timeout)→ Cancelled
//!           → Dispatch ─(error)→ Failed
//!           → Deliver → Completed
//! ```
//! No state survives an invocation; two invocations of the same sender
//! are independent.

use crate::error::CoverError;
use crate::models::SongCandidate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vcover_common::events::InvocationState;
use vcover_common::BackendKind;

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub invocation_id: Uuid,
    pub old_state: InvocationState,
    pub new_state: InvocationState,
    pub transitioned_at: DateTime<Utc>,
}

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// Audio produced and handed to the transport
    Delivered,
    /// Arguments unusable; usage was shown
    Rejected,
    /// Search returned nothing
    NoResults,
    /// A selection step timed out
    Cancelled,
    /// Catalog empty at the model step
    NoModels,
    /// Search, inference or delivery failed
    Failed,
}

impl InvocationOutcome {
    pub fn from_error(err: &CoverError) -> Self {
        match err {
            CoverError::InvalidArguments(_) => InvocationOutcome::Rejected,
            CoverError::NoResultsFound => InvocationOutcome::NoResults,
            CoverError::SelectionTimeout => InvocationOutcome::Cancelled,
            CoverError::NoModelsAvailable(_) => InvocationOutcome::NoModels,
            _ => InvocationOutcome::Failed,
        }
    }

    fn terminal_state(&self) -> InvocationState {
        match self {
            InvocationOutcome::Delivered => InvocationState::Completed,
            InvocationOutcome::Cancelled => InvocationState::Cancelled,
            _ => InvocationState::Failed,
        }
    }
}

/// In-memory record of one invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub invocation_id: Uuid,
    pub backend: BackendKind,
    /// Chat session (group or private chat) the command came from
    pub session_id: String,
    /// Sender whose replies drive the selection steps
    pub sender_id: String,
    pub state: InvocationState,
    pub song_name: Option<String>,
    pub key_shift: i32,
    pub selected_song: Option<SongCandidate>,
    pub selected_model: Option<String>,
    pub outcome: Option<InvocationOutcome>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Invocation {
    pub fn new(backend: BackendKind, session_id: String, sender_id: String) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            backend,
            session_id,
            sender_id,
            state: InvocationState::ParseArgs,
            song_name: None,
            key_shift: 0,
            selected_song: None,
            selected_model: None,
            outcome: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: InvocationState) -> StateTransition {
        let transition = StateTransition {
            invocation_id: self.invocation_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Record the outcome and move to the matching terminal state
    pub fn finish(&mut self, outcome: InvocationOutcome) -> StateTransition {
        self.outcome = Some(outcome);
        self.transition_to(outcome.terminal_state())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
