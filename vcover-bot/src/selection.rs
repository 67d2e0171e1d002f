//! Interactive selection steps
//!
//! An invocation that needs the user to pick from a numbered list opens a
//! [`WaitStep`]: owner, option count and deadline, held as a value in the
//! [`SelectionRegistry`] under `(invocation_id, sender_id)`. The inbound
//! dispatcher offers every message to the registry before treating it as a
//! command; the registry resolves the owner's pending step when the message
//! is a valid choice.
//!
//! Rules for a pending step:
//! - only messages from the owning sender in the same chat session count
//! - a valid choice is an integer in `1..=option_count`; anything else is
//!   swallowed and the step keeps waiting
//! - the deadline is fixed at open time; no message extends it
//! - an expired step never resolves

use crate::error::CoverError;
use crate::models::{InboundMessage, Invocation};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Which choice a step collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Song,
    Model,
}

/// One timed, sender-scoped wait for a numbered choice
#[derive(Debug, Clone)]
pub struct WaitStep {
    pub invocation_id: Uuid,
    pub kind: StepKind,
    pub session_id: String,
    pub owner_sender_id: String,
    pub option_count: usize,
    pub deadline: Instant,
}

impl WaitStep {
    pub fn new(
        invocation: &Invocation,
        kind: StepKind,
        option_count: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            invocation_id: invocation.invocation_id,
            kind,
            session_id: invocation.session_id.clone(),
            owner_sender_id: invocation.sender_id.clone(),
            option_count,
            deadline: Instant::now() + timeout,
        }
    }

    /// Whether `msg` comes from this step's owner in this step's session
    pub fn is_owned_by(&self, msg: &InboundMessage) -> bool {
        msg.sender_id == self.owner_sender_id && msg.session_id == self.session_id
    }

    /// 0-based index if `text` is a valid choice
    pub fn accepts(&self, text: &str) -> Option<usize> {
        parse_choice(text, self.option_count)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Parse a 1-based choice into a 0-based index
///
/// Surrounding whitespace is ignored; full-width digits are accepted.
/// Signs, decimals and out-of-range numbers are not choices.
pub fn parse_choice(input: &str, option_count: usize) -> Option<usize> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let digits: String = trimmed
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            other => other,
        })
        .collect();

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let choice: usize = digits.parse().ok()?;
    if (1..=option_count).contains(&choice) {
        Some(choice - 1)
    } else {
        None
    }
}

/// What happened to an offered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// The sender's pending step accepted the choice
    Resolved {
        invocation_id: Uuid,
        kind: StepKind,
        index: usize,
    },
    /// The sender has a pending step but the text is not a valid choice
    Rejected { invocation_id: Uuid },
    /// No pending step for this sender in this session
    NotWaiting,
}

struct PendingWait {
    step: WaitStep,
    seq: u64,
    responder: oneshot::Sender<usize>,
}

type WaitKey = (Uuid, String);

/// Registry of open wait steps across all invocations
#[derive(Default)]
pub struct SelectionRegistry {
    pending: Mutex<HashMap<WaitKey, PendingWait>>,
    next_seq: AtomicU64,
}

/// An open wait step, registered and ready to receive choices
///
/// Dropping it unregisters the step, so an invocation task that is
/// aborted never leaves a wait behind.
pub struct PendingSelection<'a> {
    registry: &'a SelectionRegistry,
    key: WaitKey,
    kind: StepKind,
    deadline: Instant,
    rx: oneshot::Receiver<usize>,
}

impl PendingSelection<'_> {
    /// Suspend until the step resolves or its deadline passes
    ///
    /// Returns the 0-based choice, or `SelectionTimeout`.
    pub async fn wait(mut self) -> Result<usize, CoverError> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(index)) => Ok(index),
            _ => {
                info!(
                    invocation_id = %self.key.0,
                    sender_id = %self.key.1,
                    step = ?self.kind,
                    "Selection timed out"
                );
                Err(CoverError::SelectionTimeout)
            }
        }
    }
}

impl Drop for PendingSelection<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}

impl SelectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WaitKey, PendingWait>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `step` so that choices are accepted from now on
    ///
    /// Open the step before prompting, so a fast reply is never missed.
    pub fn open(&self, step: WaitStep) -> PendingSelection<'_> {
        let key = (step.invocation_id, step.owner_sender_id.clone());
        let deadline = step.deadline;
        let kind = step.kind;
        let (tx, rx) = oneshot::channel();

        debug!(
            invocation_id = %step.invocation_id,
            sender_id = %step.owner_sender_id,
            step = ?kind,
            options = step.option_count,
            "Opening selection wait"
        );

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            key.clone(),
            PendingWait {
                step,
                seq,
                responder: tx,
            },
        );

        PendingSelection {
            registry: self,
            key,
            kind,
            deadline,
            rx,
        }
    }

    /// Open `step` and suspend until it resolves or its deadline passes
    pub async fn wait(&self, step: WaitStep) -> Result<usize, CoverError> {
        self.open(step).wait().await
    }

    /// Offer an inbound message to the sender's oldest pending step
    pub fn offer(&self, msg: &InboundMessage) -> Offer {
        let now = Instant::now();
        let mut pending = self.lock();
        pending.retain(|_, wait| !wait.step.is_expired(now));

        let key = pending
            .iter()
            .filter(|(_, wait)| wait.step.is_owned_by(msg))
            .min_by_key(|(_, wait)| wait.seq)
            .map(|(key, _)| key.clone());

        let Some(key) = key else {
            return Offer::NotWaiting;
        };

        let choice = pending.get(&key).and_then(|wait| wait.step.accepts(&msg.text));
        match choice {
            Some(index) => match pending.remove(&key) {
                Some(wait) => {
                    let kind = wait.step.kind;
                    let invocation_id = wait.step.invocation_id;
                    if wait.responder.send(index).is_err() {
                        debug!(invocation_id = %invocation_id, "Waiter vanished before resolution");
                    }
                    Offer::Resolved {
                        invocation_id,
                        kind,
                        index,
                    }
                }
                None => Offer::NotWaiting,
            },
            None => Offer::Rejected { invocation_id: key.0 },
        }
    }

    /// Number of open, unexpired steps
    pub fn pending_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|wait| !wait.step.is_expired(now))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcover_common::BackendKind;

    fn invocation(session: &str, sender: &str) -> Invocation {
        Invocation::new(BackendKind::Rvc, session.to_string(), sender.to_string())
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1", 3), Some(0));
        assert_eq!(parse_choice(" 3 \n", 3), Some(2));
        assert_eq!(parse_choice("２", 3), Some(1));
        assert_eq!(parse_choice("0", 3), None);
        assert_eq!(parse_choice("4", 3), None);
        assert_eq!(parse_choice("-1", 3), None);
        assert_eq!(parse_choice("+1", 3), None);
        assert_eq!(parse_choice("1.0", 3), None);
        assert_eq!(parse_choice("一", 3), None);
        assert_eq!(parse_choice("", 3), None);
        assert_eq!(parse_choice("99999999999999999999999", 3), None);
        assert_eq!(parse_choice("1", 0), None);
    }

    #[tokio::test]
    async fn test_valid_choice_resolves_wait() {
        let registry = Arc::new(SelectionRegistry::new());
        let inv = invocation("g1", "alice");
        let step = WaitStep::new(&inv, StepKind::Song, 5, Duration::from_secs(5));

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait(step).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.pending_count(), 1);

        let offer = registry.offer(&InboundMessage::new("g1", "alice", "4"));
        assert_eq!(
            offer,
            Offer::Resolved {
                invocation_id: inv.invocation_id,
                kind: StepKind::Song,
                index: 3
            }
        );
        assert_eq!(waiter.await.unwrap().unwrap(), 3);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_choice_before_wait_is_kept() {
        let registry = SelectionRegistry::new();
        let inv = invocation("g1", "alice");
        let step = WaitStep::new(&inv, StepKind::Model, 3, Duration::from_secs(5));
        let pending = registry.open(step);

        // reply lands between open and wait
        assert!(matches!(
            registry.offer(&InboundMessage::new("g1", "alice", "2")),
            Offer::Resolved { index: 1, .. }
        ));
        assert_eq!(pending.wait().await.unwrap(), 1);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_dropped_step_unregisters() {
        let registry = SelectionRegistry::new();
        let inv = invocation("g1", "alice");
        let pending = registry.open(WaitStep::new(&inv, StepKind::Song, 3, Duration::from_secs(5)));
        assert_eq!(registry.pending_count(), 1);
        drop(pending);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_other_sender_never_resolves() {
        let registry = Arc::new(SelectionRegistry::new());
        let inv = invocation("g1", "alice");
        let step = WaitStep::new(&inv, StepKind::Model, 2, Duration::from_millis(150));

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait(step).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(registry.offer(&InboundMessage::new("g1", "bob", "1")), Offer::NotWaiting);
        // same sender in another chat does not count either
        assert_eq!(registry.offer(&InboundMessage::new("g2", "alice", "1")), Offer::NotWaiting);

        assert!(matches!(
            waiter.await.unwrap(),
            Err(CoverError::SelectionTimeout)
        ));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_keeps_waiting() {
        let registry = Arc::new(SelectionRegistry::new());
        let inv = invocation("g1", "alice");
        let step = WaitStep::new(&inv, StepKind::Song, 2, Duration::from_secs(5));

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait(step).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        for text in ["hello", "3", "0", "-1"] {
            assert_eq!(
                registry.offer(&InboundMessage::new("g1", "alice", text)),
                Offer::Rejected {
                    invocation_id: inv.invocation_id
                }
            );
        }
        assert_eq!(registry.pending_count(), 1);

        registry.offer(&InboundMessage::new("g1", "alice", "2"));
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_step_never_resolves() {
        let registry = Arc::new(SelectionRegistry::new());
        let inv = invocation("g1", "alice");
        let step = WaitStep::new(&inv, StepKind::Song, 3, Duration::from_millis(30));

        let result = registry.wait(step).await;
        assert!(matches!(result, Err(CoverError::SelectionTimeout)));
        assert_eq!(
            registry.offer(&InboundMessage::new("g1", "alice", "1")),
            Offer::NotWaiting
        );
    }

    #[tokio::test]
    async fn test_oldest_wait_of_sender_served_first() {
        let registry = Arc::new(SelectionRegistry::new());
        let first = invocation("g1", "alice");
        let second = invocation("g1", "alice");

        let first_waiter = {
            let registry = Arc::clone(&registry);
            let step = WaitStep::new(&first, StepKind::Song, 3, Duration::from_secs(5));
            tokio::spawn(async move { registry.wait(step).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second_waiter = {
            let registry = Arc::clone(&registry);
            let step = WaitStep::new(&second, StepKind::Song, 3, Duration::from_secs(5));
            tokio::spawn(async move { registry.wait(step).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.offer(&InboundMessage::new("g1", "alice", "1"));
        registry.offer(&InboundMessage::new("g1", "alice", "3"));

        assert_eq!(first_waiter.await.unwrap().unwrap(), 0);
        assert_eq!(second_waiter.await.unwrap().unwrap(), 2);
    }
}
