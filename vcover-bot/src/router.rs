//! Inbound message dispatcher
//!
//! Every inbound message is first offered to the pending selection steps.
//! Only when no step of the sender claims it is it parsed as a command.
//! Commands run on their own task so a long invocation never holds up
//! other senders.

use crate::commands::{parse_command, Command};
use crate::models::InboundMessage;
use crate::pipeline::CoverPipeline;
use crate::selection::{Offer, StepKind};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// How an inbound message was handled
#[derive(Debug)]
pub enum Routed {
    /// Resolved a pending selection step
    Selection {
        invocation_id: Uuid,
        kind: StepKind,
        index: usize,
    },
    /// Swallowed by a pending step of the sender without resolving it
    SelectionIgnored { invocation_id: Uuid },
    /// Started a command task
    Command(JoinHandle<()>),
    /// Ordinary chat
    Unrecognized,
}

impl Routed {
    /// Short label used in HTTP responses and logs
    pub fn label(&self) -> RoutedLabel {
        match self {
            Routed::Selection { .. } => RoutedLabel::Selection,
            Routed::SelectionIgnored { .. } => RoutedLabel::SelectionIgnored,
            Routed::Command(_) => RoutedLabel::Command,
            Routed::Unrecognized => RoutedLabel::Unrecognized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutedLabel {
    Selection,
    SelectionIgnored,
    Command,
    Unrecognized,
}

/// Maps inbound messages onto selection steps or pipeline runs
#[derive(Clone)]
pub struct CommandRouter {
    pipeline: Arc<CoverPipeline>,
}

impl CommandRouter {
    pub fn new(pipeline: Arc<CoverPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<CoverPipeline> {
        &self.pipeline
    }

    /// Handle one inbound message
    ///
    /// Must be called from within a tokio runtime.
    pub fn route(&self, msg: InboundMessage) -> Routed {
        match self.pipeline.selections().offer(&msg) {
            Offer::Resolved {
                invocation_id,
                kind,
                index,
            } => {
                debug!(
                    invocation_id = %invocation_id,
                    sender_id = %msg.sender_id,
                    step = ?kind,
                    index,
                    "Selection resolved"
                );
                return Routed::Selection {
                    invocation_id,
                    kind,
                    index,
                };
            }
            Offer::Rejected { invocation_id } => {
                debug!(
                    invocation_id = %invocation_id,
                    sender_id = %msg.sender_id,
                    "Ignoring invalid selection input"
                );
                return Routed::SelectionIgnored { invocation_id };
            }
            Offer::NotWaiting => {}
        }

        let Some(command) = parse_command(&msg.text) else {
            return Routed::Unrecognized;
        };

        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::spawn(async move {
            match command {
                Command::Cover { kind, args } => {
                    pipeline.run_cover(kind, &msg, &args).await;
                }
                Command::RefreshCatalog(kind) => {
                    // failure already reported in chat
                    let _ = pipeline.run_refresh(kind, &msg).await;
                }
                Command::SetBaseUrl { kind, url } => {
                    let _ = pipeline.run_set_base_url(kind, &msg, url.as_deref()).await;
                }
            }
        });

        Routed::Command(handle)
    }
}
