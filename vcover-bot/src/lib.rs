//! vcover-bot library interface
//!
//! Exposes the pipeline pieces and the HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod catalog;
pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod selection;
pub mod services;
pub mod transport;

pub use crate::error::{ApiError, ApiResult, CoverError};

use crate::pipeline::CoverPipeline;
use crate::registry::BackendRegistry;
use crate::router::CommandRouter;
use crate::selection::SelectionRegistry;
use crate::services::{ConversionBackend, JobRunner, SongSearch};
use crate::transport::ChatTransport;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use vcover_common::events::EventBus;
use vcover_common::ConfigStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct BotState {
    /// Inbound message dispatcher
    pub router: CommandRouter,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Worker pool shared by inference and catalog listing
    pub jobs: JobRunner,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl BotState {
    /// Wire the pipeline from its collaborators
    ///
    /// The worker pool is sized from `max_concurrent_jobs` in the current
    /// configuration.
    pub fn new(
        config: Arc<dyn ConfigStore>,
        search: Arc<dyn SongSearch>,
        backend: Arc<dyn ConversionBackend>,
        transport: Arc<dyn ChatTransport>,
        event_bus: EventBus,
    ) -> Self {
        let jobs = JobRunner::new(config.current().max_concurrent_jobs);
        let registry = Arc::new(BackendRegistry::new(config, event_bus.clone()));
        let pipeline = CoverPipeline::new(
            registry,
            Arc::new(SelectionRegistry::new()),
            search,
            backend,
            jobs.clone(),
            transport,
            event_bus.clone(),
        );

        Self {
            router: CommandRouter::new(Arc::new(pipeline)),
            event_bus,
            jobs,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: BotState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::message_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
