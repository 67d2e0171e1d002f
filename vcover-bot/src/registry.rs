//! Backend registry
//!
//! Holds the two [`BackendProfile`]s (RVC and SVC) as process-wide state.
//! Invocations read a snapshot; only the admin commands write. Every write
//! is persisted through the [`ConfigStore`] before the in-memory profile is
//! replaced.

use crate::catalog::ModelCatalog;
use crate::error::CoverError;
use crate::services::gradio_client::ConversionBackend;
use crate::services::job_runner::{JobError, JobRunner};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vcover_common::events::{BotEvent, EventBus};
use vcover_common::{BackendKind, BotConfig, ConfigStore};

/// One backend kind's endpoint and model catalog
#[derive(Debug, Clone, PartialEq)]
pub struct BackendProfile {
    pub kind: BackendKind,
    /// Always ends with `/`
    pub base_url: String,
    pub catalog: ModelCatalog,
}

impl BackendProfile {
    fn from_config(config: &BotConfig, kind: BackendKind) -> Self {
        Self {
            kind,
            base_url: config.base_url(kind),
            catalog: ModelCatalog::from_config(config.models_keywords(kind)),
        }
    }
}

/// Append the trailing `/` a base URL must end with
pub fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Registry of both backend profiles
pub struct BackendRegistry {
    rvc: RwLock<BackendProfile>,
    svc: RwLock<BackendProfile>,
    config: Arc<dyn ConfigStore>,
    event_bus: EventBus,
}

impl BackendRegistry {
    /// Build both profiles from the store's current configuration
    pub fn new(config: Arc<dyn ConfigStore>, event_bus: EventBus) -> Self {
        let current = config.current();
        Self {
            rvc: RwLock::new(BackendProfile::from_config(&current, BackendKind::Rvc)),
            svc: RwLock::new(BackendProfile::from_config(&current, BackendKind::Svc)),
            config,
            event_bus,
        }
    }

    fn slot(&self, kind: BackendKind) -> &RwLock<BackendProfile> {
        match kind {
            BackendKind::Rvc => &self.rvc,
            BackendKind::Svc => &self.svc,
        }
    }

    /// Snapshot of a profile
    pub async fn profile(&self, kind: BackendKind) -> BackendProfile {
        self.slot(kind).read().await.clone()
    }

    /// Current configuration snapshot
    pub fn config(&self) -> BotConfig {
        self.config.current()
    }

    /// Set and persist a backend URL; returns the normalized value
    pub async fn set_base_url(&self, kind: BackendKind, url: &str) -> Result<String, CoverError> {
        let url = normalize_base_url(url);
        let mut profile = self.slot(kind).write().await;

        self.config
            .update(&mut |config| config.set_base_url(kind, url.clone()))?;
        profile.base_url = url.clone();

        info!(backend = %kind, base_url = %url, "Backend URL updated");
        self.event_bus.emit_lossy(BotEvent::BackendUrlChanged {
            backend: kind,
            base_url: url.clone(),
            timestamp: Utc::now(),
        });

        Ok(url)
    }

    /// Replace a catalog with the backend's current model list
    ///
    /// Aliases of model ids still listed are kept. The listing call is
    /// retried once on failure. Returns the new model count.
    ///
    /// # Errors
    /// - `InvalidCatalogResponse` when the backend answers with anything
    ///   but a list
    /// - `InferenceError`/`InferenceTimeout` when both listing calls fail
    pub async fn refresh_catalog(
        &self,
        kind: BackendKind,
        backend: Arc<dyn ConversionBackend>,
        jobs: &JobRunner,
    ) -> Result<usize, CoverError> {
        let base_url = self.profile(kind).await.base_url;
        let timeout = self.config.current().inference_timeout();

        let listing = match list_models(&base_url, Arc::clone(&backend), jobs, timeout).await {
            Ok(value) => value,
            Err(first) => {
                warn!(backend = %kind, error = %first, "show_model failed, retrying once");
                list_models(&base_url, backend, jobs, timeout).await?
            }
        };

        let model_ids = parse_model_list(&listing)?;

        let mut profile = self.slot(kind).write().await;
        let catalog = profile.catalog.merged_with(model_ids);

        let entries = catalog.to_config();
        self.config
            .update(&mut |config| config.set_models_keywords(kind, entries.clone()))?;

        let count = catalog.len();
        profile.catalog = catalog;

        info!(backend = %kind, model_count = count, "Model catalog refreshed and saved");
        self.event_bus.emit_lossy(BotEvent::CatalogRefreshed {
            backend: kind,
            model_count: count,
            timestamp: Utc::now(),
        });

        Ok(count)
    }
}

async fn list_models(
    base_url: &str,
    backend: Arc<dyn ConversionBackend>,
    jobs: &JobRunner,
    timeout: std::time::Duration,
) -> Result<Value, CoverError> {
    let base_url = base_url.to_string();
    let pending = jobs.submit(
        "show_model",
        timeout,
        async move { backend.show_model(&base_url).await },
        |_| {},
    );

    pending.result().await.map_err(|e| match e {
        JobError::Timeout(limit) => CoverError::InferenceTimeout {
            seconds: limit.as_secs(),
        },
        other => CoverError::InferenceError(other.to_string()),
    })
}

/// Model ids from a `show_model` result
///
/// Non-string items are kept in their JSON text form.
fn parse_model_list(value: &Value) -> Result<Vec<String>, CoverError> {
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        other => Err(CoverError::InvalidCatalogResponse(other.to_string())),
    }
}
