//! Inference dispatcher
//!
//! Runs one `convert` job on the bounded [`JobRunner`], enforces the
//! inference timeout, and hands back the produced audio as a
//! [`TempAudioArtifact`]. The artifact deletes its file when dropped, so
//! cleanup runs on every exit path of delivery: success, error, panic or
//! cancellation of the invocation task.

use crate::error::CoverError;
use crate::services::gradio_client::{ConversionBackend, ConvertRequest};
use crate::services::job_runner::{JobError, JobRunner};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// One conversion request with its time limit
#[derive(Debug, Clone)]
pub struct InferenceJob {
    pub backend_url: String,
    pub song_id: String,
    /// Semitones, within -12..=12
    pub key_shift: i32,
    pub model_id: String,
    pub timeout: Duration,
}

/// Audio file produced by a backend and owned by one invocation
///
/// Dropping the artifact deletes the file. Deletion failures are logged and
/// never escalated.
#[derive(Debug)]
pub struct TempAudioArtifact {
    path: PathBuf,
}

impl TempAudioArtifact {
    /// Take ownership of a backend-produced file
    pub fn acquire(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.is_file()
    }

    /// Run `deliver` on the file, then delete it whatever `deliver` returned
    pub async fn deliver_then_delete<F, Fut, T>(self, deliver: F) -> T
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = T>,
    {
        let outcome = deliver(self.path.clone()).await;
        drop(self);
        outcome
    }
}

impl Drop for TempAudioArtifact {
    fn drop(&mut self) {
        remove_artifact(&self.path);
    }
}

fn remove_artifact(path: &Path) {
    if !path.is_file() {
        debug!(path = %path.display(), "Temp file already gone");
        return;
    }

    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Deleted temp file"),
        Err(source) => {
            let err = CoverError::TempFileCleanup {
                path: path.to_path_buf(),
                source,
            };
            error!("{}", err);
        }
    }
}

/// Dispatches conversion jobs to the remote backend
pub struct InferenceDispatcher {
    backend: Arc<dyn ConversionBackend>,
    jobs: JobRunner,
}

impl InferenceDispatcher {
    pub fn new(backend: Arc<dyn ConversionBackend>, jobs: JobRunner) -> Self {
        Self { backend, jobs }
    }

    /// Run `job` and return the produced audio
    ///
    /// # Errors
    /// - `InferenceTimeout` when the job outlives `job.timeout`; the worker
    ///   cancels the job and frees its slot
    /// - `InferenceError` for any backend failure
    /// - `EmptyResult` when the job names no existing file
    pub async fn dispatch(&self, job: &InferenceJob) -> Result<TempAudioArtifact, CoverError> {
        let backend = Arc::clone(&self.backend);
        let backend_url = job.backend_url.clone();
        let request = ConvertRequest::new(job.song_id.clone(), job.key_shift, job.model_id.clone());

        info!(
            backend_url = %job.backend_url,
            song_id = %job.song_id,
            model_id = %job.model_id,
            key_shift = job.key_shift,
            timeout_secs = job.timeout.as_secs(),
            "Dispatching inference job"
        );

        let pending = self.jobs.submit(
            "convert",
            job.timeout,
            async move { backend.convert(&backend_url, &request).await },
            |orphaned: Option<PathBuf>| {
                if let Some(path) = orphaned {
                    drop(TempAudioArtifact::acquire(path));
                }
            },
        );

        match pending.result().await {
            Ok(Some(path)) => {
                let artifact = TempAudioArtifact::acquire(path);
                if artifact.is_present() {
                    info!(path = %artifact.path().display(), "Inference job produced audio");
                    Ok(artifact)
                } else {
                    error!(
                        path = %artifact.path().display(),
                        "Backend named a file that does not exist"
                    );
                    Err(CoverError::EmptyResult)
                }
            }
            Ok(None) => Err(CoverError::EmptyResult),
            Err(JobError::Timeout(limit)) => Err(CoverError::InferenceTimeout {
                seconds: limit.as_secs(),
            }),
            Err(JobError::Failed(e)) => Err(CoverError::InferenceError(e.to_string())),
            Err(JobError::WorkerLost) => Err(CoverError::InferenceError(
                JobError::WorkerLost.to_string(),
            )),
        }
    }
}
