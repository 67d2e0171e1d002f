//! Remote collaborators and the job runner

pub mod gradio_client;
pub mod job_runner;
pub mod song_search;

pub use gradio_client::{BackendError, ConversionBackend, ConvertRequest, GradioClient};
pub use job_runner::{JobError, JobRunner, PendingJob};
pub use song_search::{
    build_song_search, NetEaseClient, NetEaseNodeJsClient, SearchError, SongSearch,
};
