//! Shared test helpers for vcover-bot integration tests
//!
//! Mock collaborators implementing the bot's seams, and a harness that
//! wires them into a [`BotState`].

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use vcover_bot::models::{InboundMessage, SongCandidate};
use vcover_bot::router::Routed;
use vcover_bot::services::{
    BackendError, ConversionBackend, ConvertRequest, SearchError, SongSearch,
};
use vcover_bot::transport::{ChatTransport, OutboundMessage, TransportError};
use vcover_bot::BotState;
use vcover_common::config::MemoryConfigStore;
use vcover_common::events::EventBus;
use vcover_common::BotConfig;

pub const SESSION: &str = "group:1001";
pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";

pub fn song(id: &str, name: &str, artists: &str) -> SongCandidate {
    SongCandidate {
        id: id.to_string(),
        name: name.to_string(),
        artists: artists.to_string(),
    }
}

/// Song search returning a fixed list and recording keywords
#[derive(Default)]
pub struct MockSearch {
    pub results: Mutex<Vec<SongCandidate>>,
    pub keywords: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn with_results(results: Vec<SongCandidate>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results),
            keywords: Mutex::new(Vec::new()),
        })
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.lock().unwrap().clone()
    }
}

#[async_trait]
impl SongSearch for MockSearch {
    async fn fetch_data(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SongCandidate>, SearchError> {
        self.keywords.lock().unwrap().push(keyword.to_string());
        Ok(self.results.lock().unwrap().iter().take(limit).cloned().collect())
    }
}

/// What a successful `convert` call of [`MockBackend`] answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOutput {
    /// Writes an audio file and returns its path
    File,
    /// Returns no path
    Nothing,
    /// Returns a path that was never written
    MissingPath,
}

/// Conversion backend writing a small audio file per convert call
pub struct MockBackend {
    pub dir: TempDir,
    pub models: Mutex<Value>,
    pub convert_delay: Mutex<Duration>,
    pub convert_error: Mutex<Option<String>>,
    pub convert_output: Mutex<ConvertOutput>,
    pub requests: Mutex<Vec<(String, ConvertRequest)>>,
    pub produced: Mutex<Vec<PathBuf>>,
    pub show_model_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dir: tempfile::tempdir().unwrap(),
            models: Mutex::new(json!([])),
            convert_delay: Mutex::new(Duration::ZERO),
            convert_error: Mutex::new(None),
            convert_output: Mutex::new(ConvertOutput::File),
            requests: Mutex::new(Vec::new()),
            produced: Mutex::new(Vec::new()),
            show_model_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_models(&self, models: Value) {
        *self.models.lock().unwrap() = models;
    }

    pub fn set_convert_delay(&self, delay: Duration) {
        *self.convert_delay.lock().unwrap() = delay;
    }

    pub fn fail_convert(&self, message: &str) {
        *self.convert_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_convert_output(&self, output: ConvertOutput) {
        *self.convert_output.lock().unwrap() = output;
    }

    pub fn requests(&self) -> Vec<(String, ConvertRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn produced(&self) -> Vec<PathBuf> {
        self.produced.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionBackend for MockBackend {
    async fn show_model(&self, _base_url: &str) -> Result<Value, BackendError> {
        self.show_model_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.models.lock().unwrap().clone())
    }

    async fn convert(
        &self,
        base_url: &str,
        request: &ConvertRequest,
    ) -> Result<Option<PathBuf>, BackendError> {
        self.requests
            .lock()
            .unwrap()
            .push((base_url.to_string(), request.clone()));

        let delay = *self.convert_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if let Some(message) = self.convert_error.lock().unwrap().clone() {
            return Err(BackendError::JobFailed(message));
        }

        let output = *self.convert_output.lock().unwrap();
        match output {
            ConvertOutput::File => {}
            ConvertOutput::Nothing => return Ok(None),
            ConvertOutput::MissingPath => return Ok(Some(self.dir.path().join("missing.wav"))),
        }

        let index = self.produced.lock().unwrap().len();
        let path = self.dir.path().join(format!("cover-{}.wav", index));
        std::fs::write(&path, b"RIFF0000WAVE")?;
        self.produced.lock().unwrap().push(path.clone());
        Ok(Some(path))
    }
}

/// One message seen by the transport
#[derive(Debug, Clone)]
pub struct Sent {
    pub session_id: String,
    pub message: OutboundMessage,
    /// For records: whether the file existed when `send` was called
    pub record_present: bool,
}

/// Chat transport recording every reply
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_records: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_records(&self) {
        *self.fail_records.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every plain and forwarded reply, in order
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s.message {
                OutboundMessage::Plain(text) => Some(text),
                OutboundMessage::Forward { text, .. } => Some(text),
                OutboundMessage::Record(_) => None,
            })
            .collect()
    }

    pub fn records(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s.message, OutboundMessage::Record(_)))
            .collect()
    }

    pub fn has_text_containing(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, session_id: &str, message: OutboundMessage) -> Result<(), TransportError> {
        let record_present = match &message {
            OutboundMessage::Record(path) => path.is_file(),
            _ => false,
        };
        let is_record = matches!(message, OutboundMessage::Record(_));

        self.sent.lock().unwrap().push(Sent {
            session_id: session_id.to_string(),
            message,
            record_present,
        });

        if is_record && *self.fail_records.lock().unwrap() {
            return Err(TransportError::Delivery("upload rejected".to_string()));
        }
        Ok(())
    }
}

/// Bot wired to mock collaborators
pub struct TestBot {
    pub state: BotState,
    pub store: Arc<MemoryConfigStore>,
    pub search: Arc<MockSearch>,
    pub backend: Arc<MockBackend>,
    pub transport: Arc<RecordingTransport>,
    pub event_bus: EventBus,
}

impl TestBot {
    pub fn new(config: BotConfig, songs: Vec<SongCandidate>) -> Self {
        let store = Arc::new(MemoryConfigStore::new(config));
        let search = MockSearch::with_results(songs);
        let backend = MockBackend::new();
        let transport = RecordingTransport::new();
        let event_bus = EventBus::new(256);

        let state = BotState::new(
            store.clone(),
            search.clone(),
            backend.clone(),
            transport.clone(),
            event_bus.clone(),
        );

        Self {
            state,
            store,
            search,
            backend,
            transport,
            event_bus,
        }
    }

    pub fn send(&self, sender: &str, text: &str) -> Routed {
        self.send_in(SESSION, sender, text)
    }

    pub fn send_in(&self, session: &str, sender: &str, text: &str) -> Routed {
        self.state.router.route(InboundMessage::new(session, sender, text))
    }

    pub fn pending_selections(&self) -> usize {
        self.state.router.pipeline().selections().pending_count()
    }

    /// Wait until a reply containing `needle` has been sent
    pub async fn wait_for_text(&self, needle: &str) {
        let transport = Arc::clone(&self.transport);
        wait_until(|| transport.has_text_containing(needle)).await;
    }
}

/// Poll `condition` every 10ms, panicking after 5s
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

/// Config with a two-model RVC catalog and short waits
pub fn config_with_rvc_models() -> BotConfig {
    BotConfig {
        rvc_models_keywords: vec![
            "alice.pth|||Alice".to_string(),
            "bob_v2.pth|||".to_string(),
        ],
        ..Default::default()
    }
}

pub fn two_songs() -> Vec<SongCandidate> {
    vec![
        song("186016", "晴天", "周杰伦"),
        song("5257138", "屋顶", "周杰伦/温岚"),
    ]
}

/// Await the command task behind a routed message
pub async fn finish(routed: Routed) {
    match routed {
        Routed::Command(handle) => handle.await.unwrap(),
        other => panic!("expected a command, got {:?}", other),
    }
}
