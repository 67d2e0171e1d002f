//! Cover pipeline
//!
//! Runs one invocation of each chat command. Both backend kinds share the
//! same pipeline; the kind only selects which [`BackendProfile`] is read.
//!
//! Every error of a cover invocation is turned into exactly one chat reply
//! here, at the invocation boundary.
//!
//! [`BackendProfile`]: crate::registry::BackendProfile

use crate::commands::parse_cover_args;
use crate::dispatcher::{InferenceDispatcher, InferenceJob};
use crate::error::CoverError;
use crate::models::{
    format_song_listing, InboundMessage, Invocation, InvocationOutcome, SongCandidate,
    StateTransition, MAX_SONG_CANDIDATES,
};
use crate::registry::BackendRegistry;
use crate::selection::{SelectionRegistry, StepKind, WaitStep};
use crate::services::gradio_client::ConversionBackend;
use crate::services::job_runner::JobRunner;
use crate::services::song_search::SongSearch;
use crate::transport::{ChatTransport, OutboundMessage};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vcover_common::events::{BotEvent, EventBus, InvocationState};
use vcover_common::BackendKind;

/// Collaborators and shared state of the pipeline
pub struct CoverPipeline {
    registry: Arc<BackendRegistry>,
    selections: Arc<SelectionRegistry>,
    search: Arc<dyn SongSearch>,
    backend: Arc<dyn ConversionBackend>,
    jobs: JobRunner,
    dispatcher: InferenceDispatcher,
    transport: Arc<dyn ChatTransport>,
    event_bus: EventBus,
}

impl CoverPipeline {
    pub fn new(
        registry: Arc<BackendRegistry>,
        selections: Arc<SelectionRegistry>,
        search: Arc<dyn SongSearch>,
        backend: Arc<dyn ConversionBackend>,
        jobs: JobRunner,
        transport: Arc<dyn ChatTransport>,
        event_bus: EventBus,
    ) -> Self {
        let dispatcher = InferenceDispatcher::new(Arc::clone(&backend), jobs.clone());
        Self {
            registry,
            selections,
            search,
            backend,
            jobs,
            dispatcher,
            transport,
            event_bus,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn selections(&self) -> &Arc<SelectionRegistry> {
        &self.selections
    }

    /// Send a reply; delivery failures are logged, never raised
    async fn reply(&self, session_id: &str, message: OutboundMessage) {
        if let Err(e) = self.transport.send(session_id, message).await {
            warn!(session_id = %session_id, error = %e, "Failed to send reply");
        }
    }

    async fn reply_forward(&self, session_id: &str, text: String) {
        let forward = self.registry.config().forward;
        self.reply(
            session_id,
            OutboundMessage::Forward {
                name: forward.name,
                uin: forward.uin,
                text,
            },
        )
        .await;
    }

    fn publish(&self, invocation: &Invocation, transition: StateTransition) {
        info!(
            invocation_id = %transition.invocation_id,
            backend = %invocation.backend,
            sender_id = %invocation.sender_id,
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            "Invocation state changed"
        );
        self.event_bus.emit_lossy(BotEvent::InvocationStateChanged {
            invocation_id: transition.invocation_id,
            backend: invocation.backend,
            sender_id: invocation.sender_id.clone(),
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: Utc::now(),
        });
    }

    fn advance(&self, invocation: &mut Invocation, state: InvocationState) {
        let transition = invocation.transition_to(state);
        self.publish(invocation, transition);
    }

    /// Run one cover invocation to its end
    pub async fn run_cover(
        &self,
        kind: BackendKind,
        msg: &InboundMessage,
        args: &[String],
    ) -> InvocationOutcome {
        let mut invocation = Invocation::new(kind, msg.session_id.clone(), msg.sender_id.clone());
        info!(
            invocation_id = %invocation.invocation_id,
            backend = %kind,
            sender_id = %msg.sender_id,
            session_id = %msg.session_id,
            "Cover invocation started"
        );

        let outcome = match self.cover_steps(&mut invocation, args).await {
            Ok(()) => InvocationOutcome::Delivered,
            Err(e) => {
                let invocation_id = invocation.invocation_id;
                match &e {
                    CoverError::InferenceError(_)
                    | CoverError::Transport(_)
                    | CoverError::Common(_) => error!(
                        invocation_id = %invocation_id,
                        error = %e,
                        "Cover invocation failed"
                    ),
                    _ => info!(
                        invocation_id = %invocation_id,
                        error = %e,
                        "Cover invocation ended early"
                    ),
                }
                self.reply(&msg.session_id, OutboundMessage::plain(e.user_message()))
                    .await;
                InvocationOutcome::from_error(&e)
            }
        };

        let transition = invocation.finish(outcome);
        self.publish(&invocation, transition);
        outcome
    }

    async fn cover_steps(
        &self,
        invocation: &mut Invocation,
        args: &[String],
    ) -> Result<(), CoverError> {
        let kind = invocation.backend;
        let session_id = invocation.session_id.clone();

        let parsed = parse_cover_args(kind, args)?;
        invocation.song_name = Some(parsed.song_name.clone());
        invocation.key_shift = parsed.key_shift;

        self.advance(invocation, InvocationState::SearchSongs);
        let mut songs = self
            .search
            .fetch_data(&parsed.song_name, MAX_SONG_CANDIDATES)
            .await
            .map_err(|e| CoverError::Search(e.to_string()))?;
        songs.truncate(MAX_SONG_CANDIDATES);
        if songs.is_empty() {
            return Err(CoverError::NoResultsFound);
        }

        let config = self.registry.config();
        let wait_secs = config.timeout;
        let wait_timeout = config.selection_timeout();

        // Song choice
        self.advance(invocation, InvocationState::AwaitSongChoice);
        let pending = self.selections.open(WaitStep::new(
            invocation,
            StepKind::Song,
            songs.len(),
            wait_timeout,
        ));
        self.reply_forward(&session_id, format_song_listing(&songs)).await;
        self.reply(
            &session_id,
            OutboundMessage::plain(format!("请在{}秒内输入歌曲序号进行选择：", wait_secs)),
        )
        .await;
        let song_index = pending.wait().await?;
        let song: SongCandidate = songs.swap_remove(song_index);
        debug!(invocation_id = %invocation.invocation_id, song_id = %song.id, "Song selected");
        invocation.selected_song = Some(song.clone());

        // Model choice, against the catalog as it is now
        let profile = self.registry.profile(kind).await;
        let listing = profile.catalog.format();
        if listing.keys.is_empty() {
            return Err(CoverError::NoModelsAvailable(kind));
        }

        self.advance(invocation, InvocationState::AwaitModelChoice);
        let pending = self.selections.open(WaitStep::new(
            invocation,
            StepKind::Model,
            listing.keys.len(),
            wait_timeout,
        ));
        self.reply_forward(
            &session_id,
            format!(
                "已选歌曲: {}\n使用: {}\n\n可用模型：\n{}",
                song.name,
                kind.label(),
                listing.text
            ),
        )
        .await;
        self.reply(
            &session_id,
            OutboundMessage::plain(format!("请在{}秒内输入模型序号：", wait_secs)),
        )
        .await;
        let model_index = pending.wait().await?;
        let model_id = listing.keys[model_index].clone();
        invocation.selected_model = Some(model_id.clone());

        // Inference
        self.reply(
            &session_id,
            OutboundMessage::plain(format!(
                "好的！正在使用 {} 模型【{}】为您生成《{}》，请耐心等待...",
                kind.label(),
                model_id,
                song.name
            )),
        )
        .await;
        self.advance(invocation, InvocationState::Dispatch);
        let job = InferenceJob {
            backend_url: profile.base_url.clone(),
            song_id: song.id.clone(),
            key_shift: invocation.key_shift,
            model_id,
            timeout: self.registry.config().inference_timeout(),
        };
        let artifact = self.dispatcher.dispatch(&job).await?;

        self.advance(invocation, InvocationState::Deliver);
        let transport = Arc::clone(&self.transport);
        artifact
            .deliver_then_delete(|path| async move {
                transport
                    .send(&session_id, OutboundMessage::Record(path))
                    .await
            })
            .await
            .map_err(|e| CoverError::Transport(e.to_string()))
    }

    /// `刷新{kind}模型`
    pub async fn run_refresh(
        &self,
        kind: BackendKind,
        msg: &InboundMessage,
    ) -> Result<usize, CoverError> {
        let session_id = &msg.session_id;
        self.reply(
            session_id,
            OutboundMessage::plain(format!("正在刷新 {} 模型列表，请稍候...", kind.label())),
        )
        .await;

        match self
            .registry
            .refresh_catalog(kind, Arc::clone(&self.backend), &self.jobs)
            .await
        {
            Ok(count) => {
                self.reply(session_id, OutboundMessage::plain("刷新成功！")).await;
                let listing = self.registry.profile(kind).await.catalog.format();
                let display = if listing.text.is_empty() {
                    "未发现任何模型。".to_string()
                } else {
                    listing.text
                };
                self.reply_forward(
                    session_id,
                    format!("当前 {} 可用模型：\n{}", kind.label(), display),
                )
                .await;
                Ok(count)
            }
            Err(e) => {
                error!(backend = %kind, error = %e, "Catalog refresh failed");
                self.reply(
                    session_id,
                    OutboundMessage::plain(format!("刷新 {} 模型出错了: {}", kind.label(), e)),
                )
                .await;
                Err(e)
            }
        }
    }

    /// `设置{kind}后端链接 [URL]`; without a URL, reports the current one
    pub async fn run_set_base_url(
        &self,
        kind: BackendKind,
        msg: &InboundMessage,
        url: Option<&str>,
    ) -> Result<(), CoverError> {
        let Some(url) = url else {
            let current = self.registry.profile(kind).await.base_url;
            self.reply(
                &msg.session_id,
                OutboundMessage::plain(format!(
                    "当前 {} 后端: {}\n用法: /设置{}后端链接 <URL>",
                    kind.label(),
                    current,
                    kind.as_str()
                )),
            )
            .await;
            return Ok(());
        };

        match self.registry.set_base_url(kind, url).await {
            Ok(url) => {
                self.reply(
                    &msg.session_id,
                    OutboundMessage::plain(format!("{} 后端链接已设置为: {}", kind.label(), url)),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                error!(backend = %kind, error = %e, "Failed to save backend URL");
                self.reply(&msg.session_id, OutboundMessage::plain(e.user_message()))
                    .await;
                Err(e)
            }
        }
    }
}
