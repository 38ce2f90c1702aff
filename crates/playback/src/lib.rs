pub mod config;
pub mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use pulse_core::{
    compile_prompt, explain, Artifact, CampaignPayload, ChatMessage, Checkpoint, FacetSelection,
    Reveal,
};
use pulse_observability::PlaybackMetrics;
use pulse_storage::{CheckpointStore, ConversationStore};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub use config::{Cadence, PlaybackConfig};
pub use error::PlaybackError;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "artifact", rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Streaming(Artifact),
    Paused(Artifact),
    Completed,
}

#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Snapshot {
        conversation_id: String,
        artifact: Artifact,
        message: ChatMessage,
    },
    Paused {
        conversation_id: String,
        artifact: Artifact,
        offset: usize,
    },
    Completed {
        conversation_id: String,
    },
    Stopped {
        conversation_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Completed(Box<CampaignPayload>),
    Paused(Box<Checkpoint>),
    /// Global stop: nothing was persisted and the conversation is idle again.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Pause,
    Stop,
}

/// Reveals compiled payloads (JSON first, then the explanation) into a
/// conversation log, one unit per step.
///
/// A per-operation pause token is checked at the top of every step; a pause
/// persists a checkpoint that `resume` continues from. `stop_all` halts every
/// in-flight reveal and drops their progress instead.
pub struct PlaybackController<S>
where
    S: CheckpointStore + ConversationStore,
{
    store: Arc<S>,
    config: PlaybackConfig,
    metrics: Arc<PlaybackMetrics>,
    states: RwLock<HashMap<String, PlaybackState>>,
    global_stop: Mutex<CancellationToken>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl<S> PlaybackController<S>
where
    S: CheckpointStore + ConversationStore,
{
    pub fn new(store: Arc<S>, config: PlaybackConfig, metrics: Arc<PlaybackMetrics>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            config,
            metrics,
            states: RwLock::new(HashMap::new()),
            global_stop: Mutex::new(CancellationToken::new()),
            events,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<PlaybackMetrics> {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, conversation_id: &str) -> PlaybackState {
        self.states
            .read()
            .get(conversation_id)
            .copied()
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn compile(&self, prompt: &str, facets: &FacetSelection) -> CampaignPayload {
        self.metrics.inc_compile();
        compile_prompt(prompt, facets)
    }

    /// Compile `prompt` and reveal it from the beginning. Any checkpoint left
    /// from an earlier prompt in this conversation is superseded.
    #[instrument(skip(self, prompt, facets, pause))]
    pub async fn start(
        &self,
        conversation_id: &str,
        prompt: &str,
        facets: &FacetSelection,
        pause: &CancellationToken,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let _streaming = self.begin(conversation_id)?;

        self.store.delete_checkpoint(conversation_id).await?;
        self.store
            .append_message(
                conversation_id,
                &ChatMessage::user(format!("user-{}", Uuid::new_v4().simple()), prompt),
            )
            .await?;

        let payload = self.compile(prompt, facets);
        info!(
            conversation_id = %conversation_id,
            campaign_id = %payload.campaign_id,
            channels = payload.workflow.len(),
            "campaign compiled"
        );

        let progress = Checkpoint::start(payload, prompt, new_token(Artifact::PayloadJson));
        self.run(conversation_id, progress, pause).await
    }

    /// Continue the paused reveal for `conversation_id` where it stopped.
    #[instrument(skip(self, pause))]
    pub async fn resume(
        &self,
        conversation_id: &str,
        pause: &CancellationToken,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let _streaming = self.begin(conversation_id)?;

        let Some(progress) = self.store.load_checkpoint(conversation_id).await? else {
            return Err(PlaybackError::NothingToResume(conversation_id.to_string()));
        };

        self.metrics.inc_resume();
        info!(
            conversation_id = %conversation_id,
            artifact = ?progress.artifact(),
            json_index = progress.json_index,
            explanation_index = progress.explanation_index,
            "resuming playback"
        );
        self.run(conversation_id, progress, pause).await
    }

    /// Load the conversation's checkpoint, if any, and report where its
    /// playback stands. Unreadable checkpoints come back as `Idle`.
    pub async fn select_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<PlaybackState, PlaybackError> {
        if let PlaybackState::Streaming(artifact) = self.state(conversation_id) {
            return Ok(PlaybackState::Streaming(artifact));
        }

        let state = match self.store.load_checkpoint(conversation_id).await? {
            Some(checkpoint) => PlaybackState::Paused(checkpoint.artifact()),
            None => PlaybackState::Idle,
        };
        self.set_state(conversation_id, state);
        Ok(state)
    }

    /// Drop paused progress for a conversation.
    pub async fn discard(&self, conversation_id: &str) -> Result<(), PlaybackError> {
        self.store.delete_checkpoint(conversation_id).await?;
        self.set_state(conversation_id, PlaybackState::Idle);
        Ok(())
    }

    /// Halt every in-flight reveal without keeping its progress. Reveals
    /// started afterwards are unaffected.
    pub fn stop_all(&self) {
        let mut current = self.global_stop.lock();
        current.cancel();
        *current = CancellationToken::new();
        info!("global stop raised");
    }

    fn begin(&self, conversation_id: &str) -> Result<StreamingGuard<'_>, PlaybackError> {
        let mut states = self.states.write();
        if let Some(PlaybackState::Streaming(_)) = states.get(conversation_id) {
            return Err(PlaybackError::Busy(conversation_id.to_string()));
        }
        states.insert(
            conversation_id.to_string(),
            PlaybackState::Streaming(Artifact::PayloadJson),
        );
        Ok(StreamingGuard {
            states: &self.states,
            conversation_id: conversation_id.to_string(),
        })
    }

    fn set_state(&self, conversation_id: &str, state: PlaybackState) {
        self.states.write().insert(conversation_id.to_string(), state);
    }

    async fn run(
        &self,
        conversation_id: &str,
        mut progress: Checkpoint,
        pause: &CancellationToken,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let stop = self.global_stop.lock().clone();

        if progress.explanation_id.is_none() {
            self.set_state(conversation_id, PlaybackState::Streaming(Artifact::PayloadJson));

            let mut reveal = Reveal::resume(
                progress.payload.to_pretty_json()?,
                progress.json_index,
                std::mem::take(&mut progress.streamed_json),
                self.config.json.publish_every,
            );
            let halt = self
                .reveal(
                    conversation_id,
                    Artifact::PayloadJson,
                    &progress.stream_id,
                    &mut reveal,
                    self.config.json.delay,
                    pause,
                    &stop,
                )
                .await?;

            progress.json_index = reveal.position();
            progress.streamed_json = reveal.into_revealed();
            if let Some(halt) = halt {
                return self.halt(conversation_id, progress, halt).await;
            }
        }

        let explanation_id = progress
            .explanation_id
            .get_or_insert_with(|| new_token(Artifact::Explanation))
            .clone();
        self.set_state(conversation_id, PlaybackState::Streaming(Artifact::Explanation));

        let mut reveal = Reveal::resume(
            explain(&progress.payload, &progress.user_input),
            progress.explanation_index,
            std::mem::take(&mut progress.streamed_explanation),
            self.config.explanation.publish_every,
        );
        let halt = self
            .reveal(
                conversation_id,
                Artifact::Explanation,
                &explanation_id,
                &mut reveal,
                self.config.explanation.delay,
                pause,
                &stop,
            )
            .await?;

        progress.explanation_index = reveal.position();
        progress.streamed_explanation = reveal.into_revealed();
        if let Some(halt) = halt {
            return self.halt(conversation_id, progress, halt).await;
        }

        self.store.delete_checkpoint(conversation_id).await?;
        self.set_state(conversation_id, PlaybackState::Completed);
        self.metrics.inc_completion();
        let _ = self.events.send(PlaybackEvent::Completed {
            conversation_id: conversation_id.to_string(),
        });
        info!(conversation_id = %conversation_id, "playback completed");

        Ok(PlaybackOutcome::Completed(Box::new(progress.payload)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn reveal(
        &self,
        conversation_id: &str,
        artifact: Artifact,
        token: &str,
        reveal: &mut Reveal,
        delay: Duration,
        pause: &CancellationToken,
        stop: &CancellationToken,
    ) -> Result<Option<Halt>, PlaybackError> {
        while !reveal.is_complete() {
            if stop.is_cancelled() {
                return Ok(Some(Halt::Stop));
            }
            if pause.is_cancelled() {
                return Ok(Some(Halt::Pause));
            }

            let Some(step) = reveal.advance() else {
                break;
            };

            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            if step.publish {
                let settled = step.last || pause.is_cancelled() || stop.is_cancelled();
                let message =
                    ChatMessage::snapshot(token, step.index, reveal.revealed(), !settled);
                self.store.append_message(conversation_id, &message).await?;
                self.metrics.inc_snapshot();
                let _ = self.events.send(PlaybackEvent::Snapshot {
                    conversation_id: conversation_id.to_string(),
                    artifact,
                    message,
                });
            }
        }

        Ok(None)
    }

    async fn halt(
        &self,
        conversation_id: &str,
        progress: Checkpoint,
        halt: Halt,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let artifact = progress.artifact();

        match halt {
            Halt::Pause => {
                self.store.save_checkpoint(conversation_id, &progress).await?;
                self.store.clear_streaming_flags(conversation_id).await?;
                self.set_state(conversation_id, PlaybackState::Paused(artifact));
                self.metrics.inc_pause();

                let offset = match artifact {
                    Artifact::PayloadJson => progress.json_index,
                    Artifact::Explanation => progress.explanation_index,
                };
                let _ = self.events.send(PlaybackEvent::Paused {
                    conversation_id: conversation_id.to_string(),
                    artifact,
                    offset,
                });
                info!(
                    conversation_id = %conversation_id,
                    artifact = ?artifact,
                    offset,
                    "playback paused"
                );

                Ok(PlaybackOutcome::Paused(Box::new(progress)))
            }
            Halt::Stop => {
                self.store.delete_checkpoint(conversation_id).await?;
                self.store.clear_streaming_flags(conversation_id).await?;
                self.set_state(conversation_id, PlaybackState::Idle);
                self.metrics.inc_stop();
                let _ = self.events.send(PlaybackEvent::Stopped {
                    conversation_id: conversation_id.to_string(),
                });
                debug!(conversation_id = %conversation_id, "playback stopped globally");

                Ok(PlaybackOutcome::Stopped)
            }
        }
    }
}

/// Held for the lifetime of a `start`/`resume` call. A run that ends without
/// reaching `Paused`, `Completed` or `Idle` (an error, or the future being
/// dropped) leaves the conversation `Idle` again.
struct StreamingGuard<'a> {
    states: &'a RwLock<HashMap<String, PlaybackState>>,
    conversation_id: String,
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        let mut states = self.states.write();
        if matches!(
            states.get(&self.conversation_id),
            Some(PlaybackState::Streaming(_))
        ) {
            debug!(conversation_id = %self.conversation_id, "playback abandoned mid-stream");
            states.insert(self.conversation_id.clone(), PlaybackState::Idle);
        }
    }
}

fn new_token(artifact: Artifact) -> String {
    format!("{}-{}", artifact.token_prefix(), Uuid::new_v4().simple())
}
