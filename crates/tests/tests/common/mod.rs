#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use pulse_core::{ChatMessage, Checkpoint, ConversationSummary, Role};
use pulse_observability::PlaybackMetrics;
use pulse_playback::{PlaybackConfig, PlaybackController};
use pulse_storage::{CheckpointStore, ConversationStore};
use tokio_util::sync::CancellationToken;

/// Wraps a store and cancels `token` right after the N-th system snapshot
/// lands in the log.
pub struct CancelAfter<S> {
    inner: S,
    token: CancellationToken,
    after: usize,
    seen: AtomicUsize,
}

impl<S> CancelAfter<S> {
    pub fn new(inner: S, token: CancellationToken, after: usize) -> Self {
        Self {
            inner,
            token,
            after,
            seen: AtomicUsize::new(0),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: CheckpointStore> CheckpointStore for CancelAfter<S> {
    async fn load_checkpoint(&self, conversation_id: &str) -> Result<Option<Checkpoint>> {
        self.inner.load_checkpoint(conversation_id).await
    }

    async fn save_checkpoint(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        self.inner.save_checkpoint(conversation_id, checkpoint).await
    }

    async fn delete_checkpoint(&self, conversation_id: &str) -> Result<()> {
        self.inner.delete_checkpoint(conversation_id).await
    }
}

impl<S: ConversationStore> ConversationStore for CancelAfter<S> {
    async fn create_conversation(&self) -> Result<ConversationSummary> {
        self.inner.create_conversation().await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.inner.list_conversations().await
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()> {
        self.inner.rename_conversation(conversation_id, title).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.inner.delete_conversation(conversation_id).await
    }

    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<()> {
        self.inner.append_message(conversation_id, message).await?;
        if message.role == Role::System && self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.after
        {
            self.token.cancel();
        }
        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        self.inner.messages(conversation_id).await
    }

    async fn clear_streaming_flags(&self, conversation_id: &str) -> Result<()> {
        self.inner.clear_streaming_flags(conversation_id).await
    }
}

pub fn instant_controller<S>(store: S) -> PlaybackController<S>
where
    S: CheckpointStore + ConversationStore,
{
    PlaybackController::new(
        Arc::new(store),
        PlaybackConfig::instant(),
        PlaybackMetrics::shared(),
    )
}

/// Content of the newest snapshot whose stream token starts with `prefix`.
pub fn latest_snapshot(messages: &[ChatMessage], prefix: &str) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|message| {
            message
                .stream_token
                .as_deref()
                .is_some_and(|token| token.starts_with(prefix))
        })
        .map(|message| message.content.clone())
}
