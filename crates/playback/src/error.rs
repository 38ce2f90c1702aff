use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("a reveal is already streaming for conversation {0}")]
    Busy(String),
    #[error("no paused playback to resume for conversation {0}")]
    NothingToResume(String),
    #[error("failed to serialize campaign payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
