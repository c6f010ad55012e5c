use std::path::PathBuf;

use crate::ChannelIndex;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("channel index {0} is out of range")]
    ChannelOutOfRange(usize),

    #[error("engine has not been set up")]
    NotSetUp,

    #[error("engine stream has not been started")]
    NotStarted,

    #[error("engine stream is already running")]
    AlreadyStarted,

    #[error("no stem loaded on channel {0}")]
    NoChannelLoaded(ChannelIndex),

    #[error("engine command queue is full")]
    QueueFull,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("failed to decode stem '{path}': {source}")]
    Decode {
        path: PathBuf,
        source: anyhow::Error,
    },
}
