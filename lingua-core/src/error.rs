use thiserror::Error;

/// All errors produced by lingua-core.
#[derive(Debug, Error)]
pub enum LinguaError {
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    #[error("speech capture failed: {0}")]
    Capture(String),

    #[error("structured reply contract violated: {0}")]
    ContractViolation(String),

    #[error("speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("word lookup unavailable: {0}")]
    LookupUnavailable(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("an exchange is already pending")]
    Busy,

    #[error("the session has ended")]
    SessionEnded,

    #[error("utterance is empty")]
    EmptyUtterance,

    #[error("no turn with id {0}")]
    UnknownTurn(u64),

    #[error("turn {0} has no audio")]
    NoAudio(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for LinguaError {
    fn from(e: serde_json::Error) -> Self {
        LinguaError::ContractViolation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinguaError>;
