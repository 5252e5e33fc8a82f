use thiserror::Error;

pub type Result<T> = std::result::Result<T, ErrataError>;

#[derive(Debug, Error)]
pub enum ErrataError {
    #[error("input is empty after trimming")]
    EmptyInput,

    #[error("a response stream is already in flight")]
    Busy,

    #[error("chat backend error: {0}")]
    Backend(String),

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
