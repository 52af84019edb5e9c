use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Atomic replace of {path} failed: {reason}")]
    Persist { path: String, reason: String },

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Storage task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}
