use thiserror::Error;
use venuebook_common::VenuebookError;

/// Errors of the local persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored record is not valid JSON or does not match the expected shape
    #[error("Stored record is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record was written by a newer schema than this build understands
    #[error("Unsupported version {version} for '{namespace}'")]
    UnsupportedVersion { namespace: String, version: u64 },
}

impl From<StoreError> for VenuebookError {
    fn from(err: StoreError) -> Self {
        VenuebookError::StorageError(err.to_string())
    }
}
