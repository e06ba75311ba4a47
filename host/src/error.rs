use sffl_aggregator::{AggregatorError, CheckpointError};
use sffl_core::RegistryError;
use sffl_lib::HashError;
use sffl_store::StoreError;

/// The standardized error returned by the SFFL host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// For I/O errors.
    #[error("There was a I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// For Serde errors.
    #[error("There was a deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// For invalid or inconsistent options.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// For errors loading or reading the operator registry.
    #[error("There was an error with the registry: {0}")]
    Registry(#[from] RegistryError),

    /// For errors produced by the message hasher.
    #[error("There was an error hashing a message: {0}")]
    Hash(#[from] HashError),

    /// For errors produced by the aggregation service.
    #[error("There was an error with the aggregator: {0}")]
    Aggregator(#[from] AggregatorError),

    /// For errors assembling a checkpoint.
    #[error("There was an error assembling a checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// For errors from the message store.
    #[error("There was an error with the store: {0}")]
    Store(#[from] StoreError),

    /// For tokio join handle errors.
    #[error("There was an error with a tokio task: {0}")]
    JoinHandle(#[from] tokio::task::JoinError),

    /// A catch-all error for any other error type.
    #[error("There was an unexpected error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type HostResult<T> = Result<T, HostError>;
