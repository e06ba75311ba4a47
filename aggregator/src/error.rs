use serde::{Deserialize, Serialize};
use sffl_core::{OperatorId, RegistryError};
use sffl_lib::{HashError, MessageKey, SmtError};
use sffl_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// A round for this key is already running.
    #[error("Message already initialized: {0}")]
    MessageAlreadyInitialized(MessageKey),

    /// No round is running for this key, either never started or already over.
    #[error("Message not found: {0}")]
    MessageNotFound(MessageKey),

    #[error("Operator {0} is not part of the round's quorums")]
    OperatorNotInQuorum(OperatorId),

    /// The pairing check could not be evaluated on the given points.
    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    #[error("Incorrect signature from operator {0}")]
    IncorrectSignature(OperatorId),

    #[error("Message digest unavailable: {0}")]
    MessageDigestUnavailable(String),

    /// The registry knows the operator but not its G2 key. Fatal for the round.
    #[error("Missing G2 public key for operator {0}")]
    MissingOperatorPubkey(OperatorId),

    #[error("Invalid reference block: {0}")]
    InvalidReferenceBlock(u64),

    #[error("There was an error with the registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Operation cancelled")]
    Cancelled,

    /// The round accepted the signature but stopped before answering.
    #[error("Aggregation task for {0} is unavailable")]
    TaskUnavailable(MessageKey),
}

pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// Errors carried on the response stream rather than returned to a caller.
#[derive(PartialEq, Eq, Debug, Clone, Deserialize, Serialize, thiserror::Error)]
pub enum ResponseError {
    #[error("Message expired before reaching the threshold")]
    MessageExpired,

    #[error("There was an error with the registry source: {0}")]
    RegistrySource(String),

    #[error("Registry is inconsistent: {0}")]
    RegistryCorruption(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Invalid checkpoint range [{0}, {1}]")]
    InvalidRange(u64, u64),

    #[error("There was an error building the checkpoint tree: {0}")]
    Smt(#[from] SmtError),

    #[error("There was an error with the store: {0}")]
    Store(#[from] StoreError),

    #[error("There was an error hashing a message: {0}")]
    Hash(#[from] HashError),

    #[error("There was an error with the registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("There was an error with the aggregator: {0}")]
    Aggregator(#[from] AggregatorError),
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;
