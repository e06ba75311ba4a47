use alloy_primitives::{keccak256, B256};
use std::fmt;

use crate::{
    messages::{
        SfflMessage, CHECKPOINT_TASK_RESPONSE, OPERATOR_SET_UPDATE_MESSAGE,
        STATE_ROOT_UPDATE_MESSAGE,
    },
    primitives::hash_values,
};

pub const DOMAIN_TYPE: &str = "SFFLDomain(bytes32 name,bytes32 protocolVersion)";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Failed to encode message: {0}")]
    Encoding(String),

    #[error("Failed to decode message: {0}")]
    Decoding(String),

    #[error("Unknown message variant: {0}")]
    UnknownVariant(String),
}

pub type HashResult<T> = Result<T, HashError>;

/// Produces the two digests the aggregation pipeline needs for a message.
///
/// The content digest identifies the message itself (and is the checkpoint
/// leaf value); the signing digest binds it to a protocol domain and is what
/// operators actually sign.
pub trait MessageHasher: Send + Sync + fmt::Debug {
    fn content_digest(&self, message: &SfflMessage) -> HashResult<B256>;

    fn signing_digest(&self, message: &SfflMessage) -> HashResult<B256>;
}

pub fn domain_typehash() -> B256 {
    keccak256(DOMAIN_TYPE)
}

pub fn domain_separator(variant_name: &str, protocol_version: B256) -> B256 {
    hash_values(&[domain_typehash(), keccak256(variant_name), protocol_version])
}

/// Version string packed into the `bytes32 protocolVersion` of the domain.
pub fn protocol_version_from_str(version: &str) -> HashResult<B256> {
    if version.len() > 32 {
        return Err(HashError::Encoding(format!(
            "protocol version {version:?} is longer than 32 bytes"
        )));
    }
    Ok(B256::right_padding_from(version.as_bytes()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SfflHasher {
    checkpoint_separator: B256,
    state_root_separator: B256,
    operator_set_separator: B256,
}

impl SfflHasher {
    pub const DEFAULT_PROTOCOL_VERSION: &'static str = "v0.1.0";

    pub fn new(protocol_version: B256) -> Self {
        Self {
            checkpoint_separator: domain_separator(CHECKPOINT_TASK_RESPONSE, protocol_version),
            state_root_separator: domain_separator(STATE_ROOT_UPDATE_MESSAGE, protocol_version),
            operator_set_separator: domain_separator(OPERATOR_SET_UPDATE_MESSAGE, protocol_version),
        }
    }

    pub fn domain_separator(&self, message: &SfflMessage) -> B256 {
        match message {
            SfflMessage::CheckpointTaskResponse(_) => self.checkpoint_separator,
            SfflMessage::StateRootUpdate(_) => self.state_root_separator,
            SfflMessage::OperatorSetUpdate(_) => self.operator_set_separator,
        }
    }
}

impl Default for SfflHasher {
    fn default() -> Self {
        Self::new(B256::right_padding_from(
            Self::DEFAULT_PROTOCOL_VERSION.as_bytes(),
        ))
    }
}

impl MessageHasher for SfflHasher {
    fn content_digest(&self, message: &SfflMessage) -> HashResult<B256> {
        Ok(keccak256(message.abi_encode()))
    }

    fn signing_digest(&self, message: &SfflMessage) -> HashResult<B256> {
        let content = self.content_digest(message)?;
        Ok(hash_values(&[self.domain_separator(message), content]))
    }
}
