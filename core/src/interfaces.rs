use alloy_primitives::B256;
use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use sffl_lib::{G1Point, G2Point};
use std::collections::{BTreeMap, HashMap};

pub type OperatorId = B256;
pub type QuorumNumber = u8;
pub type QuorumThresholdPercentage = u8;
pub type StakeAmount = BigUint;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// For failures of the registry backend, usually transient RPC errors.
    #[error("There was an error with the registry source: {0}")]
    RegistrySource(String),

    /// A requested quorum is unknown at the reference block.
    #[error("Quorum {0} not found at block {1}")]
    QuorumNotFound(QuorumNumber, u32),

    /// For inconsistent quorum numbers and threshold percentages.
    #[error("Invalid quorum thresholds: {0}")]
    InvalidThresholds(String),

    /// For I/O errors.
    #[error("There was a I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// For Serde errors.
    #[error("There was a deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// An operator as registered at a reference block.
#[serde_as]
#[derive(PartialEq, Eq, Debug, Clone, Deserialize, Serialize)]
pub struct OperatorAvsState {
    pub operator_id: OperatorId,
    pub pubkey_g1: G1Point,
    /// Absent when the registry lost track of the G2 key, which it never should.
    #[serde(default)]
    pub pubkey_g2: Option<G2Point>,
    #[serde_as(as = "BTreeMap<_, DisplayFromStr>")]
    pub stake_per_quorum: BTreeMap<QuorumNumber, StakeAmount>,
}

/// A quorum as registered at a reference block.
#[serde_as]
#[derive(PartialEq, Eq, Debug, Clone, Deserialize, Serialize)]
pub struct QuorumAvsState {
    pub quorum_number: QuorumNumber,
    pub agg_pubkey_g1: G1Point,
    #[serde_as(as = "DisplayFromStr")]
    pub total_stake: StakeAmount,
}

/// Index hints the on-chain signature checker needs to locate historical
/// registry entries without iterating.
#[derive(PartialEq, Eq, Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckSignaturesIndices {
    pub non_signer_quorum_bitmap_indices: Vec<u32>,
    pub quorum_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

/// Read access to the operator registry, as of a given block.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn block_number(&self) -> RegistryResult<u64>;

    async fn get_operators_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block_number: u32,
    ) -> RegistryResult<HashMap<OperatorId, OperatorAvsState>>;

    async fn get_quorums_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block_number: u32,
    ) -> RegistryResult<HashMap<QuorumNumber, QuorumAvsState>>;

    async fn get_check_signatures_indices(
        &self,
        reference_block_number: u32,
        quorum_numbers: &[QuorumNumber],
        non_signer_operator_ids: &[OperatorId],
    ) -> RegistryResult<CheckSignaturesIndices>;
}
