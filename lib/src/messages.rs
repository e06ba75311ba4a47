use alloy_primitives::{keccak256, B256};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};

use crate::{bls::G1Point, hasher::HashError, impl_display_using_json_pretty};

sol! {
    /// @notice Response of a checkpoint task: SMT roots over the messages
    /// finalized in the task's time window.
    #[derive(Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
    struct CheckpointTaskResponse {
        uint32 referenceTaskIndex;
        bytes32 stateRootUpdatesRoot;
        bytes32 operatorSetUpdatesRoot;
    }

    /// @notice A rollup state root observed at a given block height.
    #[derive(Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
    struct StateRootUpdateMessage {
        uint32 rollupId;
        uint64 blockHeight;
        uint64 timestamp;
        bytes32 stateRoot;
    }

    #[derive(Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
    struct OperatorPubkey {
        uint256 X;
        uint256 Y;
    }

    #[derive(Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
    struct Operator {
        OperatorPubkey pubkey;
        uint128 weight;
    }

    /// @notice A change of the operator set mirrored to the rollups.
    #[derive(Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
    struct OperatorSetUpdateMessage {
        uint64 id;
        uint64 timestamp;
        Operator[] operators;
    }
}

pub const CHECKPOINT_TASK_RESPONSE: &str = "CheckpointTaskResponse";
pub const STATE_ROOT_UPDATE_MESSAGE: &str = "StateRootUpdateMessage";
pub const OPERATOR_SET_UPDATE_MESSAGE: &str = "OperatorSetUpdateMessage";

/// Identity of an aggregation round. Messages with the same key compete for
/// the same aggregation even when their contents differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKey {
    CheckpointTaskResponse { task_index: u32 },
    StateRootUpdate { rollup_id: u32, block_height: u64 },
    OperatorSetUpdate { update_id: u64 },
}

impl_display_using_json_pretty!(MessageKey);

impl CheckpointTaskResponse {
    pub fn key(&self) -> MessageKey {
        MessageKey::CheckpointTaskResponse {
            task_index: self.referenceTaskIndex,
        }
    }
}

impl StateRootUpdateMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey::StateRootUpdate {
            rollup_id: self.rollupId,
            block_height: self.blockHeight,
        }
    }

    /// Checkpoint tree key: `keccak256(rollupId || blockHeight)`, big-endian.
    pub fn smt_key(&self) -> B256 {
        state_root_update_smt_key(self.rollupId, self.blockHeight)
    }
}

impl OperatorSetUpdateMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey::OperatorSetUpdate { update_id: self.id }
    }

    /// Checkpoint tree key: `keccak256(id)`, big-endian.
    pub fn smt_key(&self) -> B256 {
        operator_set_update_smt_key(self.id)
    }
}

pub fn state_root_update_smt_key(rollup_id: u32, block_height: u64) -> B256 {
    let mut buf = [0u8; 12];
    buf[..4].copy_from_slice(&rollup_id.to_be_bytes());
    buf[4..].copy_from_slice(&block_height.to_be_bytes());
    keccak256(buf)
}

pub fn operator_set_update_smt_key(update_id: u64) -> B256 {
    keccak256(update_id.to_be_bytes())
}

impl From<&G1Point> for OperatorPubkey {
    fn from(point: &G1Point) -> Self {
        let (x, y) = point.coordinates();
        Self { X: x, Y: y }
    }
}

impl TryFrom<&OperatorPubkey> for G1Point {
    type Error = crate::bls::BlsError;

    fn try_from(pubkey: &OperatorPubkey) -> Result<Self, Self::Error> {
        G1Point::from_coordinates(pubkey.X, pubkey.Y)
    }
}

impl Operator {
    pub fn new(pubkey: &G1Point, weight: u128) -> Self {
        Self {
            pubkey: pubkey.into(),
            weight,
        }
    }
}

/// The closed set of messages operators sign.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SfflMessage {
    CheckpointTaskResponse(CheckpointTaskResponse),
    StateRootUpdate(StateRootUpdateMessage),
    OperatorSetUpdate(OperatorSetUpdateMessage),
}

impl_display_using_json_pretty!(SfflMessage);

impl SfflMessage {
    pub fn key(&self) -> MessageKey {
        match self {
            SfflMessage::CheckpointTaskResponse(msg) => msg.key(),
            SfflMessage::StateRootUpdate(msg) => msg.key(),
            SfflMessage::OperatorSetUpdate(msg) => msg.key(),
        }
    }

    /// Solidity struct name, the `name` component of the signing domain.
    pub fn variant_name(&self) -> &'static str {
        match self {
            SfflMessage::CheckpointTaskResponse(_) => CHECKPOINT_TASK_RESPONSE,
            SfflMessage::StateRootUpdate(_) => STATE_ROOT_UPDATE_MESSAGE,
            SfflMessage::OperatorSetUpdate(_) => OPERATOR_SET_UPDATE_MESSAGE,
        }
    }

    /// `abi.encode(message)`
    pub fn abi_encode(&self) -> Vec<u8> {
        match self {
            SfflMessage::CheckpointTaskResponse(msg) => msg.abi_encode(),
            SfflMessage::StateRootUpdate(msg) => msg.abi_encode(),
            SfflMessage::OperatorSetUpdate(msg) => msg.abi_encode(),
        }
    }

    pub fn abi_decode(variant: &str, data: &[u8]) -> Result<Self, HashError> {
        let decoding = |e: alloy_sol_types::Error| HashError::Decoding(format!("{variant}: {e}"));
        match variant {
            CHECKPOINT_TASK_RESPONSE => {
                <CheckpointTaskResponse as SolValue>::abi_decode(data, true)
                    .map(SfflMessage::CheckpointTaskResponse)
                    .map_err(decoding)
            }
            STATE_ROOT_UPDATE_MESSAGE => {
                <StateRootUpdateMessage as SolValue>::abi_decode(data, true)
                    .map(SfflMessage::StateRootUpdate)
                    .map_err(decoding)
            }
            OPERATOR_SET_UPDATE_MESSAGE => {
                <OperatorSetUpdateMessage as SolValue>::abi_decode(data, true)
                    .map(SfflMessage::OperatorSetUpdate)
                    .map_err(decoding)
            }
            other => Err(HashError::UnknownVariant(other.to_owned())),
        }
    }
}

impl From<CheckpointTaskResponse> for SfflMessage {
    fn from(msg: CheckpointTaskResponse) -> Self {
        SfflMessage::CheckpointTaskResponse(msg)
    }
}

impl From<StateRootUpdateMessage> for SfflMessage {
    fn from(msg: StateRootUpdateMessage) -> Self {
        SfflMessage::StateRootUpdate(msg)
    }
}

impl From<OperatorSetUpdateMessage> for SfflMessage {
    fn from(msg: OperatorSetUpdateMessage) -> Self {
        SfflMessage::OperatorSetUpdate(msg)
    }
}
