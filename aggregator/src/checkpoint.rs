use alloy_primitives::B256;
use sffl_core::{QuorumNumber, QuorumThresholdPercentage};
use sffl_lib::{
    messages::{CheckpointTaskResponse, OperatorSetUpdateMessage, StateRootUpdateMessage},
    MessageHasher, SfflMessage, SmtProof, SparseMerkleTree,
};
use sffl_store::{CheckpointMessages, CheckpointWindow, Store};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    error::{CheckpointError, CheckpointResult},
    service::AggregationService,
};

/// The two checkpoint trees, keyed by message SMT key with content digests as leaves.
#[derive(Debug, Clone, Default)]
pub struct CheckpointTrees {
    pub state_root_updates: SparseMerkleTree,
    pub operator_set_updates: SparseMerkleTree,
}

impl CheckpointTrees {
    pub fn prove_state_root_update(&self, msg: &StateRootUpdateMessage) -> CheckpointResult<SmtProof> {
        Ok(self.state_root_updates.prove(&msg.smt_key())?)
    }

    pub fn prove_operator_set_update(
        &self,
        msg: &OperatorSetUpdateMessage,
    ) -> CheckpointResult<SmtProof> {
        Ok(self.operator_set_updates.prove(&msg.smt_key())?)
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointAssembly {
    pub response: CheckpointTaskResponse,
    /// What operators sign to attest `response`.
    pub signing_digest: B256,
    pub trees: CheckpointTrees,
    pub messages: CheckpointMessages,
}

/// Builds checkpoint task responses from the finalized messages in a store.
#[derive(Clone)]
pub struct CheckpointAssembler {
    store: Arc<dyn Store>,
    hasher: Arc<dyn MessageHasher>,
}

impl CheckpointAssembler {
    pub fn new(store: Arc<dyn Store>, hasher: Arc<dyn MessageHasher>) -> Self {
        Self { store, hasher }
    }

    pub async fn assemble(
        &self,
        task_index: u32,
        from_timestamp: u64,
        to_timestamp: u64,
    ) -> CheckpointResult<CheckpointAssembly> {
        CheckpointWindow::new(from_timestamp, to_timestamp)
            .map_err(|_| CheckpointError::InvalidRange(from_timestamp, to_timestamp))?;
        let messages = self
            .store
            .fetch_checkpoint_messages(from_timestamp, to_timestamp)
            .await?;

        let mut trees = CheckpointTrees::default();
        for (msg, _) in &messages.state_root_updates {
            let digest = self
                .hasher
                .content_digest(&SfflMessage::StateRootUpdate(msg.clone()))?;
            trees.state_root_updates.insert(msg.smt_key(), digest)?;
        }
        for (msg, _) in &messages.operator_set_updates {
            let digest = self
                .hasher
                .content_digest(&SfflMessage::OperatorSetUpdate(msg.clone()))?;
            trees.operator_set_updates.insert(msg.smt_key(), digest)?;
        }

        let response = CheckpointTaskResponse {
            referenceTaskIndex: task_index,
            stateRootUpdatesRoot: trees.state_root_updates.commit(),
            operatorSetUpdatesRoot: trees.operator_set_updates.commit(),
        };
        let signing_digest = self
            .hasher
            .signing_digest(&SfflMessage::CheckpointTaskResponse(response.clone()))?;

        info!(
            "CheckpointAssembler.assemble: task {task_index}, [{from_timestamp}, {to_timestamp}], {} state root updates, {} operator set updates",
            messages.state_root_updates.len(),
            messages.operator_set_updates.len()
        );
        Ok(CheckpointAssembly {
            response,
            signing_digest,
            trees,
            messages,
        })
    }
}

/// Opens the aggregation round operators sign the assembled checkpoint in,
/// referenced at the registry's current block.
pub async fn start_round(
    service: &AggregationService,
    assembly: &CheckpointAssembly,
    quorum_numbers: &[QuorumNumber],
    quorum_threshold_percentages: &[QuorumThresholdPercentage],
    time_to_expiry: Duration,
    aggregation_timeout: Duration,
) -> CheckpointResult<()> {
    service
        .initialize_message_if_not_exists(
            assembly.response.key(),
            quorum_numbers,
            quorum_threshold_percentages,
            time_to_expiry,
            aggregation_timeout,
            0,
        )
        .await?;
    Ok(())
}
