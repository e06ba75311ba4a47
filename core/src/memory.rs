//! A registry served from a JSON snapshot held in memory.
//!
//! The snapshot is a single point in time, so every historical lookup at or
//! before its block resolves to the same state and all index hints are zero.

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sffl_lib::G1Point;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::Path,
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::interfaces::{
    CheckSignaturesIndices, OperatorAvsState, OperatorId, QuorumAvsState, QuorumNumber,
    RegistryError, RegistryResult, RegistrySource,
};

#[derive(PartialEq, Eq, Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistrySnapshot {
    pub block_number: u64,
    pub operators: Vec<OperatorAvsState>,
}

impl RegistrySnapshot {
    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn check_block(&self, block_number: u32) -> RegistryResult<()> {
        if u64::from(block_number) > self.block_number {
            return Err(RegistryError::RegistrySource(format!(
                "block {block_number} is ahead of the registry head {}",
                self.block_number
            )));
        }
        Ok(())
    }

    fn registered_in(&self, quorum_number: QuorumNumber) -> impl Iterator<Item = &OperatorAvsState> {
        self.operators
            .iter()
            .filter(move |op| op.stake_per_quorum.contains_key(&quorum_number))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    snapshot: Arc<RwLock<RegistrySnapshot>>,
}

impl InMemoryRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let snapshot = RegistrySnapshot::from_file(path)?;
        info!(
            "InMemoryRegistry.from_file: {} operators at block {}",
            snapshot.operators.len(),
            snapshot.block_number
        );
        Ok(Self::new(snapshot))
    }

    pub async fn set_block_number(&self, block_number: u64) {
        self.snapshot.write().await.block_number = block_number;
    }

    /// Adds or replaces an operator.
    pub async fn register_operator(&self, operator: OperatorAvsState) {
        let mut snapshot = self.snapshot.write().await;
        snapshot
            .operators
            .retain(|op| op.operator_id != operator.operator_id);
        snapshot.operators.push(operator);
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.snapshot.read().await.clone()
    }
}

#[async_trait]
impl RegistrySource for InMemoryRegistry {
    async fn block_number(&self) -> RegistryResult<u64> {
        Ok(self.snapshot.read().await.block_number)
    }

    async fn get_operators_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block_number: u32,
    ) -> RegistryResult<HashMap<OperatorId, OperatorAvsState>> {
        let snapshot = self.snapshot.read().await;
        snapshot.check_block(block_number)?;

        let requested: BTreeSet<_> = quorum_numbers.iter().copied().collect();
        Ok(snapshot
            .operators
            .iter()
            .filter_map(|op| {
                let stake_per_quorum: BTreeMap<_, _> = op
                    .stake_per_quorum
                    .iter()
                    .filter(|(quorum_number, _)| requested.contains(quorum_number))
                    .map(|(quorum_number, stake)| (*quorum_number, stake.clone()))
                    .collect();
                (!stake_per_quorum.is_empty()).then(|| {
                    (
                        op.operator_id,
                        OperatorAvsState {
                            stake_per_quorum,
                            ..op.clone()
                        },
                    )
                })
            })
            .collect())
    }

    async fn get_quorums_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block_number: u32,
    ) -> RegistryResult<HashMap<QuorumNumber, QuorumAvsState>> {
        let snapshot = self.snapshot.read().await;
        snapshot.check_block(block_number)?;

        let mut quorums = HashMap::new();
        for quorum_number in quorum_numbers {
            let mut members = snapshot.registered_in(*quorum_number).peekable();
            if members.peek().is_none() {
                continue;
            }
            let (agg_pubkey_g1, total_stake) = members.fold(
                (G1Point::zero(), BigUint::default()),
                |(apk, total), op| {
                    (
                        apk.add(&op.pubkey_g1),
                        total + &op.stake_per_quorum[quorum_number],
                    )
                },
            );
            quorums.insert(
                *quorum_number,
                QuorumAvsState {
                    quorum_number: *quorum_number,
                    agg_pubkey_g1,
                    total_stake,
                },
            );
        }
        Ok(quorums)
    }

    async fn get_check_signatures_indices(
        &self,
        reference_block_number: u32,
        quorum_numbers: &[QuorumNumber],
        non_signer_operator_ids: &[OperatorId],
    ) -> RegistryResult<CheckSignaturesIndices> {
        let snapshot = self.snapshot.read().await;
        snapshot.check_block(reference_block_number)?;

        let mut non_signers = Vec::with_capacity(non_signer_operator_ids.len());
        for operator_id in non_signer_operator_ids {
            let operator = snapshot
                .operators
                .iter()
                .find(|op| &op.operator_id == operator_id)
                .ok_or_else(|| {
                    RegistryError::RegistrySource(format!("unknown non-signer {operator_id}"))
                })?;
            non_signers.push(operator);
        }

        Ok(CheckSignaturesIndices {
            non_signer_quorum_bitmap_indices: vec![0; non_signers.len()],
            quorum_apk_indices: vec![0; quorum_numbers.len()],
            total_stake_indices: vec![0; quorum_numbers.len()],
            non_signer_stake_indices: quorum_numbers
                .iter()
                .map(|quorum_number| {
                    let count = non_signers
                        .iter()
                        .filter(|op| op.stake_per_quorum.contains_key(quorum_number))
                        .count();
                    vec![0; count]
                })
                .collect(),
        })
    }
}
