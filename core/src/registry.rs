use derive_getters::Getters;
use sffl_lib::G1Point;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::interfaces::{
    OperatorAvsState, OperatorId, QuorumAvsState, QuorumNumber, QuorumThresholdPercentage,
    RegistryError, RegistryResult, RegistrySource, StakeAmount,
};

/// Snapshot of the registry a message task validates signatures against.
///
/// Read once when the task is created and never refreshed, so every signature
/// of a round is judged against the same operators, stakes and thresholds.
#[derive(Debug, Clone, Getters)]
pub struct ValidationInfo {
    reference_block: u32,
    /// Quorums in the order they were requested.
    quorum_numbers: Vec<QuorumNumber>,
    quorum_threshold_percentages: BTreeMap<QuorumNumber, QuorumThresholdPercentage>,
    operators: HashMap<OperatorId, OperatorAvsState>,
    quorums: HashMap<QuorumNumber, QuorumAvsState>,
    total_stake_per_quorum: BTreeMap<QuorumNumber, StakeAmount>,
    /// Aggregate G1 keys of `quorum_numbers`, same order.
    quorum_apks_g1: Vec<G1Point>,
}

impl ValidationInfo {
    pub async fn fetch(
        registry: &dyn RegistrySource,
        quorum_numbers: &[QuorumNumber],
        quorum_threshold_percentages: &[QuorumThresholdPercentage],
        reference_block: u32,
    ) -> RegistryResult<Self> {
        validate_thresholds(quorum_numbers, quorum_threshold_percentages)?;

        let operators = registry
            .get_operators_state_at_block(quorum_numbers, reference_block)
            .await?;
        let quorums = registry
            .get_quorums_state_at_block(quorum_numbers, reference_block)
            .await?;
        debug!(
            "ValidationInfo.fetch: block {reference_block}, {} operators, quorums {quorum_numbers:?}",
            operators.len()
        );

        Self::new(
            quorum_numbers,
            quorum_threshold_percentages,
            reference_block,
            operators,
            quorums,
        )
    }

    pub fn new(
        quorum_numbers: &[QuorumNumber],
        quorum_threshold_percentages: &[QuorumThresholdPercentage],
        reference_block: u32,
        operators: HashMap<OperatorId, OperatorAvsState>,
        quorums: HashMap<QuorumNumber, QuorumAvsState>,
    ) -> RegistryResult<Self> {
        validate_thresholds(quorum_numbers, quorum_threshold_percentages)?;

        let mut total_stake_per_quorum = BTreeMap::new();
        let mut quorum_apks_g1 = Vec::with_capacity(quorum_numbers.len());
        for quorum_number in quorum_numbers {
            let quorum = quorums
                .get(quorum_number)
                .ok_or(RegistryError::QuorumNotFound(*quorum_number, reference_block))?;
            total_stake_per_quorum.insert(*quorum_number, quorum.total_stake.clone());
            quorum_apks_g1.push(quorum.agg_pubkey_g1);
        }

        Ok(Self {
            reference_block,
            quorum_numbers: quorum_numbers.to_vec(),
            quorum_threshold_percentages: quorum_numbers
                .iter()
                .copied()
                .zip(quorum_threshold_percentages.iter().copied())
                .collect(),
            operators,
            quorums,
            total_stake_per_quorum,
            quorum_apks_g1,
        })
    }
}

fn validate_thresholds(
    quorum_numbers: &[QuorumNumber],
    quorum_threshold_percentages: &[QuorumThresholdPercentage],
) -> RegistryResult<()> {
    if quorum_numbers.is_empty() {
        return Err(RegistryError::InvalidThresholds(
            "at least one quorum is required".to_owned(),
        ));
    }
    if quorum_numbers.len() != quorum_threshold_percentages.len() {
        return Err(RegistryError::InvalidThresholds(format!(
            "{} quorums but {} threshold percentages",
            quorum_numbers.len(),
            quorum_threshold_percentages.len()
        )));
    }
    if let Some(p) = quorum_threshold_percentages.iter().find(|p| **p > 100) {
        return Err(RegistryError::InvalidThresholds(format!(
            "threshold percentage {p} is above 100"
        )));
    }
    let mut seen = quorum_numbers.to_vec();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != quorum_numbers.len() {
        return Err(RegistryError::InvalidThresholds(format!(
            "duplicate quorum numbers in {quorum_numbers:?}"
        )));
    }
    Ok(())
}
