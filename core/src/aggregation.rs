use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use sffl_lib::{impl_display_using_json_pretty, G1Point, G2Point, Signature};
use std::collections::{BTreeMap, HashSet};

use crate::{
    interfaces::{CheckSignaturesIndices, OperatorAvsState, OperatorId, QuorumNumber, StakeAmount},
    registry::ValidationInfo,
};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Deserialize, Serialize)]
pub enum AggregationStatus {
    ThresholdNotReached,
    ThresholdReached,
    FullStakeThresholdMet,
}

/// Signatures collected for one digest of a message.
#[derive(Debug, Clone)]
pub struct AggregatedOperators {
    pub signers_apk_g2: G2Point,
    pub signers_agg_sig_g1: Signature,
    pub signers_total_stake_per_quorum: BTreeMap<QuorumNumber, StakeAmount>,
    pub signers_operator_ids_set: HashSet<OperatorId>,
}

impl AggregatedOperators {
    pub fn new(operator: &OperatorAvsState, pubkey_g2: G2Point, signature: Signature) -> Self {
        Self {
            signers_apk_g2: pubkey_g2,
            signers_agg_sig_g1: signature,
            signers_total_stake_per_quorum: operator.stake_per_quorum.clone(),
            signers_operator_ids_set: HashSet::from([operator.operator_id]),
        }
    }

    pub fn add(&mut self, operator: &OperatorAvsState, pubkey_g2: &G2Point, signature: &Signature) {
        self.signers_apk_g2 = self.signers_apk_g2.add(pubkey_g2);
        self.signers_agg_sig_g1 = self.signers_agg_sig_g1.add(signature);
        for (quorum_number, stake) in &operator.stake_per_quorum {
            *self
                .signers_total_stake_per_quorum
                .entry(*quorum_number)
                .or_default() += stake;
        }
        self.signers_operator_ids_set.insert(operator.operator_id);
    }

    pub fn contains(&self, operator_id: &OperatorId) -> bool {
        self.signers_operator_ids_set.contains(operator_id)
    }

    fn signed_stake(&self, quorum_number: &QuorumNumber) -> StakeAmount {
        self.signers_total_stake_per_quorum
            .get(quorum_number)
            .cloned()
            .unwrap_or_default()
    }

    /// Every quorum of the round is signed by all of its stake; a quorum
    /// nobody signed for counts as zero. A quorum with zero total stake is
    /// therefore trivially full.
    pub fn full_stake_signed(&self, info: &ValidationInfo) -> bool {
        info.quorum_numbers().iter().all(|quorum_number| {
            info.total_stake_per_quorum()
                .get(quorum_number)
                .is_some_and(|total| self.signed_stake(quorum_number) == *total)
        })
    }

    /// `signed * 100 >= total * p` for every configured threshold `p`.
    pub fn threshold_reached(&self, info: &ValidationInfo) -> bool {
        info.quorum_threshold_percentages()
            .iter()
            .all(|(quorum_number, percentage)| {
                let total = info
                    .total_stake_per_quorum()
                    .get(quorum_number)
                    .cloned()
                    .unwrap_or_default();
                self.signed_stake(quorum_number) * 100u32 >= total * u32::from(*percentage)
            })
    }

    pub fn status(&self, info: &ValidationInfo) -> AggregationStatus {
        if self.full_stake_signed(info) {
            AggregationStatus::FullStakeThresholdMet
        } else if self.threshold_reached(info) {
            AggregationStatus::ThresholdReached
        } else {
            AggregationStatus::ThresholdNotReached
        }
    }

    /// Registered operators that did not sign, ascending by the keccak of
    /// their G1 encoding (ties broken by id) as the signature checker expects.
    pub fn sorted_non_signers(&self, info: &ValidationInfo) -> Vec<(OperatorId, G1Point)> {
        let mut non_signers: Vec<_> = info
            .operators()
            .values()
            .filter(|operator| !self.contains(&operator.operator_id))
            .map(|operator| (operator.pubkey_g1.hash(), operator.operator_id, operator.pubkey_g1))
            .collect();
        non_signers.sort_unstable_by_key(|(hash, id, _)| (*hash, *id));
        non_signers
            .into_iter()
            .map(|(_, id, pubkey)| (id, pubkey))
            .collect()
    }
}

/// An aggregate signature with everything an on-chain checker needs to
/// verify it against the registry at `reference_block`.
#[derive(PartialEq, Eq, Debug, Clone, Deserialize, Serialize)]
pub struct MessageBlsAggregation {
    pub reference_block: u32,
    /// Signing digest every aggregated signature was made over.
    pub message_digest: B256,
    pub non_signers_operator_ids: Vec<OperatorId>,
    pub non_signers_pubkeys_g1: Vec<G1Point>,
    pub quorum_numbers: Vec<QuorumNumber>,
    pub quorum_apks_g1: Vec<G1Point>,
    pub signers_apk_g2: G2Point,
    pub signers_agg_sig_g1: Signature,
    #[serde(flatten)]
    pub indices: CheckSignaturesIndices,
}

impl_display_using_json_pretty!(MessageBlsAggregation);

impl MessageBlsAggregation {
    pub fn new(
        info: &ValidationInfo,
        message_digest: B256,
        aggregated: &AggregatedOperators,
        non_signers: Vec<(OperatorId, G1Point)>,
        indices: CheckSignaturesIndices,
    ) -> Self {
        let (non_signers_operator_ids, non_signers_pubkeys_g1) = non_signers.into_iter().unzip();
        Self {
            reference_block: *info.reference_block(),
            message_digest,
            non_signers_operator_ids,
            non_signers_pubkeys_g1,
            quorum_numbers: info.quorum_numbers().clone(),
            quorum_apks_g1: info.quorum_apks_g1().clone(),
            signers_apk_g2: aggregated.signers_apk_g2,
            signers_agg_sig_g1: aggregated.signers_agg_sig_g1,
            indices,
        }
    }
}
