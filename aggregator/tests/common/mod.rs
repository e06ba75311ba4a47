#![allow(dead_code)]

use async_trait::async_trait;
use num_bigint::BigUint;
use sffl_aggregator::{AggregationResponse, AggregationService};
use sffl_core::{
    CheckSignaturesIndices, InMemoryRegistry, OperatorAvsState, OperatorId, QuorumAvsState,
    QuorumNumber, RegistryError, RegistryResult, RegistrySnapshot, RegistrySource,
};
use sffl_lib::{
    hasher::HashResult, messages::StateRootUpdateMessage, primitives::B256, HashError, KeyPair,
    MessageHasher, SfflHasher, SfflMessage, Signature,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const TIME_TO_EXPIRY: Duration = Duration::from_secs(60);
pub const AGGREGATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const REGISTRY_BLOCK: u64 = 100;

#[derive(Debug, Clone)]
pub struct TestOperator {
    pub keys: KeyPair,
    pub state: OperatorAvsState,
}

impl TestOperator {
    pub fn new(seed: u8, stake: u32) -> Self {
        let keys = KeyPair::from_secret_bytes(&[seed; 32]).unwrap();
        let state = OperatorAvsState {
            operator_id: keys.pubkey_g1().hash(),
            pubkey_g1: *keys.pubkey_g1(),
            pubkey_g2: Some(*keys.pubkey_g2()),
            stake_per_quorum: BTreeMap::from([(0, BigUint::from(stake))]),
        };
        Self { keys, state }
    }

    pub fn id(&self) -> OperatorId {
        self.state.operator_id
    }

    pub fn sign(&self, message: &SfflMessage) -> Signature {
        let digest = SfflHasher::default().signing_digest(message).unwrap();
        self.keys.sign(&digest)
    }
}

pub fn registry(operators: &[&TestOperator]) -> InMemoryRegistry {
    InMemoryRegistry::new(RegistrySnapshot {
        block_number: REGISTRY_BLOCK,
        operators: operators.iter().map(|op| op.state.clone()).collect(),
    })
}

pub fn service_with(
    registry: Arc<dyn RegistrySource>,
    hasher: Arc<dyn MessageHasher>,
) -> (AggregationService, UnboundedReceiver<AggregationResponse>) {
    let service = AggregationService::new(registry, hasher);
    let responses = service.response_stream().unwrap();
    (service, responses)
}

pub fn service(operators: &[&TestOperator]) -> (AggregationService, UnboundedReceiver<AggregationResponse>) {
    service_with(Arc::new(registry(operators)), Arc::new(SfflHasher::default()))
}

pub fn state_root_update(rollup_id: u32, block_height: u64, root: u8) -> SfflMessage {
    StateRootUpdateMessage {
        rollupId: rollup_id,
        blockHeight: block_height,
        timestamp: 1_700_000_000,
        stateRoot: B256::repeat_byte(root),
    }
    .into()
}

pub async fn init(service: &AggregationService, message: &SfflMessage, threshold: u8) {
    service
        .initialize_message(
            message.key(),
            &[0],
            &[threshold],
            TIME_TO_EXPIRY,
            AGGREGATION_TIMEOUT,
            0,
        )
        .await
        .unwrap();
}

/// Delegates to an in-memory registry but cannot serve index hints.
pub struct NoIndicesRegistry(pub InMemoryRegistry);

#[async_trait]
impl RegistrySource for NoIndicesRegistry {
    async fn block_number(&self) -> RegistryResult<u64> {
        self.0.block_number().await
    }

    async fn get_operators_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block_number: u32,
    ) -> RegistryResult<HashMap<OperatorId, OperatorAvsState>> {
        self.0
            .get_operators_state_at_block(quorum_numbers, block_number)
            .await
    }

    async fn get_quorums_state_at_block(
        &self,
        quorum_numbers: &[QuorumNumber],
        block_number: u32,
    ) -> RegistryResult<HashMap<QuorumNumber, QuorumAvsState>> {
        self.0
            .get_quorums_state_at_block(quorum_numbers, block_number)
            .await
    }

    async fn get_check_signatures_indices(
        &self,
        _reference_block_number: u32,
        _quorum_numbers: &[QuorumNumber],
        _non_signer_operator_ids: &[OperatorId],
    ) -> RegistryResult<CheckSignaturesIndices> {
        Err(RegistryError::RegistrySource("rpc unavailable".to_owned()))
    }
}

/// Produces signing digests but fails every content digest.
#[derive(Debug, Default)]
pub struct NoContentDigestHasher(pub SfflHasher);

impl MessageHasher for NoContentDigestHasher {
    fn content_digest(&self, _message: &SfflMessage) -> HashResult<B256> {
        Err(HashError::Encoding("encoder unavailable".to_owned()))
    }

    fn signing_digest(&self, message: &SfflMessage) -> HashResult<B256> {
        self.0.signing_digest(message)
    }
}
