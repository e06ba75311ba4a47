use num_bigint::BigUint;
use pretty_assertions::assert_eq;
use sffl_core::{
    InMemoryRegistry, OperatorAvsState, RegistryError, RegistrySnapshot, RegistrySource,
    ValidationInfo,
};
use sffl_lib::{G1Point, KeyPair};
use std::{collections::BTreeMap, io::Write};

fn operator(seed: u8, stakes: &[(u8, u32)]) -> OperatorAvsState {
    let kp = KeyPair::from_secret_bytes(&[seed; 32]).unwrap();
    OperatorAvsState {
        operator_id: kp.pubkey_g1().hash(),
        pubkey_g1: *kp.pubkey_g1(),
        pubkey_g2: Some(*kp.pubkey_g2()),
        stake_per_quorum: stakes
            .iter()
            .map(|(q, s)| (*q, BigUint::from(*s)))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn snapshot() -> RegistrySnapshot {
    RegistrySnapshot {
        block_number: 100,
        operators: vec![
            operator(1, &[(0, 10), (1, 5)]),
            operator(2, &[(0, 30)]),
            operator(3, &[(1, 7)]),
        ],
    }
}

#[tokio::test]
async fn test_fetch_validation_info() {
    let registry = InMemoryRegistry::new(snapshot());
    let info = ValidationInfo::fetch(&registry, &[0], &[67], 90).await.unwrap();

    // Operator 3 is not registered in quorum 0.
    assert_eq!(info.operators().len(), 2);
    assert_eq!(info.total_stake_per_quorum()[&0], BigUint::from(40u32));
    let apk = operator(1, &[]).pubkey_g1.add(&operator(2, &[]).pubkey_g1);
    assert_eq!(info.quorum_apks_g1(), &vec![apk]);
    // Stakes are narrowed to the requested quorums.
    let first = &info.operators()[&operator(1, &[]).operator_id];
    assert_eq!(first.stake_per_quorum.len(), 1);
}

#[tokio::test]
async fn test_unknown_quorum_and_future_block() {
    let registry = InMemoryRegistry::new(snapshot());
    assert!(matches!(
        ValidationInfo::fetch(&registry, &[0, 9], &[50, 50], 90).await,
        Err(RegistryError::QuorumNotFound(9, 90))
    ));
    assert!(matches!(
        ValidationInfo::fetch(&registry, &[0], &[50], 101).await,
        Err(RegistryError::RegistrySource(_))
    ));
}

#[tokio::test]
async fn test_check_signatures_indices_shape() {
    let registry = InMemoryRegistry::new(snapshot());
    let non_signers = [operator(1, &[]).operator_id, operator(3, &[]).operator_id];
    let indices = registry
        .get_check_signatures_indices(100, &[0, 1], &non_signers)
        .await
        .unwrap();
    assert_eq!(indices.non_signer_quorum_bitmap_indices, vec![0, 0]);
    assert_eq!(indices.quorum_apk_indices, vec![0, 0]);
    assert_eq!(indices.non_signer_stake_indices, vec![vec![0], vec![0, 0]]);

    let unknown = [G1Point::generator().hash()];
    assert!(registry
        .get_check_signatures_indices(100, &[0], &unknown)
        .await
        .is_err());
}

#[tokio::test]
async fn test_snapshot_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(&snapshot()).unwrap().as_bytes())
        .unwrap();

    let registry = InMemoryRegistry::from_file(file.path()).unwrap();
    assert_eq!(registry.block_number().await.unwrap(), 100);
    assert_eq!(registry.snapshot().await, snapshot());

    registry.set_block_number(120).await;
    registry.register_operator(operator(4, &[(0, 1)])).await;
    assert_eq!(registry.block_number().await.unwrap(), 120);
    assert_eq!(registry.snapshot().await.operators.len(), 4);
}
