//! BN254 BLS primitives.
//!
//! Signatures live on G1 and public keys on G2, which is what the EigenLayer
//! `BLSSignatureChecker` expects. Messages are 32-byte digests mapped to G1 with
//! the same try-and-increment map the contracts use, so an aggregate produced
//! here verifies on chain unchanged.

use alloy_primitives::{keccak256, B256, U256};
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup};
use ark_ff::{BigInt, Field, PrimeField};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const G1_ENCODED_LEN: usize = 64;
pub const G2_ENCODED_LEN: usize = 128;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BlsError {
    #[error("Invalid point encoding: {0}")]
    InvalidEncoding(String),

    #[error("Coordinate exceeds the field modulus")]
    CoordinateOutOfRange,

    #[error("Point is not on the curve")]
    NotOnCurve,

    #[error("Point is not in the prime order subgroup")]
    NotInSubgroup,

    #[error("Public key is the identity point")]
    IdentityPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,
}

pub type BlsResult<T> = Result<T, BlsError>;

fn fq_from_u256(value: U256) -> BlsResult<Fq> {
    Fq::from_bigint(BigInt::new(*value.as_limbs())).ok_or(BlsError::CoordinateOutOfRange)
}

fn fq_to_u256(value: &Fq) -> U256 {
    U256::from_limbs(value.into_bigint().0)
}

fn read_word(bytes: &[u8], index: usize) -> U256 {
    U256::from_be_slice(&bytes[index * 32..(index + 1) * 32])
}

/// Maps a digest onto G1: `x = digest mod p`, incremented until `x^3 + 3` is a square.
pub fn map_to_curve(digest: &B256) -> G1Affine {
    let three = Fq::from(3u64);
    let mut x = Fq::from_be_bytes_mod_order(digest.as_slice());
    loop {
        let y2 = x.square() * x + three;
        if let Some(y) = y2.sqrt() {
            return G1Affine::new_unchecked(x, y);
        }
        x += Fq::ONE;
    }
}

/// A point on G1, encoded as `X || Y` with the identity as all zeros.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct G1Point(G1Affine);

impl G1Point {
    pub fn zero() -> Self {
        Self(G1Affine::zero())
    }

    pub fn generator() -> Self {
        Self(G1Affine::generator())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: &G1Point) -> G1Point {
        Self((self.0.into_group() + other.0).into_affine())
    }

    pub fn from_coordinates(x: U256, y: U256) -> BlsResult<Self> {
        if x.is_zero() && y.is_zero() {
            return Ok(Self::zero());
        }
        let point = G1Affine::new_unchecked(fq_from_u256(x)?, fq_from_u256(y)?);
        if !point.is_on_curve() {
            return Err(BlsError::NotOnCurve);
        }
        Ok(Self(point))
    }

    pub fn coordinates(&self) -> (U256, U256) {
        if self.0.is_zero() {
            return (U256::ZERO, U256::ZERO);
        }
        (fq_to_u256(&self.0.x), fq_to_u256(&self.0.y))
    }

    pub fn to_bytes(&self) -> [u8; G1_ENCODED_LEN] {
        let (x, y) = self.coordinates();
        let mut out = [0u8; G1_ENCODED_LEN];
        out[..32].copy_from_slice(&x.to_be_bytes::<32>());
        out[32..].copy_from_slice(&y.to_be_bytes::<32>());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> BlsResult<Self> {
        if bytes.len() != G1_ENCODED_LEN {
            return Err(BlsError::InvalidEncoding(format!(
                "expected {G1_ENCODED_LEN} bytes for a G1 point, got {}",
                bytes.len()
            )));
        }
        Self::from_coordinates(read_word(bytes, 0), read_word(bytes, 1))
    }

    /// Keccak-256 of the point encoding. Non-signers are ordered by this value
    /// and EigenLayer derives operator ids from it.
    pub fn hash(&self) -> B256 {
        keccak256(self.to_bytes())
    }
}

impl Default for G1Point {
    fn default() -> Self {
        Self::zero()
    }
}

/// A point on G2, encoded as `X.c1 || X.c0 || Y.c1 || Y.c0` (the Solidity order).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct G2Point(G2Affine);

impl G2Point {
    pub fn zero() -> Self {
        Self(G2Affine::zero())
    }

    pub fn generator() -> Self {
        Self(G2Affine::generator())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: &G2Point) -> G2Point {
        Self((self.0.into_group() + other.0).into_affine())
    }

    pub fn to_bytes(&self) -> [u8; G2_ENCODED_LEN] {
        let mut out = [0u8; G2_ENCODED_LEN];
        if self.0.is_zero() {
            return out;
        }
        let words = [self.0.x.c1, self.0.x.c0, self.0.y.c1, self.0.y.c0];
        for (i, word) in words.iter().enumerate() {
            out[i * 32..(i + 1) * 32].copy_from_slice(&fq_to_u256(word).to_be_bytes::<32>());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> BlsResult<Self> {
        if bytes.len() != G2_ENCODED_LEN {
            return Err(BlsError::InvalidEncoding(format!(
                "expected {G2_ENCODED_LEN} bytes for a G2 point, got {}",
                bytes.len()
            )));
        }
        if bytes.iter().all(|b| *b == 0) {
            return Ok(Self::zero());
        }
        let x = Fq2::new(
            fq_from_u256(read_word(bytes, 1))?,
            fq_from_u256(read_word(bytes, 0))?,
        );
        let y = Fq2::new(
            fq_from_u256(read_word(bytes, 3))?,
            fq_from_u256(read_word(bytes, 2))?,
        );
        let point = G2Affine::new_unchecked(x, y);
        if !point.is_on_curve() {
            return Err(BlsError::NotOnCurve);
        }
        Ok(Self(point))
    }
}

impl Default for G2Point {
    fn default() -> Self {
        Self::zero()
    }
}

/// A BLS signature: a point on G1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(G1Point);

impl Signature {
    pub fn zero() -> Self {
        Self(G1Point::zero())
    }

    pub fn point(&self) -> &G1Point {
        &self.0
    }

    pub fn add(&self, other: &Signature) -> Signature {
        Self(self.0.add(&other.0))
    }

    /// Checks `e(sig, g2) == e(H(digest), pubkey)`.
    ///
    /// Malformed inputs the pairing cannot be evaluated on are errors; a well
    /// formed signature that does not match yields `Ok(false)`.
    pub fn verify(&self, pubkey: &G2Point, digest: &B256) -> BlsResult<bool> {
        if pubkey.0.is_zero() {
            return Err(BlsError::IdentityPublicKey);
        }
        if !pubkey.0.is_on_curve() || !self.0 .0.is_on_curve() {
            return Err(BlsError::NotOnCurve);
        }
        if !pubkey.0.is_in_correct_subgroup_assuming_on_curve() {
            return Err(BlsError::NotInSubgroup);
        }

        let message = map_to_curve(digest);
        let lhs = Bn254::pairing(self.0 .0, G2Affine::generator());
        let rhs = Bn254::pairing(message, pubkey.0);
        Ok(lhs == rhs)
    }
}

impl From<G1Point> for Signature {
    fn from(point: G1Point) -> Self {
        Self(point)
    }
}

/// Operator key material. The aggregation core never holds one of these; it is
/// what the signing side (and the test fixtures) use to produce signatures.
#[derive(Clone)]
pub struct KeyPair {
    secret: Fr,
    pubkey_g1: G1Point,
    pubkey_g2: G2Point,
}

impl KeyPair {
    /// Builds a key pair from big-endian secret bytes, reduced modulo the group order.
    pub fn from_secret_bytes(bytes: &[u8]) -> BlsResult<Self> {
        let secret = Fr::from_be_bytes_mod_order(bytes);
        if secret == Fr::ZERO {
            return Err(BlsError::InvalidSecretKey);
        }
        Ok(Self {
            secret,
            pubkey_g1: G1Point((G1Affine::generator() * secret).into_affine()),
            pubkey_g2: G2Point((G2Affine::generator() * secret).into_affine()),
        })
    }

    pub fn pubkey_g1(&self) -> &G1Point {
        &self.pubkey_g1
    }

    pub fn pubkey_g2(&self) -> &G2Point {
        &self.pubkey_g2
    }

    pub fn sign(&self, digest: &B256) -> Signature {
        Signature(G1Point((map_to_curve(digest) * self.secret).into_affine()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("pubkey_g1", &self.pubkey_g1)
            .finish_non_exhaustive()
    }
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn deserialize_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

impl Serialize for G1Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for G1Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Serialize for G2Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for G2Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn key(seed: u8) -> KeyPair {
        KeyPair::from_secret_bytes(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = key(7);
        let digest = keccak256(b"hello");
        let sig = kp.sign(&digest);
        assert_eq!(sig.verify(kp.pubkey_g2(), &digest), Ok(true));
        assert_eq!(sig.verify(kp.pubkey_g2(), &keccak256(b"other")), Ok(false));
        assert_eq!(sig.verify(key(8).pubkey_g2(), &digest), Ok(false));
    }

    #[test]
    fn test_aggregate_signature_verifies_against_aggregate_pubkey() {
        let digest = keccak256(b"aggregate me");
        let keys: Vec<_> = (1..=4).map(key).collect();

        let (apk, sig) = keys.iter().fold(
            (G2Point::zero(), Signature::zero()),
            |(apk, sig), kp| (apk.add(kp.pubkey_g2()), sig.add(&kp.sign(&digest))),
        );
        assert_eq!(sig.verify(&apk, &digest), Ok(true));

        // Dropping one signer breaks the aggregate.
        let partial = keys[..3]
            .iter()
            .fold(Signature::zero(), |sig, kp| sig.add(&kp.sign(&digest)));
        assert_eq!(partial.verify(&apk, &digest), Ok(false));
    }

    #[test]
    fn test_identity_pubkey_is_an_error() {
        let digest = keccak256(b"x");
        let sig = key(1).sign(&digest);
        assert_eq!(
            sig.verify(&G2Point::zero(), &digest),
            Err(BlsError::IdentityPublicKey)
        );
    }

    #[test]
    fn test_zero_is_identity() {
        let p = *key(3).pubkey_g1();
        assert_eq!(p.add(&G1Point::zero()), p);
        let q = *key(3).pubkey_g2();
        assert_eq!(q.add(&G2Point::zero()), q);
        assert_eq!(G1Point::zero().to_bytes(), [0u8; 64]);
    }

    #[test]
    fn test_point_encoding_round_trip() {
        let kp = key(9);
        let g1 = G1Point::from_bytes(&kp.pubkey_g1().to_bytes()).unwrap();
        assert_eq!(&g1, kp.pubkey_g1());
        let g2 = G2Point::from_bytes(&kp.pubkey_g2().to_bytes()).unwrap();
        assert_eq!(&g2, kp.pubkey_g2());
        assert_eq!(G1Point::from_bytes(&[0u8; 64]).unwrap(), G1Point::zero());
    }

    #[test]
    fn test_generator_encoding() {
        // The BN254 G1 generator is (1, 2).
        let (x, y) = G1Point::generator().coordinates();
        assert_eq!(x, U256::from(1));
        assert_eq!(y, U256::from(2));
    }

    #[test]
    fn test_rejects_points_off_curve() {
        assert_eq!(
            G1Point::from_coordinates(U256::from(1), U256::from(3)),
            Err(BlsError::NotOnCurve)
        );
        assert!(matches!(
            G1Point::from_bytes(&[1u8; 10]),
            Err(BlsError::InvalidEncoding(_))
        ));
        assert_eq!(
            G1Point::from_coordinates(U256::MAX, U256::from(1)),
            Err(BlsError::CoordinateOutOfRange)
        );
    }

    #[test]
    fn test_map_to_curve_is_deterministic_and_on_curve() {
        let digest = keccak256(b"map me");
        let a = map_to_curve(&digest);
        assert_eq!(a, map_to_curve(&digest));
        assert!(a.is_on_curve());
    }

    #[test]
    fn test_serde_hex() {
        let kp = key(5);
        let json = serde_json::to_string(kp.pubkey_g1()).unwrap();
        assert!(json.starts_with("\"0x"));
        let back: G1Point = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, kp.pubkey_g1());

        let sig = kp.sign(&B256::ZERO);
        let json = serde_json::to_string(&sig).unwrap();
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn test_generator_hash_and_g2_word_order() {
        assert_eq!(
            G1Point::generator().hash(),
            B256::from(hex!(
                "e90b7bceb6e7df5418fb78d8ee546e97c83a08bbccc01a0644d599ccd2a7c2e0"
            ))
        );
        assert_eq!(
            G2Point::generator().to_bytes()[..32],
            hex!("198e9393920d483a7260bfb731fb5d25f1aa493335a9e71297e485b7aef312c2")
        );
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(matches!(
            KeyPair::from_secret_bytes(&[0u8; 32]),
            Err(BlsError::InvalidSecretKey)
        ));
    }
}
