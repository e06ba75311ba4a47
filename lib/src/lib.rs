//! Primitives shared by every SFFL crate: BN254 BLS points and signatures, the
//! signed message types with their domain-separated hashing, and the sparse
//! Merkle tree used to commit checkpoints.

pub mod bls;
pub mod hasher;
pub mod macros;
pub mod messages;
pub mod primitives;
pub mod smt;

pub use bls::{BlsError, G1Point, G2Point, KeyPair, Signature};
pub use hasher::{HashError, MessageHasher, SfflHasher};
pub use messages::{MessageKey, SfflMessage};
pub use smt::{SmtError, SmtProof, SparseMerkleTree};
