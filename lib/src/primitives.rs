pub use alloy_primitives::{keccak256, B256, U256};

/// Returns `keccak256(a || b)`.
pub fn keccak_concat(a: &[u8], b: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(a.len() + b.len());
    buf.extend_from_slice(a);
    buf.extend_from_slice(b);
    keccak256(buf)
}

/// Returns `keccak256(abi.encode(value0, .., valueN))` for 32-byte words.
pub fn hash_values(values: &[B256]) -> B256 {
    let mut buf = Vec::with_capacity(values.len() * 32);
    for value in values {
        buf.extend_from_slice(value.as_slice());
    }
    keccak256(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_values_matches_concat() {
        let a = B256::repeat_byte(0x11);
        let b = B256::repeat_byte(0x22);
        assert_eq!(hash_values(&[a, b]), keccak_concat(a.as_slice(), b.as_slice()));
    }
}
