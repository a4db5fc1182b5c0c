//! Seed derivation from an external wallet signature
//!
//! The signature is untrusted entropy: it is hashed with Keccak-256 and the
//! 32-byte digest becomes the HD seed. Nothing else feeds into the seed.

use std::fmt;

use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::KeyError;

/// Seed length in bytes (Keccak-256 digest)
pub const SEED_LEN: usize = 32;

/// A 256-bit HD seed. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Wrap raw seed bytes.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

/// Derive the seed from raw signature bytes: `Keccak256(signature)`.
pub fn derive_seed(signature: &[u8]) -> Seed {
    let digest = Keccak256::digest(signature);
    let mut bytes = [0u8; SEED_LEN];
    bytes.copy_from_slice(&digest);
    Seed(bytes)
}

/// Decode a hex-encoded signature (as returned by `personal_sign`) and derive
/// the seed from its bytes. The `0x` prefix is optional.
///
/// An empty signature (`""` or `"0x"`) is rejected: it would hash to the
/// publicly known `Keccak256("")`.
pub fn derive_seed_from_hex(signature_hex: &str) -> Result<Seed, KeyError> {
    let bytes = decode_hex(signature_hex)?;
    if bytes.is_empty() {
        return Err(KeyError::InvalidInput("signature is empty".into()));
    }
    Ok(derive_seed(&bytes))
}

/// Decode an optionally `0x`-prefixed hex string.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, KeyError> {
    let stripped = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(stripped).map_err(|e| KeyError::InvalidInput(format!("signature hex: {}", e)))
}
