//! Hierarchical deterministic key tree (BIP-32)
//!
//! Each derivation step computes
//!   I = HMAC-SHA512(key=chain_code, data)
//! where `data` is `0x00 || ser_256(k_par) || ser_32(i)` for hardened indices
//! and `ser_P(K_par) || ser_32(i)` otherwise. `I_L` is added to the parent
//! scalar mod n and `I_R` becomes the child chain code.
//!
//! Out-of-range `I_L` values and zero child scalars are reported as
//! [`KeyError::InvalidTweak`] instead of being skipped.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{ChainCode, ChildNumber, DerivationPath, Fingerprint, Xpriv};
use bitcoin::hashes::{hash160, sha512, Hash, HashEngine, Hmac, HmacEngine};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Signing};
use bitcoin::NetworkKind;

use crate::error::KeyError;
use crate::seed::Seed;

/// HMAC key for master node generation
const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// BIP-32 bounds on the master seed length
const MIN_SEED_LEN: usize = 16;
const MAX_SEED_LEN: usize = 64;

/// Parse an absolute derivation path such as `m/86'/0'/0'/0/0`.
///
/// The path must start with `m`. Each component is a decimal index below
/// 2^31, optionally suffixed with `'` (or `h`) for hardened derivation.
pub fn parse_path(path: &str) -> Result<DerivationPath, KeyError> {
    if path != "m" && !path.starts_with("m/") {
        return Err(KeyError::InvalidPath(format!(
            "{}: path must start with 'm'",
            path
        )));
    }
    if path.ends_with('/') {
        return Err(KeyError::InvalidPath(format!("{}: empty component", path)));
    }
    DerivationPath::from_str(path)
        .map_err(|e: bitcoin::bip32::Error| KeyError::InvalidPath(format!("{}: {}", path, e)))
}

/// A node in the key tree: private scalar, chain code and position.
///
/// Nodes are immutable; deriving a child never touches the parent.
#[derive(Clone)]
pub struct KeyNode {
    secret_key: SecretKey,
    public_key: PublicKey,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: ChildNumber,
    path: DerivationPath,
}

impl KeyNode {
    /// Create the root node from a 32-byte seed.
    pub fn from_seed(seed: &Seed) -> Result<Self, KeyError> {
        Self::from_seed_bytes(seed.as_bytes())
    }

    /// Create a root node from arbitrary seed bytes (16 to 64 bytes).
    pub fn from_seed_bytes(seed: &[u8]) -> Result<Self, KeyError> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(KeyError::InvalidInput(format!(
                "seed must be {}..={} bytes, got {}",
                MIN_SEED_LEN,
                MAX_SEED_LEN,
                seed.len()
            )));
        }

        let mut engine = HmacEngine::<sha512::Hash>::new(MASTER_HMAC_KEY);
        engine.input(seed);
        let hmac_result = Hmac::from_engine(engine);

        let secret_key = SecretKey::from_slice(&hmac_result[..32])
            .map_err(|_| KeyError::InvalidTweak("master scalar is zero or out of range".into()))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&hmac_result[32..]);

        let secp = Secp256k1::signing_only();
        Ok(Self {
            secret_key,
            public_key: secret_key.public_key(&secp),
            chain_code,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: ChildNumber::Normal { index: 0 },
            path: DerivationPath::master(),
        })
    }

    /// Derive the node at an absolute path (`m/...`).
    ///
    /// Absolute paths can only be applied to the root node.
    pub fn derive_path(&self, path: &str) -> Result<Self, KeyError> {
        let parsed = parse_path(path)?;
        if self.depth != 0 {
            return Err(KeyError::InvalidPath(format!(
                "{}: absolute path applied to non-root node at {}",
                path, self.path
            )));
        }

        let secp = Secp256k1::signing_only();
        let mut node = self.clone();
        for child in &parsed {
            node = node.derive_child(&secp, *child)?;
        }

        log::debug!("derived key node at {}", node.path);
        Ok(node)
    }

    /// Derive a single child node.
    pub fn derive_child<C: Signing>(
        &self,
        secp: &Secp256k1<C>,
        child: ChildNumber,
    ) -> Result<Self, KeyError> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| KeyError::InvalidPath("maximum depth exceeded".into()))?;

        let mut engine = HmacEngine::<sha512::Hash>::new(&self.chain_code);
        match child {
            ChildNumber::Hardened { .. } => {
                engine.input(&[0u8]);
                engine.input(&self.secret_key.secret_bytes());
            }
            ChildNumber::Normal { .. } => {
                engine.input(&self.public_key.serialize());
            }
        }
        engine.input(&u32::from(child).to_be_bytes());
        let hmac_result = Hmac::from_engine(engine);

        let tweak = Scalar::from_be_bytes({
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&hmac_result[..32]);
            arr
        })
        .map_err(|_| KeyError::InvalidTweak(format!("I_L out of range at index {}", child)))?;

        let secret_key = self
            .secret_key
            .add_tweak(&tweak)
            .map_err(|_| KeyError::InvalidTweak(format!("zero child scalar at index {}", child)))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&hmac_result[32..]);

        Ok(Self {
            secret_key,
            public_key: secret_key.public_key(secp),
            chain_code,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: child,
            path: self.path.child(child),
        })
    }

    /// The private scalar.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// The compressed public point.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Path from the root to this node.
    pub fn path(&self) -> &DerivationPath {
        &self.path
    }

    /// First four bytes of HASH160 of the public key.
    pub fn fingerprint(&self) -> [u8; 4] {
        let hash = hash160::Hash::hash(&self.public_key.serialize());
        let mut fp = [0u8; 4];
        fp.copy_from_slice(&hash[..4]);
        fp
    }

    /// Export as a `bitcoin` extended private key.
    pub fn to_xpriv(&self, network: impl Into<NetworkKind>) -> Xpriv {
        Xpriv {
            network: network.into(),
            depth: self.depth,
            parent_fingerprint: Fingerprint::from(self.parent_fingerprint),
            child_number: self.child_number,
            private_key: self.secret_key,
            chain_code: ChainCode::from(self.chain_code),
        }
    }
}

impl fmt::Debug for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyNode")
            .field("path", &self.path.to_string())
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
