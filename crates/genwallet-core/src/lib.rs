//! Genwallet Core
//!
//! Deterministic Bitcoin key material derived from a signature produced by an
//! external Ethereum-style wallet.
//!
//! # Key Derivation
//!
//! From a single wallet signature:
//! - Seed: Keccak-256 of the raw signature bytes (32 bytes)
//! - Root: BIP-32 master node from the seed
//! - Taproot keys via BIP-86: m/86'/0'/0'/0/0 (key-path only, Bech32m)
//! - Segwit keys via BIP-84: m/84'/0'/0'/0/0 (P2WPKH, Bech32)
//!
//! The Taproot and Segwit trees share the same root node. Nodes are immutable
//! once derived, so the root can be handed to both derivers concurrently.
//!
//! Nothing in this crate persists or logs seeds or private scalars.

pub mod error;
pub mod keys;
pub mod seed;
pub mod segwit;
pub mod taproot;

pub use error::KeyError;
pub use keys::{parse_path, KeyNode};
pub use seed::{derive_seed, derive_seed_from_hex, Seed, SEED_LEN};
pub use segwit::{
    sign_message, verify_message_signature, Bip84SegwitSigner, SegwitResult, SegwitSigner,
    MESSAGE_PREFIX, SEGWIT_PATH,
};
pub use taproot::{derive_taproot, derive_taproot_at, to_x_only, TaprootKey, TAPROOT_PATH};
