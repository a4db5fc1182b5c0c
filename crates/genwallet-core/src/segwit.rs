//! Segwit (P2WPKH) key derivation and Bitcoin message signing
//!
//! The Segwit capability consumes the same root node as the Taproot deriver.
//! It must be deterministic in `(root, message)` and produce a signature
//! over the message that verifies against the returned address using the
//! standard Bitcoin message-signing scheme.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::{Address, CompressedPublicKey, Network, PrivateKey};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::KeyError;
use crate::keys::KeyNode;

/// BIP-84 derivation path for the Segwit key
pub const SEGWIT_PATH: &str = "m/84'/0'/0'/0/0";

/// Prefix prepended (with the varint length of the message) before hashing
pub const MESSAGE_PREFIX: &str = "\x18Bitcoin Signed Message:\n";

/// Result of the Segwit capability.
#[derive(Clone, Serialize)]
pub struct SegwitResult {
    pub address: String,
    /// Base64 65-byte compact recoverable signature
    pub signature: String,
    pub message: String,
    pub message_prefix: String,
    /// WIF-encoded private key of the Segwit node
    #[serde(skip)]
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for SegwitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegwitResult")
            .field("address", &self.address)
            .field("message", &self.message)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Segwit key derivation + message signing capability.
pub trait SegwitSigner {
    fn sign_segwit_root(&self, root: &KeyNode, message: &str) -> Result<SegwitResult, KeyError>;
}

/// Default capability: BIP-84 P2WPKH key signing with the Bitcoin message scheme.
#[derive(Debug, Clone)]
pub struct Bip84SegwitSigner {
    network: Network,
    path: String,
}

impl Bip84SegwitSigner {
    pub fn new(network: Network) -> Self {
        Self::with_path(network, SEGWIT_PATH)
    }

    pub fn with_path(network: Network, path: &str) -> Self {
        Self {
            network,
            path: path.to_string(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

impl Default for Bip84SegwitSigner {
    fn default() -> Self {
        Self::new(Network::Bitcoin)
    }
}

impl SegwitSigner for Bip84SegwitSigner {
    fn sign_segwit_root(
        &self,
        root: &KeyNode,
        message: &str,
    ) -> Result<SegwitResult, KeyError> {
        let node = root.derive_path(&self.path)?;

        let compressed = CompressedPublicKey(node.public_key());
        let address = Address::p2wpkh(&compressed, self.network);
        let signature = sign_message(node.secret_key(), message);
        let private_key = PrivateKey::new(*node.secret_key(), self.network).to_wif();

        log::debug!("derived segwit address {} at {} ({})", address, self.path, self.network);

        Ok(SegwitResult {
            address: address.to_string(),
            signature,
            message: message.to_string(),
            message_prefix: MESSAGE_PREFIX.to_string(),
            private_key: Zeroizing::new(private_key),
        })
    }
}

/// Sign a message with the Bitcoin message-signing scheme.
///
/// Returns the base64 encoding of the 65-byte compact signature
/// (header byte for a compressed key, then `r || s`).
pub fn sign_message(secret_key: &SecretKey, message: &str) -> String {
    let secp = Secp256k1::signing_only();
    let msg_hash = signed_msg_hash(message);
    let digest = Message::from_digest(msg_hash.to_byte_array());
    let signature = secp.sign_ecdsa_recoverable(&digest, secret_key);
    let signature = MessageSignature::new(signature, true);
    BASE64.encode(signature.serialize())
}

/// Verify a base64 message signature against an address.
///
/// The public key is recovered from the signature and checked against the
/// address (P2WPKH, P2PKH or P2SH-P2WPKH).
pub fn verify_message_signature(
    address: &str,
    message: &str,
    signature: &str,
) -> Result<bool, KeyError> {
    let address = Address::<NetworkUnchecked>::from_str(address)
        .map_err(|e| KeyError::InvalidInput(format!("address: {}", e)))?
        .assume_checked();

    let raw = BASE64
        .decode(signature)
        .map_err(|e| KeyError::InvalidInput(format!("signature base64: {}", e)))?;
    let signature = MessageSignature::from_slice(&raw)
        .map_err(|e| KeyError::InvalidInput(format!("signature: {}", e)))?;

    let secp = Secp256k1::verification_only();
    let recovered = match signature.recover_pubkey(&secp, signed_msg_hash(message)) {
        Ok(pk) => pk,
        Err(_) => return Ok(false),
    };
    Ok(address.is_related_to_pubkey(&recovered))
}
