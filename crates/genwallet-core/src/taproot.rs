//! Taproot key derivation (BIP-86, key-path only)
//!
//! The child at `m/86'/0'/0'/0/0` provides the internal key. The output key is
//!   Q = P + H_TapTweak(P) * G
//! with no script tree committed, encoded as a Bech32m segwit v1 address.

use bitcoin::key::{TweakedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::{Secp256k1, Verification};
use bitcoin::taproot::TapTweakHash;
use bitcoin::{Address, Network};

use crate::error::KeyError;
use crate::keys::KeyNode;

/// BIP-86 derivation path for the Taproot key
pub const TAPROOT_PATH: &str = "m/86'/0'/0'/0/0";

/// Derived Taproot key material and address.
#[derive(Debug, Clone)]
pub struct TaprootKey {
    /// The derived child node (holds the private scalar)
    pub node: KeyNode,
    /// Internal key: x-only form of the child's public key
    pub x_only_pubkey: XOnlyPublicKey,
    /// Tweaked output key committed to in the address
    pub output_key: TweakedPublicKey,
    /// Bech32m address
    pub address: Address,
}

/// Drop the parity byte of a compressed public key.
///
/// A 32-byte input is already x-only and is returned unchanged.
pub fn to_x_only(pubkey: &[u8]) -> Result<[u8; 32], KeyError> {
    let xonly = match pubkey.len() {
        32 => pubkey,
        33 => &pubkey[1..33],
        n => {
            return Err(KeyError::InvalidInput(format!(
                "public key must be 32 or 33 bytes, got {}",
                n
            )))
        }
    };
    let mut out = [0u8; 32];
    out.copy_from_slice(xonly);
    Ok(out)
}

/// Compute the key-path-only Taproot output key for an internal key.
pub fn taproot_output_key<C: Verification>(
    secp: &Secp256k1<C>,
    internal_key: XOnlyPublicKey,
) -> Result<TweakedPublicKey, KeyError> {
    let tweak = TapTweakHash::from_key_and_tweak(internal_key, None).to_scalar();
    let (output_key, _parity) = internal_key
        .add_tweak(secp, &tweak)
        .map_err(|e| KeyError::AddressEncoding(format!("taproot tweak: {}", e)))?;
    Ok(TweakedPublicKey::dangerous_assume_tweaked(output_key))
}

/// Derive the Taproot key at the standard path.
pub fn derive_taproot(root: &KeyNode, network: Network) -> Result<TaprootKey, KeyError> {
    derive_taproot_at(root, TAPROOT_PATH, network)
}

/// Derive the Taproot key at an explicit path.
pub fn derive_taproot_at(
    root: &KeyNode,
    path: &str,
    network: Network,
) -> Result<TaprootKey, KeyError> {
    let node = root.derive_path(path)?;

    let xonly_bytes = to_x_only(&node.public_key().serialize())?;
    let x_only_pubkey = XOnlyPublicKey::from_slice(&xonly_bytes)
        .map_err(|e| KeyError::AddressEncoding(format!("x-only key: {}", e)))?;

    let secp = Secp256k1::verification_only();
    let output_key = taproot_output_key(&secp, x_only_pubkey)?;
    let address = Address::p2tr_tweaked(output_key, network);

    log::debug!("derived taproot address {} at {} ({})", address, path, network);

    Ok(TaprootKey {
        node,
        x_only_pubkey,
        output_key,
        address,
    })
}
