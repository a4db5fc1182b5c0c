//! Error taxonomy for key derivation

use thiserror::Error;

/// Errors raised while turning a wallet signature into Bitcoin key material.
///
/// All variants are fatal to the current derivation and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Invalid tweak: {0}")]
    InvalidTweak(String),
    #[error("Address encoding failed: {0}")]
    AddressEncoding(String),
}
