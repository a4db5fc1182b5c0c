//! External signer boundary
//!
//! The external signer is an Ethereum-style wallet reached over its JSON-RPC
//! surface. Only two methods are used:
//! - `personal_sign(hexMessage, account) -> signatureHex`
//! - `eth_requestAccounts() -> [account]`
//!
//! Messages are sent as `"0x" + hex(utf8 bytes)`. Each call is a blocking
//! round-trip; no timeout is imposed here.

use thiserror::Error;

/// Errors surfaced by the external signer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Provider returned a JSON-RPC error (e.g. 4001 user rejected, 4100 unauthorized)
    #[error("Signer RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Signer transport failed: {0}")]
    Transport(String),

    #[error("Invalid signer response: {0}")]
    InvalidResponse(String),
}

/// An Ethereum-style wallet able to sign messages for an account.
pub trait ExternalSigner {
    /// Sign a `0x`-hex-encoded message with `account`, returning the hex signature.
    fn personal_sign(&self, hex_message: &str, account: &str) -> Result<String, SignerError>;

    /// Currently authorized accounts, active account first.
    fn request_accounts(&self) -> Result<Vec<String>, SignerError>;
}

impl<T: ExternalSigner + ?Sized> ExternalSigner for &T {
    fn personal_sign(&self, hex_message: &str, account: &str) -> Result<String, SignerError> {
        (**self).personal_sign(hex_message, account)
    }

    fn request_accounts(&self) -> Result<Vec<String>, SignerError> {
        (**self).request_accounts()
    }
}

/// Bytes that are actually signed for a text message.
pub fn sign_content(message: &str) -> Vec<u8> {
    message.as_bytes().to_vec()
}

/// Encode a text message for `personal_sign`.
pub fn to_personal_sign_hex(message: &str) -> String {
    format!("0x{}", hex::encode(sign_content(message)))
}

/// Send a text message to the signer and return its signature.
///
/// A reply with no signature bytes (`""`, `"0x"`) is an invalid response.
pub fn sign_text<S: ExternalSigner + ?Sized>(
    signer: &S,
    message: &str,
    account: &str,
) -> Result<String, SignerError> {
    let signature = signer.personal_sign(&to_personal_sign_hex(message), account)?;
    let payload = signature
        .strip_prefix("0x")
        .or_else(|| signature.strip_prefix("0X"))
        .unwrap_or(&signature);
    if payload.is_empty() {
        return Err(SignerError::InvalidResponse("empty signature".into()));
    }
    Ok(signature)
}
