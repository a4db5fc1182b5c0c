//! Confirmation message binding the Ethereum account to the derived addresses
//!
//! The message text is a wire contract: a third party rebuilds it from
//! `(taproot address, segwit address, nonce)` and checks the account's
//! signature against it, so wording, blank lines and field order must stay
//! byte-identical.

use crate::signer::{sign_text, ExternalSigner, SignerError};

/// Build the canonical confirmation message.
pub fn build_confirmation_message(taproot_address: &str, segwit_address: &str, nonce: &str) -> String {
    format!(
        "GM.\n\n\
         Please sign this message to confirm your Generative wallet addresses generated by your Ethereum address.\n\n\
         Taproot address:\n{}\n\n\
         Segwit address:\n{}\n\n\
         Nonce:\n{}\n\n\
         The Generative Core Team",
        taproot_address, segwit_address, nonce
    )
}

/// Ask the external signer to sign a confirmation message with `account`.
pub fn request_confirmation_signature<S: ExternalSigner + ?Sized>(
    signer: &S,
    message: &str,
    account: &str,
) -> Result<String, SignerError> {
    log::debug!("requesting confirmation signature from {}", account);
    sign_text(signer, message, account)
}
