//! Account-switch detection for signer failures
//!
//! When the signer refuses a request, the failure is treated as an account
//! switch (force re-authentication) only if:
//! 1. the signer's active account differs from the expected account, and
//! 2. the original error classifies to code 4100 (unauthorized).
//!
//! Any failure while probing the signer yields `false`: an ambiguous failure
//! must not log the user out.

use thiserror::Error;

use crate::config::AccountMatch;
use crate::signer::{ExternalSigner, SignerError};

/// EIP-1193: the requested method/account has not been authorized
pub const UNAUTHORIZED_CODE: i64 = 4100;

/// EIP-1193: the user rejected the request
pub const USER_REJECTED_CODE: i64 = 4001;

/// Structured form of a signer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub code: i64,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Unrecognized signer error: {0}")]
    Unrecognized(String),
}

/// Maps opaque signer errors to structured codes.
pub trait ErrorClassifier {
    fn classify(&self, error: &SignerError) -> Result<ClassifiedError, ClassifyError>;
}

/// Reads the JSON-RPC code carried by [`SignerError::Rpc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcErrorClassifier;

impl ErrorClassifier for RpcErrorClassifier {
    fn classify(&self, error: &SignerError) -> Result<ClassifiedError, ClassifyError> {
        match error {
            SignerError::Rpc { code, message } => Ok(ClassifiedError {
                code: *code,
                message: message.clone(),
            }),
            other => Err(ClassifyError::Unrecognized(other.to_string())),
        }
    }
}

/// Decide whether `error` was caused by the user switching accounts in the signer.
pub fn is_account_switch_error<S, C>(
    signer: &S,
    classifier: &C,
    error: &SignerError,
    expected_account: &str,
    account_match: AccountMatch,
) -> bool
where
    S: ExternalSigner + ?Sized,
    C: ErrorClassifier + ?Sized,
{
    let accounts = match signer.request_accounts() {
        Ok(accounts) => accounts,
        Err(e) => {
            log::warn!("could not query signer accounts: {}", e);
            return false;
        }
    };

    let Some(current) = accounts.first() else {
        return false;
    };
    if current.is_empty() || account_match.matches(current, expected_account) {
        return false;
    }

    match classifier.classify(error) {
        Ok(classified) => classified.code == UNAUTHORIZED_CODE,
        Err(e) => {
            log::warn!("could not classify signer error: {}", e);
            false
        }
    }
}
