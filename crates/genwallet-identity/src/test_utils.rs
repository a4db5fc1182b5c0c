//! Signers for driving the identity flow without a browser wallet.
//!
//! - [`LocalEthSigner`]: a real EIP-191 `personal_sign` implementation over a
//!   fixed secp256k1 key, with account switching.
//! - [`ScriptedSigner`]: canned responses and errors.

use std::collections::VecDeque;
use std::sync::Mutex;

use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use crate::classifier::UNAUTHORIZED_CODE;
use crate::signer::{ExternalSigner, SignerError};

/// Keccak-256 of `"\x19Ethereum Signed Message:\n" || len(message) || message`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Lowercase `0x` Ethereum address of a public key.
pub fn eth_address(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Deterministic in-process Ethereum signer.
pub struct LocalEthSigner {
    secret_key: SecretKey,
    account: String,
    active_account: Mutex<String>,
    signed: Mutex<Vec<String>>,
}

impl LocalEthSigner {
    /// Signer whose secret key is `[0x01, 0x00, ..., 0x00, seed_byte]`.
    pub fn from_seed_byte(seed_byte: u8) -> Self {
        let mut secret_bytes = [0u8; 32];
        secret_bytes[31] = seed_byte;
        secret_bytes[0] = 0x01;
        let secret_key = SecretKey::from_slice(&secret_bytes).unwrap();
        let account = eth_address(&secret_key.public_key(&Secp256k1::signing_only()));
        Self {
            secret_key,
            active_account: Mutex::new(account.clone()),
            account,
            signed: Mutex::new(Vec::new()),
        }
    }

    /// The account this signer holds the key for.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Simulate the user selecting another account in the wallet.
    pub fn switch_account(&self, account: &str) {
        *self.active_account.lock().unwrap() = account.to_string();
    }

    /// UTF-8 messages signed so far, in order.
    pub fn signed_messages(&self) -> Vec<String> {
        self.signed.lock().unwrap().clone()
    }
}

impl ExternalSigner for LocalEthSigner {
    fn personal_sign(&self, hex_message: &str, account: &str) -> Result<String, SignerError> {
        if *self.active_account.lock().unwrap() != account || account != self.account {
            return Err(SignerError::Rpc {
                code: UNAUTHORIZED_CODE,
                message: "The requested account and/or method has not been authorized by the user."
                    .into(),
            });
        }

        let raw = hex::decode(hex_message.trim_start_matches("0x")).map_err(|e| SignerError::Rpc {
            code: -32602,
            message: format!("invalid params: {}", e),
        })?;

        let secp = Secp256k1::signing_only();
        let digest = Message::from_digest(personal_message_hash(&raw));
        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&digest, &self.secret_key)
            .serialize_compact();

        let mut signature = compact.to_vec();
        signature.push(27 + recovery_id.to_i32() as u8);

        self.signed
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&raw).into_owned());
        Ok(format!("0x{}", hex::encode(signature)))
    }

    fn request_accounts(&self) -> Result<Vec<String>, SignerError> {
        Ok(vec![self.active_account.lock().unwrap().clone()])
    }
}

/// Signer that replays scripted responses.
pub struct ScriptedSigner {
    accounts: Result<Vec<String>, SignerError>,
    signatures: Mutex<VecDeque<Result<String, SignerError>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedSigner {
    pub fn new(accounts: Vec<String>) -> Self {
        Self::with_accounts(Ok(accounts))
    }

    /// Signer whose `eth_requestAccounts` always fails.
    pub fn failing_accounts(error: SignerError) -> Self {
        Self::with_accounts(Err(error))
    }

    fn with_accounts(accounts: Result<Vec<String>, SignerError>) -> Self {
        Self {
            accounts,
            signatures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue the response for the next `personal_sign` call.
    pub fn push_signature(&self, response: Result<String, SignerError>) {
        self.signatures.lock().unwrap().push_back(response);
    }

    /// `(hex_message, account)` pairs received so far.
    pub fn sign_requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl ExternalSigner for ScriptedSigner {
    fn personal_sign(&self, hex_message: &str, account: &str) -> Result<String, SignerError> {
        self.requests
            .lock()
            .unwrap()
            .push((hex_message.to_string(), account.to_string()));
        self.signatures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SignerError::Transport("no scripted response".into())))
    }

    fn request_accounts(&self) -> Result<Vec<String>, SignerError> {
        self.accounts.clone()
    }
}
