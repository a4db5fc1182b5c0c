//! Full derivation flow
//!
//! 1. Ask the signer to sign [`TAPROOT_MESSAGE`] (the first signature).
//! 2. `seed = Keccak256(signature)`, `root = KeyNode::from_seed(seed)`.
//! 3. Derive the Taproot key and the Segwit result from the same root.
//! 4. If both addresses exist, ask the signer to sign the confirmation
//!    message; otherwise the confirmation signature is empty.
//!
//! The flow is stateless. Session effects come back as [`SessionEvent`]s,
//! both on success and on failure. On a signer rejection the account-switch
//! check runs and may add [`SessionEvent::ForceReauth`]; the error itself is
//! returned unchanged.

use bitcoin::Network;
use genwallet_core::{
    derive_seed_from_hex, derive_taproot_at, Bip84SegwitSigner, KeyError, KeyNode, SegwitSigner,
    TaprootKey,
};
use serde::Serialize;
use thiserror::Error;

use crate::classifier::{is_account_switch_error, ErrorClassifier, RpcErrorClassifier};
use crate::config::{IdentityConfig, PersistPolicy};
use crate::confirmation::{build_confirmation_message, request_confirmation_signature};
use crate::session::SessionEvent;
use crate::signer::{sign_text, ExternalSigner, SignerError};

/// Message signed by the wallet to produce the key-derivation signature
pub const TAPROOT_MESSAGE: &str = "Sign this message to generate your Bitcoin Taproot key. This key will be used for your generative.xyz transactions.";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("Signer rejected request: {0}")]
    SignerRejected(#[from] SignerError),
}

/// A failed flow: the unchanged error plus the session events to apply.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct FlowFailure {
    #[source]
    pub error: IdentityError,
    pub events: Vec<SessionEvent>,
}

impl FlowFailure {
    /// Whether the caller should drop the session and re-authenticate.
    pub fn requires_reauth(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, SessionEvent::ForceReauth { .. }))
    }
}

/// Output of the Taproot-only flow. Holds private key material; callers
/// should keep only the address.
#[derive(Debug, Clone)]
pub struct TaprootKeyOutcome {
    pub root: KeyNode,
    pub taproot: TaprootKey,
    /// First wallet signature (hex)
    pub signature: String,
    pub events: Vec<SessionEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaprootIdentity {
    pub address: String,
    /// Hex x-only internal key
    pub internal_key: String,
    /// Message the wallet signed to seed the key tree
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegwitIdentity {
    pub address: String,
    /// Bitcoin message signature over the nonce message
    pub signature: String,
    pub message: String,
    pub message_prefix: String,
}

/// Public result of the full flow.
///
/// Contains no seed, no private key and not the key-derivation signature,
/// which is equivalent to the seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitcoinIdentity {
    pub account: String,
    pub taproot: TaprootIdentity,
    pub segwit: SegwitIdentity,
    /// Wallet signature over the confirmation message, empty if skipped
    pub confirmation_signature: String,
    #[serde(skip)]
    pub events: Vec<SessionEvent>,
}

/// Runs the derivation flow against an external signer.
pub struct IdentityDeriver<S, W = Bip84SegwitSigner, C = RpcErrorClassifier> {
    signer: S,
    segwit: W,
    classifier: C,
    config: IdentityConfig,
    network: Network,
}

impl<S: ExternalSigner> IdentityDeriver<S> {
    /// Deriver with the BIP-84 Segwit capability and JSON-RPC error codes.
    ///
    /// Fails if `config` does not pass [`IdentityConfig::validate`].
    pub fn new(signer: S, config: IdentityConfig) -> anyhow::Result<Self> {
        let segwit = Bip84SegwitSigner::with_path(config.network()?, &config.segwit_path);
        Self::with_parts(signer, segwit, RpcErrorClassifier, config)
    }
}

impl<S, W, C> IdentityDeriver<S, W, C>
where
    S: ExternalSigner,
    W: SegwitSigner,
    C: ErrorClassifier,
{
    pub fn with_parts(
        signer: S,
        segwit: W,
        classifier: C,
        config: IdentityConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let network = config.network()?;
        Ok(Self {
            signer,
            segwit,
            classifier,
            config,
            network,
        })
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Ask the wallet for the key-derivation signature.
    pub fn request_key_signature(&self, account: &str) -> Result<String, IdentityError> {
        log::debug!("requesting key signature from {}", account);
        Ok(sign_text(&self.signer, TAPROOT_MESSAGE, account)?)
    }

    /// Request the first signature and derive the Taproot key from it.
    ///
    /// On success the outcome always carries a `TaprootAddressDerived` event,
    /// whatever the configured [`PersistPolicy`]. Callers running the full
    /// flow under `OnComplete` should use
    /// [`generate_bitcoin_key`](Self::generate_bitcoin_key) instead.
    pub fn generate_taproot_key(&self, account: &str) -> Result<TaprootKeyOutcome, FlowFailure> {
        let outcome = self.request_key_signature(account).and_then(|signature| {
            let (root, taproot) = self.derive_root_and_taproot(&signature)?;
            Ok((root, taproot, signature))
        });

        match outcome {
            Ok((root, taproot, signature)) => {
                let events = vec![taproot_event(account, &taproot)];
                Ok(TaprootKeyOutcome {
                    root,
                    taproot,
                    signature,
                    events,
                })
            }
            Err(error) => Err(self.fail(error, account, Vec::new())),
        }
    }

    /// Request the first signature, then run [`derive_bitcoin_identity`](Self::derive_bitcoin_identity).
    pub fn generate_bitcoin_key(
        &self,
        account: &str,
        nonce_message: &str,
    ) -> Result<BitcoinIdentity, FlowFailure> {
        let signature = self
            .request_key_signature(account)
            .map_err(|error| self.fail(error, account, Vec::new()))?;
        self.derive_bitcoin_identity(account, &signature, nonce_message)
    }

    /// Derive both addresses from a first signature and obtain the
    /// confirmation signature.
    pub fn derive_bitcoin_identity(
        &self,
        account: &str,
        first_signature: &str,
        nonce_message: &str,
    ) -> Result<BitcoinIdentity, FlowFailure> {
        let mut events = Vec::new();
        match self.build_identity(account, first_signature, nonce_message, &mut events) {
            Ok(mut identity) => {
                if self.config.persist_policy == PersistPolicy::OnComplete {
                    events.push(SessionEvent::TaprootAddressDerived {
                        account: account.to_string(),
                        taproot_address: identity.taproot.address.clone(),
                    });
                }
                identity.events = events;
                Ok(identity)
            }
            Err(error) => Err(self.fail(error, account, events)),
        }
    }

    /// Sign the confirmation message, or return an empty signature when
    /// either address is missing.
    pub fn sign_confirmation(
        &self,
        account: &str,
        taproot_address: &str,
        segwit_address: &str,
        nonce_message: &str,
    ) -> Result<String, IdentityError> {
        if taproot_address.is_empty() || segwit_address.is_empty() {
            log::warn!("skipping confirmation signature: derived address missing");
            return Ok(String::new());
        }
        let message = build_confirmation_message(taproot_address, segwit_address, nonce_message);
        Ok(request_confirmation_signature(&self.signer, &message, account)?)
    }

    fn derive_root_and_taproot(&self, signature: &str) -> Result<(KeyNode, TaprootKey), IdentityError> {
        let seed = derive_seed_from_hex(signature)?;
        let root = KeyNode::from_seed(&seed)?;
        let taproot = derive_taproot_at(&root, &self.config.taproot_path, self.network)?;
        Ok((root, taproot))
    }

    fn build_identity(
        &self,
        account: &str,
        first_signature: &str,
        nonce_message: &str,
        events: &mut Vec<SessionEvent>,
    ) -> Result<BitcoinIdentity, IdentityError> {
        let (root, taproot) = self.derive_root_and_taproot(first_signature)?;
        if self.config.persist_policy == PersistPolicy::OnTaproot {
            events.push(taproot_event(account, &taproot));
        }

        let segwit = self.segwit.sign_segwit_root(&root, nonce_message)?;
        let taproot_address = taproot.address.to_string();

        let confirmation_signature =
            self.sign_confirmation(account, &taproot_address, &segwit.address, nonce_message)?;

        Ok(BitcoinIdentity {
            account: account.to_string(),
            taproot: TaprootIdentity {
                address: taproot_address,
                internal_key: taproot.x_only_pubkey.to_string(),
                message: TAPROOT_MESSAGE.to_string(),
            },
            segwit: SegwitIdentity {
                address: segwit.address.clone(),
                signature: segwit.signature.clone(),
                message: segwit.message.clone(),
                message_prefix: segwit.message_prefix.clone(),
            },
            confirmation_signature,
            events: Vec::new(),
        })
    }

    fn fail(&self, error: IdentityError, account: &str, mut events: Vec<SessionEvent>) -> FlowFailure {
        if let IdentityError::SignerRejected(ref signer_error) = error {
            if is_account_switch_error(
                &self.signer,
                &self.classifier,
                signer_error,
                account,
                self.config.account_match,
            ) {
                log::info!("signer account no longer {}; forcing re-authentication", account);
                events.push(SessionEvent::ForceReauth {
                    account: account.to_string(),
                });
            }
        }
        FlowFailure { error, events }
    }
}

fn taproot_event(account: &str, taproot: &TaprootKey) -> SessionEvent {
    SessionEvent::TaprootAddressDerived {
        account: account.to_string(),
        taproot_address: taproot.address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{UNAUTHORIZED_CODE, USER_REJECTED_CODE};
    use crate::test_utils::{LocalEthSigner, ScriptedSigner};
    use genwallet_core::{derive_seed_from_hex, derive_taproot, verify_message_signature, SegwitResult};
    use zeroize::Zeroizing;

    const NONCE: &str = "nonce-5f2c";

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Segwit capability that yields no address.
    struct EmptySegwit;

    impl SegwitSigner for EmptySegwit {
        fn sign_segwit_root(&self, _root: &KeyNode, message: &str) -> Result<SegwitResult, KeyError> {
            Ok(SegwitResult {
                address: String::new(),
                signature: String::new(),
                message: message.to_string(),
                message_prefix: genwallet_core::MESSAGE_PREFIX.to_string(),
                private_key: Zeroizing::new(String::new()),
            })
        }
    }

    #[test]
    fn test_full_flow_with_local_signer() {
        init_logger();
        let signer = LocalEthSigner::from_seed_byte(1);
        let account = signer.account().to_string();
        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();

        let identity = deriver.generate_bitcoin_key(&account, NONCE).unwrap();

        assert!(identity.taproot.address.starts_with("bc1p"));
        assert!(identity.segwit.address.starts_with("bc1q"));
        assert_eq!(identity.taproot.message, TAPROOT_MESSAGE);
        assert_eq!(identity.segwit.message, NONCE);
        assert!(identity.confirmation_signature.starts_with("0x"));
        assert!(verify_message_signature(
            &identity.segwit.address,
            NONCE,
            &identity.segwit.signature
        )
        .unwrap());

        let signed = signer.signed_messages();
        assert_eq!(signed.len(), 2);
        assert_eq!(signed[0], TAPROOT_MESSAGE);
        assert_eq!(
            signed[1],
            build_confirmation_message(&identity.taproot.address, &identity.segwit.address, NONCE)
        );
    }

    #[test]
    fn test_flow_is_deterministic_per_account() {
        let signer = LocalEthSigner::from_seed_byte(2);
        let account = signer.account().to_string();
        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();

        let a = deriver.generate_bitcoin_key(&account, NONCE).unwrap();
        let b = deriver.generate_bitcoin_key(&account, NONCE).unwrap();
        assert_eq!(a.taproot.address, b.taproot.address);
        assert_eq!(a.segwit.address, b.segwit.address);
        assert_eq!(a.confirmation_signature, b.confirmation_signature);
    }

    #[test]
    fn test_taproot_matches_manual_derivation() {
        let signer = LocalEthSigner::from_seed_byte(3);
        let account = signer.account().to_string();
        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();

        let outcome = deriver.generate_taproot_key(&account).unwrap();
        let seed = derive_seed_from_hex(&outcome.signature).unwrap();
        let root = KeyNode::from_seed(&seed).unwrap();
        let manual = derive_taproot(&root, bitcoin::Network::Bitcoin).unwrap();

        assert_eq!(outcome.taproot.address, manual.address);
        assert_eq!(
            outcome.events,
            vec![SessionEvent::TaprootAddressDerived {
                account: account.clone(),
                taproot_address: manual.address.to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_segwit_address_skips_confirmation() {
        let signer = LocalEthSigner::from_seed_byte(4);
        let account = signer.account().to_string();
        let first = signer
            .personal_sign(&crate::signer::to_personal_sign_hex(TAPROOT_MESSAGE), &account)
            .unwrap();

        let deriver =
            IdentityDeriver::with_parts(&signer, EmptySegwit, RpcErrorClassifier, IdentityConfig::default())
                .unwrap();
        let identity = deriver.derive_bitcoin_identity(&account, &first, NONCE).unwrap();

        assert_eq!(identity.confirmation_signature, "");
        // Only the first signature was requested
        assert_eq!(signer.signed_messages().len(), 1);
    }

    #[test]
    fn test_result_contains_no_secrets() {
        let signer = LocalEthSigner::from_seed_byte(5);
        let account = signer.account().to_string();
        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let identity = deriver.generate_bitcoin_key(&account, NONCE).unwrap();

        // The local signer is deterministic, so this is the same first signature
        let first = signer
            .personal_sign(&crate::signer::to_personal_sign_hex(TAPROOT_MESSAGE), &account)
            .unwrap();
        let seed = derive_seed_from_hex(&first).unwrap();
        let root = KeyNode::from_seed(&seed).unwrap();
        let segwit = Bip84SegwitSigner::default().sign_segwit_root(&root, NONCE).unwrap();
        let taproot = derive_taproot(&root, bitcoin::Network::Bitcoin).unwrap();
        assert_eq!(identity.taproot.address, taproot.address.to_string());

        let json = serde_json::to_string(&identity).unwrap();
        let debug = format!("{:?}", identity);
        let secrets = vec![
            first.trim_start_matches("0x").to_string(),
            hex::encode(seed.as_bytes()),
            hex::encode(root.secret_key().secret_bytes()),
            hex::encode(taproot.node.secret_key().secret_bytes()),
            segwit.private_key.as_str().to_string(),
        ];
        for secret in &secrets {
            assert!(!json.contains(secret.as_str()));
            assert!(!debug.contains(secret.as_str()));
        }
    }

    #[test]
    fn test_persist_on_complete_emits_after_success() {
        let signer = LocalEthSigner::from_seed_byte(6);
        let account = signer.account().to_string();
        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let identity = deriver.generate_bitcoin_key(&account, NONCE).unwrap();

        assert_eq!(
            identity.events,
            vec![SessionEvent::TaprootAddressDerived {
                account,
                taproot_address: identity.taproot.address.clone(),
            }]
        );
    }

    #[test]
    fn test_confirmation_failure_with_persist_on_taproot() {
        let signer = ScriptedSigner::new(vec!["0xA".into()]);
        signer.push_signature(Ok("0x1234".into()));
        signer.push_signature(Err(SignerError::Rpc {
            code: USER_REJECTED_CODE,
            message: "User rejected the request.".into(),
        }));

        let config = IdentityConfig {
            persist_policy: PersistPolicy::OnTaproot,
            ..Default::default()
        };
        let deriver = IdentityDeriver::new(&signer, config).unwrap();
        let failure = deriver.generate_bitcoin_key("0xA", NONCE).unwrap_err();

        assert!(matches!(
            failure.error,
            IdentityError::SignerRejected(SignerError::Rpc { code: USER_REJECTED_CODE, .. })
        ));
        assert!(!failure.requires_reauth());
        assert_eq!(failure.events.len(), 1);
        assert!(matches!(
            &failure.events[0],
            SessionEvent::TaprootAddressDerived { taproot_address, .. } if taproot_address.starts_with("bc1p")
        ));
    }

    #[test]
    fn test_confirmation_failure_with_persist_on_complete() {
        let signer = ScriptedSigner::new(vec!["0xA".into()]);
        signer.push_signature(Ok("0x1234".into()));
        signer.push_signature(Err(SignerError::Transport("closed".into())));

        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let failure = deriver.generate_bitcoin_key("0xA", NONCE).unwrap_err();
        assert!(failure.events.is_empty());
    }

    #[test]
    fn test_account_switch_forces_reauth() {
        let signer = LocalEthSigner::from_seed_byte(8);
        let account = signer.account().to_string();
        signer.switch_account("0xB");

        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let failure = deriver.generate_bitcoin_key(&account, NONCE).unwrap_err();

        assert!(matches!(
            failure.error,
            IdentityError::SignerRejected(SignerError::Rpc { code: UNAUTHORIZED_CODE, .. })
        ));
        assert!(failure.requires_reauth());
        assert_eq!(failure.events, vec![SessionEvent::ForceReauth { account }]);
    }

    #[test]
    fn test_rejection_without_switch_keeps_session() {
        let signer = ScriptedSigner::new(vec!["0xA".into()]);
        signer.push_signature(Err(SignerError::Rpc {
            code: UNAUTHORIZED_CODE,
            message: "unauthorized".into(),
        }));

        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let failure = deriver.generate_taproot_key("0xA").unwrap_err();
        assert!(!failure.requires_reauth());
    }

    #[test]
    fn test_malformed_signature_is_invalid_input() {
        let signer = ScriptedSigner::new(vec!["0xB".into()]);
        signer.push_signature(Ok("0xnothex".into()));

        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let failure = deriver.generate_taproot_key("0xA").unwrap_err();
        assert!(matches!(
            failure.error,
            IdentityError::Key(KeyError::InvalidInput(_))
        ));
        // Key errors never trigger the account probe
        assert!(failure.events.is_empty());
    }

    #[test]
    fn test_empty_signer_reply_derives_nothing() {
        let signer = ScriptedSigner::new(vec!["0xA".into()]);
        signer.push_signature(Ok("0x".into()));

        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();
        let failure = deriver.generate_bitcoin_key("0xA", NONCE).unwrap_err();
        assert!(matches!(
            failure.error,
            IdentityError::SignerRejected(SignerError::InvalidResponse(_))
        ));
        assert!(failure.events.is_empty());
        // Only the key signature was requested
        assert_eq!(signer.sign_requests().len(), 1);
    }

    #[test]
    fn test_empty_caller_signature_is_invalid_input() {
        let signer = ScriptedSigner::new(vec!["0xA".into()]);
        let deriver = IdentityDeriver::new(&signer, IdentityConfig::default()).unwrap();

        for empty in ["0x", ""] {
            let failure = deriver
                .derive_bitcoin_identity("0xA", empty, NONCE)
                .unwrap_err();
            assert!(matches!(
                failure.error,
                IdentityError::Key(KeyError::InvalidInput(_))
            ));
            assert!(failure.events.is_empty());
        }
        assert!(signer.sign_requests().is_empty());
    }

    #[test]
    fn test_invalid_configured_path_rejected_at_construction() {
        let signer = ScriptedSigner::new(vec!["0xA".into()]);
        let config = IdentityConfig {
            taproot_path: "m/86'/bad".into(),
            ..Default::default()
        };
        let err = IdentityDeriver::new(&signer, config).err().unwrap();
        assert!(err.to_string().contains("taproot_path"), "{}", err);
        assert!(signer.sign_requests().is_empty());
    }

    #[test]
    fn test_unknown_network_rejected_at_construction() {
        let signer = LocalEthSigner::from_seed_byte(10);
        for name in ["Testnet", "testnet4"] {
            let config = IdentityConfig {
                network: name.into(),
                ..Default::default()
            };
            assert!(IdentityDeriver::new(&signer, config.clone()).is_err());
            assert!(IdentityDeriver::with_parts(&signer, EmptySegwit, RpcErrorClassifier, config).is_err());
        }
        // No address was derived, so nothing was signed
        assert!(signer.signed_messages().is_empty());
    }

    #[test]
    fn test_testnet_config() {
        let signer = LocalEthSigner::from_seed_byte(9);
        let account = signer.account().to_string();
        let config = IdentityConfig {
            network: "testnet".into(),
            ..Default::default()
        };
        let deriver = IdentityDeriver::new(&signer, config).unwrap();
        let identity = deriver.generate_bitcoin_key(&account, NONCE).unwrap();
        assert!(identity.taproot.address.starts_with("tb1p"));
        assert!(identity.segwit.address.starts_with("tb1q"));
    }
}
