//! Genwallet Identity
//!
//! Binds an Ethereum account to the Bitcoin addresses derived from its
//! signature.
//!
//! # Flow
//!
//! ```text
//! personal_sign(TAPROOT_MESSAGE) ─► seed ─► root ─┬─► Taproot (m/86'/0'/0'/0/0)
//!                                                 └─► Segwit  (m/84'/0'/0'/0/0)
//!                                                        │
//!        personal_sign(confirmation message) ◄───────────┘
//! ```
//!
//! The flow never writes to a session store itself. It returns
//! [`SessionEvent`]s that the caller applies with [`apply_events`].

pub mod classifier;
pub mod config;
pub mod confirmation;
pub mod flow;
pub mod session;
pub mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classifier::{
    is_account_switch_error, ClassifiedError, ClassifyError, ErrorClassifier, RpcErrorClassifier,
    UNAUTHORIZED_CODE, USER_REJECTED_CODE,
};
pub use config::{AccountMatch, IdentityConfig, PersistPolicy};
pub use confirmation::{build_confirmation_message, request_confirmation_signature};
pub use flow::{
    BitcoinIdentity, FlowFailure, IdentityDeriver, IdentityError, SegwitIdentity,
    TaprootIdentity, TaprootKeyOutcome, TAPROOT_MESSAGE,
};
pub use session::{apply_events, InMemorySessionStore, SessionEvent, SessionStore};
pub use signer::{sign_content, to_personal_sign_hex, ExternalSigner, SignerError};
