//! Session events and the session store boundary
//!
//! The derivation flow does not touch any store. It returns events and the
//! orchestrator applies them. Only public addresses ever reach a store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Effects requested by the derivation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Persist the Taproot address for the account.
    TaprootAddressDerived {
        account: String,
        taproot_address: String,
    },
    /// The signer switched accounts: drop the session and re-authenticate.
    ForceReauth { account: String },
}

/// Where derived addresses and session state live.
pub trait SessionStore {
    fn set_user_taproot_address(&self, account: &str, taproot_address: &str);

    /// Clear access tokens and user state for `account`.
    fn reset_session(&self, account: &str);
}

/// Apply flow events to a store, in order.
pub fn apply_events<S: SessionStore + ?Sized>(store: &S, events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::TaprootAddressDerived {
                account,
                taproot_address,
            } => store.set_user_taproot_address(account, taproot_address),
            SessionEvent::ForceReauth { account } => {
                log::info!("resetting session for {} after account switch", account);
                store.reset_session(account);
            }
        }
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    addresses: Mutex<HashMap<String, String>>,
    resets: Mutex<Vec<String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taproot_address(&self, account: &str) -> Option<String> {
        lock_or_recover(&self.addresses, "addresses").get(account).cloned()
    }

    /// Accounts whose session was reset, oldest first.
    pub fn resets(&self) -> Vec<String> {
        lock_or_recover(&self.resets, "resets").clone()
    }
}

/// A panic elsewhere must not silently drop session writes: log it and keep
/// using the data.
fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("session store {} lock poisoned; recovering", name);
        poisoned.into_inner()
    })
}

impl SessionStore for InMemorySessionStore {
    fn set_user_taproot_address(&self, account: &str, taproot_address: &str) {
        lock_or_recover(&self.addresses, "addresses")
            .insert(account.to_string(), taproot_address.to_string());
    }

    fn reset_session(&self, account: &str) {
        lock_or_recover(&self.addresses, "addresses").remove(account);
        lock_or_recover(&self.resets, "resets").push(account.to_string());
    }
}
