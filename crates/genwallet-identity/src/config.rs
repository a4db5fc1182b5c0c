//! Identity configuration, parsed from TOML with environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use std::path::Path;

use anyhow::{Context, Result};
use bitcoin::Network;
use genwallet_core::{parse_path, SEGWIT_PATH, TAPROOT_PATH};
use serde::{Deserialize, Serialize};

/// When the derived Taproot address is handed to the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// As soon as the Taproot address exists, even if later steps fail
    OnTaproot,
    /// Only after the whole flow succeeded
    #[default]
    OnComplete,
}

/// How signer account identifiers are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountMatch {
    #[default]
    Exact,
    CaseInsensitive,
}

impl AccountMatch {
    pub fn matches(&self, a: &str, b: &str) -> bool {
        match self {
            Self::Exact => a == b,
            Self::CaseInsensitive => a.eq_ignore_ascii_case(b),
        }
    }
}

/// Derivation and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Bitcoin network: "bitcoin", "testnet", "signet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Taproot derivation path
    #[serde(default = "default_taproot_path")]
    pub taproot_path: String,

    /// Segwit derivation path
    #[serde(default = "default_segwit_path")]
    pub segwit_path: String,

    #[serde(default)]
    pub persist_policy: PersistPolicy,

    #[serde(default)]
    pub account_match: AccountMatch,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            taproot_path: default_taproot_path(),
            segwit_path: default_segwit_path(),
            persist_policy: PersistPolicy::default(),
            account_match: AccountMatch::default(),
        }
    }
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_taproot_path() -> String {
    TAPROOT_PATH.to_string()
}

fn default_segwit_path() -> String {
    SEGWIT_PATH.to_string()
}

fn parse_network(s: &str) -> Option<Network> {
    match s {
        "bitcoin" | "mainnet" => Some(Network::Bitcoin),
        "testnet" | "testnet3" => Some(Network::Testnet),
        "signet" => Some(Network::Signet),
        "regtest" => Some(Network::Regtest),
        _ => None,
    }
}

impl IdentityConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).with_context(|| "Failed to parse TOML config")
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `GENWALLET_NETWORK`
    /// - `GENWALLET_TAPROOT_PATH`
    /// - `GENWALLET_SEGWIT_PATH`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GENWALLET_NETWORK") {
            self.network = v;
        }
        if let Ok(v) = std::env::var("GENWALLET_TAPROOT_PATH") {
            self.taproot_path = v;
        }
        if let Ok(v) = std::env::var("GENWALLET_SEGWIT_PATH") {
            self.segwit_path = v;
        }
    }

    /// The configured network. Names are matched exactly, so `"Testnet"` or
    /// `"testnet4"` are errors rather than mainnet.
    pub fn network(&self) -> Result<Network> {
        parse_network(&self.network).with_context(|| {
            format!(
                "network must be one of bitcoin, testnet, signet, regtest (got {:?})",
                self.network
            )
        })
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.network()?;
        parse_path(&self.taproot_path).context("taproot_path is not a valid derivation path")?;
        parse_path(&self.segwit_path).context("segwit_path is not a valid derivation path")?;
        anyhow::ensure!(
            self.taproot_path != self.segwit_path,
            "taproot_path and segwit_path must differ"
        );
        Ok(())
    }
}
