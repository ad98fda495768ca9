//! Wallet data consumed by the signing workflows

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Address;

/// An address derived from the wallet's master key (EIP-3 index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAddress {
    pub derivation_index: u32,
    pub address: Address,
}

/// A wallet as seen by the workflows: identity plus its derived addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub id: i64,
    pub name: String,
    pub addresses: Vec<DerivedAddress>,
    /// Watch-only wallet: no secret on this device, signing happens elsewhere
    #[serde(default)]
    pub read_only: bool,
}

impl WalletInfo {
    /// Derivation indices sorted ascending, first address first
    pub fn derivation_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .addresses
            .iter()
            .map(|a| a.derivation_index)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn address_for_index(&self, index: u32) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.derivation_index == index)
            .map(|a| &a.address)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.address.as_str() == address)
    }

    /// Address at the lowest derivation index
    pub fn first_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .min_by_key(|a| a.derivation_index)
            .map(|a| &a.address)
    }
}

/// Decrypted signing material. Zeroized on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret {
    mnemonic: String,
    passphrase: String,
}

impl SigningSecret {
    pub fn new(mnemonic: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}
