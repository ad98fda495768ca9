//! Signing reduced transactions with mnemonic-derived keys
//!
//! Keys follow EIP-3: `m/44'/429'/0'/0/{index}` from the BIP-39 seed of the
//! mnemonic and its passphrase.

use async_trait::async_trait;
use ergo_lib::chain::transaction::reduced::ReducedTransaction;
use ergo_lib::ergotree_ir::chain::address::AddressEncoder;
use ergo_lib::ergotree_ir::serialization::SigmaSerializable;
use ergo_lib::wallet::derivation_path::{ChildIndexHardened, ChildIndexNormal, DerivationPath};
use ergo_lib::wallet::ext_secret_key::ExtSecretKey;
use ergo_lib::wallet::mnemonic::Mnemonic;
use ergo_lib::wallet::secret_key::SecretKey;
use ergo_lib::wallet::Wallet;
use wallet_core::{
    Address, DerivedAddress, Network, SigningError, SigningSecret, TransactionSigner, WalletInfo,
};

use crate::network_prefix;

const MNEMONIC_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

#[derive(Debug, Clone, Copy, Default)]
pub struct MnemonicSigner;

impl MnemonicSigner {
    pub fn new() -> Self {
        Self
    }
}

fn check_mnemonic(mnemonic: &str) -> Result<(), SigningError> {
    let words = mnemonic.split_whitespace().count();
    if MNEMONIC_WORD_COUNTS.contains(&words) {
        Ok(())
    } else {
        Err(SigningError::InvalidSecret)
    }
}

/// Secret keys at the given EIP-3 address indices
pub fn derive_secret_keys(
    secret: &SigningSecret,
    derivation_indices: &[u32],
) -> Result<Vec<SecretKey>, SigningError> {
    check_mnemonic(secret.mnemonic())?;
    let seed = Mnemonic::to_seed(secret.mnemonic(), secret.passphrase());
    let master = ExtSecretKey::derive_master(seed).map_err(|_| SigningError::InvalidSecret)?;

    derivation_indices
        .iter()
        .map(|&index| {
            let key_error = |message: String| SigningError::KeyDerivation { index, message };
            let account = ChildIndexHardened::from_31_bit(0).map_err(|e| key_error(e.to_string()))?;
            let address = ChildIndexNormal::normal(index).map_err(|e| key_error(e.to_string()))?;
            let path = DerivationPath::new(account, vec![address]);
            master
                .derive(path)
                .map(|k| k.secret_key())
                .map_err(|e| key_error(e.to_string()))
        })
        .collect()
}

/// Wallet view of a mnemonic: P2PK addresses at `derivation_indices`
pub fn derive_wallet(
    id: i64,
    name: impl Into<String>,
    secret: &SigningSecret,
    derivation_indices: &[u32],
    network: Network,
) -> Result<WalletInfo, SigningError> {
    let encoder = AddressEncoder::new(network_prefix(network));
    let keys = derive_secret_keys(secret, derivation_indices)?;
    let addresses = derivation_indices
        .iter()
        .zip(keys)
        .map(|(&index, key)| DerivedAddress {
            derivation_index: index,
            address: Address::new(encoder.address_to_str(&key.get_address_from_public_image())),
        })
        .collect();

    Ok(WalletInfo {
        id,
        name: name.into(),
        addresses,
        read_only: false,
    })
}

fn sign_blocking(
    reduced_tx: &[u8],
    secret: &SigningSecret,
    derivation_indices: &[u32],
) -> Result<Vec<u8>, SigningError> {
    let reduced = ReducedTransaction::sigma_parse_bytes(reduced_tx)
        .map_err(|e| SigningError::InvalidTransaction(e.to_string()))?;
    let keys = derive_secret_keys(secret, derivation_indices)?;

    let wallet = Wallet::from_secrets(keys);
    let signed = wallet
        .sign_reduced_transaction(reduced)
        .map_err(|e| SigningError::Failed(e.to_string()))?;
    tracing::debug!(
        tx_id = %signed.id(),
        keys = derivation_indices.len(),
        "Reduced transaction signed"
    );

    signed
        .sigma_serialize_bytes()
        .map_err(|e| SigningError::Failed(e.to_string()))
}

#[async_trait]
impl TransactionSigner for MnemonicSigner {
    async fn sign_reduced(
        &self,
        reduced_tx: &[u8],
        secret: &SigningSecret,
        derivation_indices: &[u32],
    ) -> Result<Vec<u8>, SigningError> {
        if derivation_indices.is_empty() {
            return Err(SigningError::Failed("no signing keys selected".to_string()));
        }

        // Key derivation and proving are CPU bound
        let reduced_tx = reduced_tx.to_vec();
        let secret = secret.clone();
        let indices = derivation_indices.to_vec();
        tokio::task::spawn_blocking(move || sign_blocking(&reduced_tx, &secret, &indices))
            .await
            .map_err(|e| SigningError::Failed(e.to_string()))?
    }
}
