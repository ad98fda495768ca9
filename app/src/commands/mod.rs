//! Subcommand implementations

pub mod babel;
pub mod chunk;
pub mod collect;
pub mod ergopay;
pub mod sign;

use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ergo_node_client::{ErgoLibPreviewer, NodeClient};
use wallet_core::{AppConfig, PreviewBox, SigningSecret, TransactionPreview, WalletInfo};

const MNEMONIC_VAR: &str = "ERGO_SIGNER_MNEMONIC";
const PASSPHRASE_VAR: &str = "ERGO_SIGNER_PASSPHRASE";

/// File contents as bytes; text files holding hex are decoded
pub fn read_tx_bytes(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(decode_maybe_hex(raw))
}

fn decode_maybe_hex(raw: Vec<u8>) -> Vec<u8> {
    match std::str::from_utf8(&raw).ok().map(str::trim) {
        Some(text) if !text.is_empty() => hex::decode(text).unwrap_or(raw),
        _ => raw,
    }
}

/// Non-empty trimmed lines of stdin
pub fn stdin_lines() -> impl Iterator<Item = String> {
    std::io::stdin()
        .lock()
        .lines()
        .map_while(|line| line.ok())
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}

pub fn secret_from_env() -> Result<SigningSecret> {
    let mnemonic = std::env::var(MNEMONIC_VAR)
        .with_context(|| format!("{} is not set", MNEMONIC_VAR))?;
    if mnemonic.trim().is_empty() {
        bail!("{} is empty", MNEMONIC_VAR);
    }
    let passphrase = std::env::var(PASSPHRASE_VAR).unwrap_or_default();
    Ok(SigningSecret::new(mnemonic.trim(), passphrase))
}

/// Previewer backed by the configured node, offline if it cannot be reached
pub async fn previewer(config: &AppConfig) -> ErgoLibPreviewer {
    match NodeClient::new(config.node.clone(), config.network).await {
        Ok(client) => ErgoLibPreviewer::with_node(client),
        Err(e) => {
            tracing::warn!(error = %e, "Node unavailable, inputs will not be resolved");
            ErgoLibPreviewer::offline(config.network)
        }
    }
}

fn describe_box(b: &PreviewBox) -> String {
    let address = b.address.as_ref().map_or("?", |a| a.as_str());
    let value = b.value.map_or("?".to_string(), |v| v.to_string());
    let mut line = format!("  {} {} nanoERG", address, value);
    for token in &b.tokens {
        line.push_str(&format!(" + {} {}", token.amount, token.token_id.short()));
    }
    line
}

/// Human-readable preview, with net amounts when the wallet is known
pub fn describe_preview(preview: &TransactionPreview, wallet: Option<&WalletInfo>) -> String {
    let mut out = vec![format!("Transaction {}", preview.tx_id)];
    out.push("Inputs:".to_string());
    out.extend(preview.inputs.iter().map(describe_box));
    out.push("Outputs:".to_string());
    out.extend(preview.outputs.iter().map(describe_box));

    if let Some(wallet) = wallet {
        let own: Vec<_> = wallet.addresses.iter().map(|a| a.address.clone()).collect();
        let net = preview.net_amounts(&own);
        out.push(format!("Net for {}: {} nanoERG", wallet.name, net.nano_erg));
        for (token_id, amount) in net.tokens_out() {
            out.push(format!("  sends {} {}", amount, token_id.short()));
        }
        for (token_id, amount) in net.tokens_in() {
            out.push(format!("  receives {} {}", amount, token_id.short()));
        }
        if !preview.is_complete() {
            out.push("  (some inputs unresolved, outflow may be understated)".to_string());
        }
    }
    out.join("\n")
}
