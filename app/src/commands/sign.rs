use std::sync::Arc;

use anyhow::{bail, Result};
use cold_signing::{ColdSigningState, ColdSigningWorkflow};
use ergo_node_client::{derive_wallet, ErgoLibPreviewer, MnemonicSigner};
use qr_transport::{ChunkPresets, QrResolution};
use wallet_core::AppConfig;

pub async fn run(config: &AppConfig, addresses: u32, resolution: QrResolution) -> Result<()> {
    if addresses == 0 {
        bail!("at least one address is needed to sign");
    }
    let secret = super::secret_from_env()?;
    let indices: Vec<u32> = (0..addresses).collect();
    let wallet = derive_wallet(0, "cold wallet", &secret, &indices, config.network)?;

    // The signing device stays offline: inputs come only from the request
    let mut workflow = ColdSigningWorkflow::new(
        wallet.clone(),
        Arc::new(MnemonicSigner::new()),
        Arc::new(ErgoLibPreviewer::offline(config.network)),
        ChunkPresets::from(&config.qr),
    );

    for line in super::stdin_lines() {
        if !workflow.add_scanned_chunk(&line).await? {
            continue;
        }
        if workflow.state() == ColdSigningState::WaitingToConfirm {
            break;
        }
        if let Some(error) = workflow.last_error() {
            bail!("request rejected: {}", error);
        }
        let progress = workflow.scan_progress();
        tracing::info!(added = progress.pages_added, expected = progress.pages_count, "Scanning");
    }

    if workflow.state() != ColdSigningState::WaitingToConfirm {
        bail!(
            "{}",
            workflow
                .last_error()
                .unwrap_or("input ended before the request was complete")
        );
    }
    if let Some(preview) = workflow.preview() {
        eprintln!("{}", super::describe_preview(preview, Some(&wallet)));
    }

    let result = workflow.confirm_signing(&secret).await?;
    if !result.success {
        bail!(
            "signing failed: {}",
            result.error_message.unwrap_or_default()
        );
    }

    if resolution != workflow.resolution() {
        workflow.toggle_resolution();
    }
    for chunk in workflow.result_chunks() {
        println!("{}", chunk);
    }
    Ok(())
}
