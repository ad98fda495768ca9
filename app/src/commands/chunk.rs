use std::path::Path;

use anyhow::{bail, Result};
use cold_signing::{
    request_to_chunks, response_to_chunks, ColdSigningRequest, ColdSigningResponse, PayloadError,
};
use qr_transport::{ChunkPresets, QrResolution};
use wallet_core::AppConfig;

use crate::PayloadKind;

pub fn chunks_for(
    bytes: Vec<u8>,
    kind: PayloadKind,
    sender: Option<String>,
    presets: &ChunkPresets,
    resolution: QrResolution,
) -> Result<Vec<String>, PayloadError> {
    match kind {
        PayloadKind::Request => {
            let request = ColdSigningRequest {
                reduced_tx: bytes,
                sender,
                inputs: Vec::new(),
            };
            request_to_chunks(&request, presets, resolution)
        }
        PayloadKind::Response => {
            let response = ColdSigningResponse { signed_tx: bytes };
            response_to_chunks(&response, presets, resolution)
        }
    }
}

pub fn run(
    config: &AppConfig,
    kind: PayloadKind,
    resolution: QrResolution,
    sender: Option<String>,
    input: &Path,
) -> Result<()> {
    let bytes = super::read_tx_bytes(input)?;
    if bytes.is_empty() {
        bail!("{} is empty", input.display());
    }

    let presets = ChunkPresets::from(&config.qr);
    let chunks = chunks_for(bytes, kind, sender, &presets, resolution)?;
    tracing::info!(pages = chunks.len(), ?resolution, "Payload chunked");
    for chunk in chunks {
        println!("{}", chunk);
    }
    Ok(())
}
