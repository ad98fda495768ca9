//! Transaction preview from a sigma-serialized reduced transaction
//!
//! Outputs come straight from the transaction. Inputs are looked up among
//! the boxes the caller supplied, then on the node if a client is attached.
//! Inputs found in neither place are previewed by id only.

use std::collections::HashMap;

use async_trait::async_trait;
use ergo_lib::chain::transaction::reduced::ReducedTransaction;
use ergo_lib::ergotree_ir::chain::ergo_box::{ErgoBox, ErgoBoxCandidate};
use ergo_lib::ergotree_ir::serialization::SigmaSerializable;
use wallet_core::{
    Address, BoxId, Network, PreviewBox, PreviewError, TransactionPreview, TransactionPreviewer,
    TxId,
};

use crate::queries::{get_box_by_id, preview_box, token_amounts};
use crate::{tree_to_address, NodeClient};

pub struct ErgoLibPreviewer {
    network: Network,
    client: Option<NodeClient>,
}

impl ErgoLibPreviewer {
    /// Previewer that never leaves the machine
    pub fn offline(network: Network) -> Self {
        Self {
            network,
            client: None,
        }
    }

    pub fn with_node(client: NodeClient) -> Self {
        Self {
            network: client.network(),
            client: Some(client),
        }
    }

    async fn resolve_input(&self, box_id: &BoxId) -> Option<ErgoBox> {
        let client = self.client.as_ref()?;
        match get_box_by_id(client, box_id).await {
            Ok(ergo_box) => Some(ergo_box),
            Err(e) => {
                tracing::debug!(box_id = %box_id, error = %e, "Input box not resolvable");
                None
            }
        }
    }
}

fn parse_reduced(bytes: &[u8]) -> Result<ReducedTransaction, PreviewError> {
    ReducedTransaction::sigma_parse_bytes(bytes)
        .map_err(|e| PreviewError::InvalidTransaction(e.to_string()))
}

/// Supplied boxes keyed by id; bytes that do not parse are skipped
fn supplied_boxes(input_boxes: &[Vec<u8>]) -> HashMap<String, ErgoBox> {
    input_boxes
        .iter()
        .filter_map(|bytes| match ErgoBox::sigma_parse_bytes(bytes) {
            Ok(b) => Some((b.box_id().to_string(), b)),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable input box");
                None
            }
        })
        .collect()
}

fn output_preview(candidate: &ErgoBoxCandidate, network: Network) -> PreviewBox {
    PreviewBox {
        box_id: None,
        address: tree_to_address(&candidate.ergo_tree, network).map(Address::new),
        value: Some(*candidate.value.as_u64()),
        tokens: candidate
            .tokens
            .as_ref()
            .map(|tokens| token_amounts(tokens.iter()))
            .unwrap_or_default(),
    }
}

#[async_trait]
impl TransactionPreviewer for ErgoLibPreviewer {
    async fn preview(
        &self,
        reduced_tx: &[u8],
        input_boxes: &[Vec<u8>],
    ) -> Result<TransactionPreview, PreviewError> {
        let reduced = parse_reduced(reduced_tx)?;
        let unsigned = &reduced.unsigned_tx;
        let mut supplied = supplied_boxes(input_boxes);

        let mut inputs = Vec::new();
        let mut serialized_inputs = Vec::new();
        for input in unsigned.inputs.iter() {
            let box_id = BoxId::new(input.box_id.to_string());
            let resolved = match supplied.remove(box_id.as_str()) {
                Some(b) => Some(b),
                None => self.resolve_input(&box_id).await,
            };

            match resolved {
                Some(ergo_box) => {
                    if let Ok(bytes) = ergo_box.sigma_serialize_bytes() {
                        serialized_inputs.push(bytes);
                    }
                    inputs.push(preview_box(&ergo_box, self.network));
                }
                None => inputs.push(PreviewBox::unresolved(box_id)),
            }
        }

        let outputs = unsigned
            .output_candidates
            .iter()
            .map(|c| output_preview(c, self.network))
            .collect();

        Ok(TransactionPreview {
            tx_id: TxId::new(unsigned.id().to_string()),
            inputs,
            outputs,
            serialized_inputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_garbage_is_invalid_transaction() {
        let previewer = ErgoLibPreviewer::offline(Network::Mainnet);
        let err = previewer.preview(&[1, 2, 3], &[]).await.unwrap_err();
        assert!(matches!(err, PreviewError::InvalidTransaction(_)));
    }

    #[test]
    fn test_unparseable_supplied_boxes_are_skipped() {
        assert!(supplied_boxes(&[vec![0xff, 0x00], Vec::new()]).is_empty());
    }
}
