//! Broadcasting signed transactions through the node

use async_trait::async_trait;
use ergo_lib::chain::transaction::Transaction;
use ergo_lib::ergotree_ir::serialization::SigmaSerializable;
use wallet_core::{NodeError, TransactionBroadcaster, TxId};

use crate::NodeClient;

pub struct NodeBroadcaster {
    client: NodeClient,
}

impl NodeBroadcaster {
    pub fn new(client: NodeClient) -> Self {
        Self { client }
    }
}

pub fn parse_signed_tx(signed_tx: &[u8]) -> Result<Transaction, NodeError> {
    Transaction::sigma_parse_bytes(signed_tx)
        .map_err(|e| NodeError::ParseError(format!("Invalid signed transaction: {}", e)))
}

#[async_trait]
impl TransactionBroadcaster for NodeBroadcaster {
    async fn broadcast(&self, signed_tx: &[u8]) -> Result<TxId, NodeError> {
        let tx = parse_signed_tx(signed_tx)?;
        let tx_id = self.client.submit_transaction(&tx).await?;
        tracing::info!(tx_id = %tx_id, url = %self.client.config().url, "Transaction broadcast");
        Ok(tx_id)
    }
}
