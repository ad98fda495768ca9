//! Collaborator interfaces injected into the workflows.
//!
//! Implementations backed by the Ergo SDK and node live in `ergo-node-client`;
//! tests use in-memory fakes.

use async_trait::async_trait;

use crate::{NodeError, PreviewError, SigningError, SigningSecret, TransactionPreview, TxId};

/// Signs sigma-serialized reduced transactions
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign `reduced_tx` with keys derived from `secret` at each of
    /// `derivation_indices`. Returns the serialized signed transaction.
    async fn sign_reduced(
        &self,
        reduced_tx: &[u8],
        secret: &SigningSecret,
        derivation_indices: &[u32],
    ) -> Result<Vec<u8>, SigningError>;
}

/// Builds a [`TransactionPreview`] from a reduced transaction
#[async_trait]
pub trait TransactionPreviewer: Send + Sync {
    /// `input_boxes` are sigma-serialized boxes known to the caller; an
    /// implementation may resolve the rest from elsewhere.
    async fn preview(
        &self,
        reduced_tx: &[u8],
        input_boxes: &[Vec<u8>],
    ) -> Result<TransactionPreview, PreviewError>;
}

/// Submits signed transactions to the network
#[async_trait]
pub trait TransactionBroadcaster: Send + Sync {
    async fn broadcast(&self, signed_tx: &[u8]) -> Result<TxId, NodeError>;
}
