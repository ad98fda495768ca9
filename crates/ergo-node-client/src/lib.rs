//! ergo-node-client: Node and SDK backed collaborators for the signing workflows
//!
//! Wraps ergo-node-interface-rust for box lookups and broadcasting, and uses
//! ergo-lib for parsing, previewing and signing reduced transactions.

pub mod babel_source;
pub mod broadcaster;
pub mod preview;
pub mod queries;
pub mod signer;

use std::sync::Arc;

use ergo_lib::chain::transaction::Transaction;
use ergo_lib::ergotree_ir::chain::address::{Address, AddressEncoder, NetworkPrefix};
use ergo_lib::ergotree_ir::chain::ergo_box::ErgoBox;
use ergo_lib::ergotree_ir::ergo_tree::ErgoTree;
use ergo_node_interface::NodeInterface;
use wallet_core::{Network, NodeConfig, NodeError, TxId};

pub use babel_source::NodeBabelBoxSource;
pub use broadcaster::NodeBroadcaster;
pub use preview::ErgoLibPreviewer;
pub use signer::{derive_wallet, MnemonicSigner};

/// Default timeout for node API calls (30 seconds).
/// Long enough for slow nodes, short enough to avoid perpetual spinners.
const NODE_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Result type for node client operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// High-level Ergo node client
#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<NodeInterface>,
    config: NodeConfig,
    network: Network,
}

impl NodeClient {
    /// Connect to the node, failing if it does not answer
    pub async fn new(config: NodeConfig, network: Network) -> Result<Self> {
        let node = NodeInterface::from_url_str(&config.api_key, &config.url)
            .await
            .map_err(|e| NodeError::Unreachable {
                url: format!("{}: {}", config.url, e),
            })?;

        if node.has_extra_index() == Some(false) {
            tracing::warn!(
                url = %config.url,
                "Node has no extraIndex, babel fee box lookups will fail"
            );
        }

        Ok(Self {
            inner: Arc::new(node),
            config,
            network,
        })
    }

    /// Create without probing (for testing or when node may be offline)
    pub fn new_without_probe(config: NodeConfig, network: Network) -> Result<Self> {
        let (host, port) = host_and_port(&config.url).ok_or_else(|| NodeError::Unreachable {
            url: config.url.clone(),
        })?;
        let node = NodeInterface::new_without_probe(&config.api_key, host, port).map_err(|e| {
            NodeError::Unreachable {
                url: format!("{}: {}", config.url, e),
            }
        })?;

        Ok(Self {
            inner: Arc::new(node),
            config,
            network,
        })
    }

    /// Get the underlying node interface (for advanced usage)
    pub fn inner(&self) -> &NodeInterface {
        &self.inner
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Get current block height
    pub async fn current_height(&self) -> Result<u64> {
        timed_request(self.inner.current_block_height()).await
    }

    /// Check if node is online
    pub async fn is_online(&self) -> bool {
        timed_request(self.inner.current_block_height())
            .await
            .is_ok()
    }

    /// Get node name from /info endpoint
    pub async fn node_name(&self) -> Option<String> {
        timed_request(self.inner.node_info())
            .await
            .ok()
            .and_then(|info| info["name"].as_str().map(|s| s.to_string()))
    }

    /// Unspent boxes at an address, one page at a time. Requires extraIndex.
    pub async fn unspent_boxes_by_address(
        &self,
        address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ErgoBox>> {
        timed_request(
            self.inner
                .unspent_boxes_by_address(&address.to_string(), offset, limit),
        )
        .await
    }

    /// Submit a signed transaction via `POST /transactions`
    pub async fn submit_transaction(&self, tx: &Transaction) -> Result<TxId> {
        let body = serde_json::to_string(tx).map_err(|e| NodeError::ParseError(e.to_string()))?;
        let response = timed_request(self.inner.send_post_req("/transactions", body)).await?;

        let status = response.status();
        let text = response.text().await.map_err(|e| NodeError::ApiError {
            message: format!("Failed to read submit response: {}", e),
        })?;

        if !status.is_success() {
            return Err(NodeError::Rejected {
                message: rejection_reason(&text),
            });
        }

        // The node answers with the id as a JSON string
        let tx_id: String = serde_json::from_str(&text)
            .map_err(|e| NodeError::ParseError(format!("{}: {}", e, text)))?;
        Ok(TxId::new(tx_id))
    }
}

/// Wrap a node API call with a timeout. Converts both timeout and API errors to NodeError.
async fn timed_request<T, E: std::fmt::Display>(
    fut: impl std::future::Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
    tokio::time::timeout(NODE_REQUEST_TIMEOUT, fut)
        .await
        .map_err(|_| NodeError::ApiError {
            message: format!(
                "Node request timed out after {}s",
                NODE_REQUEST_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| NodeError::ApiError {
            message: e.to_string(),
        })
}

/// `detail` of a node error body, or the body itself
fn rejection_reason(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["detail"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn host_and_port(url: &str) -> Option<(&str, &str)> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let authority = rest.split('/').next()?;
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host, port)),
        _ if !authority.is_empty() => Some((authority, "9053")),
        _ => None,
    }
}

pub fn network_prefix(network: Network) -> NetworkPrefix {
    match network {
        Network::Mainnet => NetworkPrefix::Mainnet,
        Network::Testnet => NetworkPrefix::Testnet,
    }
}

/// Encode the address paying to `tree`
pub fn tree_to_address(tree: &ErgoTree, network: Network) -> Option<String> {
    let address = Address::recreate_from_ergo_tree(tree).ok()?;
    Some(AddressEncoder::new(network_prefix(network)).address_to_str(&address))
}

/// Convert an ErgoTree hex to an Ergo address locally (no node API call).
pub fn ergo_tree_hex_to_address(ergo_tree_hex: &str, network: Network) -> Result<String> {
    use ergo_lib::ergotree_ir::serialization::SigmaSerializable;

    let bytes = hex::decode(ergo_tree_hex)
        .map_err(|e| NodeError::ParseError(format!("Invalid ErgoTree hex: {}", e)))?;
    let tree = ErgoTree::sigma_parse_bytes(&bytes)
        .map_err(|e| NodeError::ParseError(format!("Failed to parse ErgoTree: {}", e)))?;
    tree_to_address(&tree, network)
        .ok_or_else(|| NodeError::ParseError("ErgoTree has no address form".to_string()))
}
