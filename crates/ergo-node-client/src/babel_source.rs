//! Babel boxes from the node's address index
//!
//! Each token has its own babel contract: a fixed ErgoTree with the token id
//! embedded. The contract address is derived locally and its unspent boxes
//! are paged from the node.

use async_trait::async_trait;
use babel_fee::{BabelBoxSource, RawBabelBox};
use ergo_lib::ergotree_ir::chain::ergo_box::{ErgoBox, NonMandatoryRegisterId};
use ergo_lib::ergotree_ir::mir::constant::Literal;
use ergo_lib::ergotree_ir::serialization::SigmaSerializable;
use wallet_core::{BoxId, Network, NodeError, TokenId};

use crate::queries::token_amounts;
use crate::{ergo_tree_hex_to_address, NodeClient};

const TOKEN_ID_PLACEHOLDER: &str = "{tokenId}";

pub struct NodeBabelBoxSource {
    client: NodeClient,
    contract_template: String,
}

impl NodeBabelBoxSource {
    pub fn new(client: NodeClient, contract_template: impl Into<String>) -> Self {
        Self {
            client,
            contract_template: contract_template.into(),
        }
    }

    pub fn contract_address(&self, token_id: &TokenId) -> Result<String, NodeError> {
        contract_address(&self.contract_template, token_id, self.client.network())
    }
}

pub fn contract_address(
    template: &str,
    token_id: &TokenId,
    network: Network,
) -> Result<String, NodeError> {
    let tree_hex = template.replace(TOKEN_ID_PLACEHOLDER, token_id.as_str());
    ergo_tree_hex_to_address(&tree_hex, network)
}

/// R5 as a Long, `None` for a missing or differently typed register
fn price_register(ergo_box: &ErgoBox) -> Option<i64> {
    let constant = ergo_box
        .additional_registers
        .get_constant(NonMandatoryRegisterId::R5)
        .ok()??;
    match constant.v {
        Literal::Long(price) => Some(price),
        _ => None,
    }
}

pub fn raw_babel_box(ergo_box: &ErgoBox) -> Result<RawBabelBox, NodeError> {
    let bytes = ergo_box
        .sigma_serialize_bytes()
        .map_err(|e| NodeError::ParseError(e.to_string()))?;

    Ok(RawBabelBox {
        box_id: BoxId::new(ergo_box.box_id().to_string()),
        value: *ergo_box.value.as_u64(),
        price_register: price_register(ergo_box),
        tokens: ergo_box
            .tokens
            .as_ref()
            .map(|tokens| token_amounts(tokens.iter()))
            .unwrap_or_default(),
        bytes,
    })
}

#[async_trait]
impl BabelBoxSource for NodeBabelBoxSource {
    async fn babel_boxes(
        &self,
        token_id: &TokenId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawBabelBox>, NodeError> {
        let address = self.contract_address(token_id)?;
        let boxes = self
            .client
            .unspent_boxes_by_address(&address, offset, limit)
            .await?;

        let raw = boxes
            .iter()
            .filter_map(|ergo_box| match raw_babel_box(ergo_box) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    tracing::debug!(
                        box_id = %ergo_box.box_id(),
                        error = %e,
                        "Skipping unserializable babel box"
                    );
                    None
                }
            })
            .collect();
        Ok(raw)
    }
}
