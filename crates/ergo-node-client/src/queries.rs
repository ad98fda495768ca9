//! Box lookups and conversions into workflow types

use ergo_lib::ergotree_ir::chain::ergo_box::ErgoBox;
use ergo_lib::ergotree_ir::chain::token::Token;
use wallet_core::{BoxId, Network, NodeError, PreviewBox, TokenAmount, TokenId};

use crate::{tree_to_address, NodeClient, Result};

/// Get an unspent box by its ID, mempool included
pub async fn get_box_by_id(client: &NodeClient, box_id: &BoxId) -> Result<ErgoBox> {
    crate::timed_request(client.inner().box_from_id_with_pool(box_id.as_str()))
        .await
        .map_err(|e| match e {
            NodeError::ApiError { message }
                if message.contains("not found") || message.contains("404") =>
            {
                NodeError::BoxNotFound {
                    box_id: box_id.to_string(),
                }
            }
            other => other,
        })
}

pub(crate) fn token_amounts<'a>(tokens: impl Iterator<Item = &'a Token>) -> Vec<TokenAmount> {
    tokens
        .map(|t| {
            let tid: String = t.token_id.into();
            TokenAmount::new(TokenId::new(tid), *t.amount.as_u64())
        })
        .collect()
}

/// Preview entry for a resolved box
pub fn preview_box(ergo_box: &ErgoBox, network: Network) -> PreviewBox {
    PreviewBox {
        box_id: Some(BoxId::new(ergo_box.box_id().to_string())),
        address: tree_to_address(&ergo_box.ergo_tree, network).map(wallet_core::Address::new),
        value: Some(*ergo_box.value.as_u64()),
        tokens: ergo_box
            .tokens
            .as_ref()
            .map(|tokens| token_amounts(tokens.iter()))
            .unwrap_or_default(),
    }
}
