//! Human-readable view of a reduced transaction

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Address, BoxId, NanoErg, TokenAmount, TokenId, TxId};

/// One input or output of a previewed transaction.
///
/// Inputs whose box could not be resolved carry only their id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewBox {
    pub box_id: Option<BoxId>,
    pub address: Option<Address>,
    pub value: Option<NanoErg>,
    pub tokens: Vec<TokenAmount>,
}

impl PreviewBox {
    pub fn unresolved(box_id: BoxId) -> Self {
        Self {
            box_id: Some(box_id),
            address: None,
            value: None,
            tokens: Vec::new(),
        }
    }
}

/// Preview shown to the user before confirming a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPreview {
    pub tx_id: TxId,
    pub inputs: Vec<PreviewBox>,
    pub outputs: Vec<PreviewBox>,
    /// Sigma-serialized input boxes that were resolved while previewing
    #[serde(skip)]
    pub serialized_inputs: Vec<Vec<u8>>,
}

/// Net effect of a transaction on a set of addresses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetAmounts {
    /// Positive when ERG arrives at the wallet
    pub nano_erg: i128,
    pub tokens: BTreeMap<TokenId, i128>,
}

impl NetAmounts {
    pub fn tokens_out(&self) -> impl Iterator<Item = (&TokenId, i128)> {
        self.tokens.iter().filter(|(_, v)| **v < 0).map(|(k, v)| (k, -*v))
    }

    pub fn tokens_in(&self) -> impl Iterator<Item = (&TokenId, i128)> {
        self.tokens.iter().filter(|(_, v)| **v > 0).map(|(k, v)| (k, *v))
    }
}

impl TransactionPreview {
    /// Compute net ERG and token movements for the given own addresses.
    ///
    /// Unresolved inputs are ignored, so the result may understate outflow.
    pub fn net_amounts(&self, own_addresses: &[Address]) -> NetAmounts {
        let mut net = NetAmounts::default();
        let is_own = |b: &PreviewBox| {
            b.address
                .as_ref()
                .is_some_and(|a| own_addresses.contains(a))
        };

        for input in self.inputs.iter().filter(|b| is_own(b)) {
            net.nano_erg -= input.value.unwrap_or(0) as i128;
            for token in &input.tokens {
                *net.tokens.entry(token.token_id.clone()).or_insert(0) -= token.amount as i128;
            }
        }
        for output in self.outputs.iter().filter(|b| is_own(b)) {
            net.nano_erg += output.value.unwrap_or(0) as i128;
            for token in &output.tokens {
                *net.tokens.entry(token.token_id.clone()).or_insert(0) += token.amount as i128;
            }
        }
        net.tokens.retain(|_, v| *v != 0);
        net
    }

    /// Whether every input could be resolved to a box
    pub fn is_complete(&self) -> bool {
        self.inputs.iter().all(|i| i.value.is_some())
    }
}
