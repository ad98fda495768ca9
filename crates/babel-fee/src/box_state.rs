//! Babel fee box parsing
//!
//! A babel box holds ERG and offers it in exchange for one specific token.
//! R5 holds the price: nanoERG paid per raw unit of the token.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wallet_core::constants::MIN_BOX_VALUE_NANO;
use wallet_core::{BoxId, NanoErg, TokenAmount, TokenId};

/// Unspent box at a babel contract address, as delivered by a box source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBabelBox {
    pub box_id: BoxId,
    pub value: NanoErg,
    /// R5 as a Long, if the register holds one
    pub price_register: Option<i64>,
    pub tokens: Vec<TokenAmount>,
    /// Sigma-serialized box, needed as transaction input
    #[serde(default)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BabelBoxError {
    #[error("R5 does not hold a price")]
    MissingPrice,

    #[error("Price {0} is not positive")]
    InvalidPrice(i64),

    #[error("Box value {0} leaves nothing to buy")]
    ValueTooLow(NanoErg),

    #[error("Box holds foreign token {0}")]
    ForeignToken(TokenId),
}

/// Validated exchange offer of one babel box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BabelFeeBoxState {
    pub token_id: TokenId,
    /// nanoERG per raw token unit
    pub price_per_token: u64,
    /// ERG the box can pay out while staying above the minimum box value
    pub value_available_to_buy: NanoErg,
}

impl BabelFeeBoxState {
    pub fn parse(raw: &RawBabelBox, token_id: &TokenId) -> Result<Self, BabelBoxError> {
        let price = raw.price_register.ok_or(BabelBoxError::MissingPrice)?;
        if price <= 0 {
            return Err(BabelBoxError::InvalidPrice(price));
        }
        if raw.value <= MIN_BOX_VALUE_NANO {
            return Err(BabelBoxError::ValueTooLow(raw.value));
        }
        if let Some(foreign) = raw.tokens.iter().find(|t| &t.token_id != token_id) {
            return Err(BabelBoxError::ForeignToken(foreign.token_id.clone()));
        }

        Ok(Self {
            token_id: token_id.clone(),
            price_per_token: price as u64,
            value_available_to_buy: raw.value - MIN_BOX_VALUE_NANO,
        })
    }

    /// Tokens the box wants for `nano_erg`, rounded up
    pub fn tokens_to_sell_for(&self, nano_erg: NanoErg) -> u64 {
        nano_erg.div_ceil(self.price_per_token)
    }
}
