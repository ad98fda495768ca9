//! babel-fee: Paying transaction fees with tokens
//!
//! Wallets without ERG can pay the network fee by selling a token to a
//! babel box. [`BabelFeeFinder`] looks for a suitable box among the tokens
//! the sender holds.

pub mod box_state;
pub mod finder;

pub use box_state::{BabelBoxError, BabelFeeBoxState, RawBabelBox};
pub use finder::{
    accepted_boxes, draw_price_factor, format_token_amount, rank_candidates, search_order,
    BabelBoxSource, BabelCandidate, BabelFeeError, BabelFeeFinder, BabelHint, BabelSwapData,
    HeldToken,
};
