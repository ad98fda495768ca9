//! Error types for ErgoPay operations

use thiserror::Error;
use wallet_core::TransportError;

#[derive(Debug, Clone, Error)]
pub enum ErgoPayError {
    #[error("Not an ErgoPay request: {0}")]
    NotErgoPay(String),

    #[error("Invalid ErgoPay payload: {0}")]
    InvalidPayload(String),

    #[error("Malformed ErgoPay response: {0}")]
    MalformedResponse(String),

    #[error("This request needs a wallet address")]
    AddressRequired,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ErgoPayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotErgoPay(_) => "not_ergopay",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::MalformedResponse(_) => "malformed_response",
            Self::AddressRequired => "address_required",
            Self::Transport(e) => e.error_code(),
        }
    }

    /// Whether fetching again might succeed
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
