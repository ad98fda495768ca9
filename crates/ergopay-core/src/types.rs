//! ErgoPay protocol types (EIP-20)

use cold_signing::decode_base64;
use serde::{Deserialize, Serialize};

use crate::error::ErgoPayError;

/// Message severity for ErgoPay responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSeverity {
    #[default]
    None,
    Information,
    Warning,
    Error,
}

/// ErgoPay signing request as served by a dApp
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErgoPayResponse {
    /// Base64 URL-encoded reduced transaction bytes (null for message-only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_tx: Option<String>,

    /// Human-readable message to display in wallet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_severity: Option<MessageSeverity>,

    /// Expected signer address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// URL for wallet to POST the result after submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Decoded signing request. Carries a transaction, a message, or both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErgoPaySigningRequest {
    pub reduced_tx: Option<Vec<u8>>,
    pub p2pk_address: Option<String>,
    pub message: Option<String>,
    pub message_severity: MessageSeverity,
    pub reply_to_url: Option<String>,
}

impl ErgoPaySigningRequest {
    /// Request embedded in a static `ergopay:` URI
    pub fn from_reduced_tx(reduced_tx: Vec<u8>) -> Self {
        Self {
            reduced_tx: Some(reduced_tx),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ErgoPayError> {
        let response: ErgoPayResponse = serde_json::from_str(json)
            .map_err(|e| ErgoPayError::MalformedResponse(e.to_string()))?;
        Self::try_from(response)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<ErgoPayResponse> for ErgoPaySigningRequest {
    type Error = ErgoPayError;

    fn try_from(response: ErgoPayResponse) -> Result<Self, Self::Error> {
        let reduced_tx = match non_empty(response.reduced_tx) {
            Some(encoded) => Some(
                decode_base64("reducedTx", &encoded)
                    .map_err(|e| ErgoPayError::MalformedResponse(e.to_string()))?,
            ),
            None => None,
        };
        let message = non_empty(response.message);

        if reduced_tx.is_none() && message.is_none() {
            return Err(ErgoPayError::MalformedResponse(
                "neither reducedTx nor message present".to_string(),
            ));
        }

        Ok(Self {
            reduced_tx,
            p2pk_address: non_empty(response.address),
            message,
            message_severity: response.message_severity.unwrap_or_default(),
            reply_to_url: non_empty(response.reply_to),
        })
    }
}

/// Body posted to a dApp's `replyTo` URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyPayload {
    Submitted {
        #[serde(rename = "txId")]
        tx_id: String,
    },
    Failed {
        error: String,
    },
}
