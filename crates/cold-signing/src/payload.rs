//! EIP-19 cold signing payloads
//!
//! The hot wallet sends a [`ColdSigningRequest`] (tag `CSR`), the cold device
//! answers with a [`ColdSigningResponse`] (tag `CSTX`). Both travel as JSON
//! with base64 encoded binary fields.

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use qr_transport::{ChunkPresets, ChunkTag, PageCollector, QrResolution, ReassembleError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PayloadError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Field {field} is not valid base64: {message}")]
    Base64 { field: &'static str, message: String },

    #[error("Field {0} is empty")]
    Empty(&'static str),
}

/// Decode base64 in either alphabet, with or without padding
pub fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, PayloadError> {
    let value = value.trim();
    [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
        .into_iter()
        .find_map(|engine| engine.decode(value).ok())
        .ok_or_else(|| PayloadError::Base64 {
            field,
            message: format!("{} characters could not be decoded", value.len()),
        })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestJson {
    reduced_tx: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inputs: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseJson {
    signed_tx: String,
}

/// Unsigned transaction handed to a cold device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColdSigningRequest {
    /// Sigma-serialized reduced transaction
    pub reduced_tx: Vec<u8>,
    /// Address hint so the cold device can pick the right wallet
    pub sender: Option<String>,
    /// Sigma-serialized input boxes, for previewing offline
    pub inputs: Vec<Vec<u8>>,
}

impl ColdSigningRequest {
    pub fn to_json(&self) -> Result<String, PayloadError> {
        let wire = RequestJson {
            reduced_tx: STANDARD.encode(&self.reduced_tx),
            sender: self.sender.clone(),
            inputs: (!self.inputs.is_empty())
                .then(|| self.inputs.iter().map(|b| STANDARD.encode(b)).collect()),
        };
        serde_json::to_string(&wire).map_err(|e| PayloadError::Json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        let wire: RequestJson =
            serde_json::from_str(json).map_err(|e| PayloadError::Json(e.to_string()))?;
        let reduced_tx = decode_base64("reducedTx", &wire.reduced_tx)?;
        if reduced_tx.is_empty() {
            return Err(PayloadError::Empty("reducedTx"));
        }
        let inputs = wire
            .inputs
            .unwrap_or_default()
            .iter()
            .map(|b| decode_base64("inputs", b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            reduced_tx,
            sender: wire.sender.filter(|s| !s.is_empty()),
            inputs,
        })
    }
}

/// Signed transaction returned by a cold device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColdSigningResponse {
    /// Sigma-serialized signed transaction
    pub signed_tx: Vec<u8>,
}

impl ColdSigningResponse {
    pub fn to_json(&self) -> Result<String, PayloadError> {
        let wire = ResponseJson {
            signed_tx: STANDARD.encode(&self.signed_tx),
        };
        serde_json::to_string(&wire).map_err(|e| PayloadError::Json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        let wire: ResponseJson =
            serde_json::from_str(json).map_err(|e| PayloadError::Json(e.to_string()))?;
        let signed_tx = decode_base64("signedTx", &wire.signed_tx)?;
        if signed_tx.is_empty() {
            return Err(PayloadError::Empty("signedTx"));
        }
        Ok(Self { signed_tx })
    }
}

/// Outcome of a local signing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    pub success: bool,
    pub signed_tx: Option<Vec<u8>>,
    pub error_message: Option<String>,
}

impl SigningResult {
    pub fn signed(signed_tx: Vec<u8>) -> Self {
        Self {
            success: true,
            signed_tx: Some(signed_tx),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            signed_tx: None,
            error_message: Some(message.into()),
        }
    }
}

pub fn request_to_chunks(
    request: &ColdSigningRequest,
    presets: &ChunkPresets,
    resolution: QrResolution,
) -> Result<Vec<String>, PayloadError> {
    Ok(presets.encode(ChunkTag::ColdSigningRequest, &request.to_json()?, resolution))
}

pub fn response_to_chunks(
    response: &ColdSigningResponse,
    presets: &ChunkPresets,
    resolution: QrResolution,
) -> Result<Vec<String>, PayloadError> {
    Ok(presets.encode(ChunkTag::ColdSignedTx, &response.to_json()?, resolution))
}

pub fn request_collector() -> PageCollector {
    PageCollector::new(ChunkTag::ColdSigningRequest)
}

pub fn response_collector() -> PageCollector {
    PageCollector::new(ChunkTag::ColdSignedTx)
}

pub fn request_from_collector(
    collector: &PageCollector,
) -> Result<ColdSigningRequest, ReassembleError<PayloadError>> {
    collector.reassemble_with(ColdSigningRequest::from_json)
}

pub fn response_from_collector(
    collector: &PageCollector,
) -> Result<ColdSigningResponse, ReassembleError<PayloadError>> {
    collector.reassemble_with(ColdSigningResponse::from_json)
}
