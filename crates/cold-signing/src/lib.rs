//! cold-signing: Signing transactions on a device that never goes online
//!
//! Requests and signed transactions cross the air gap as EIP-19 QR chunks.

pub mod payload;
pub mod workflow;

pub use payload::{
    decode_base64, request_collector, request_from_collector, request_to_chunks,
    response_collector, response_from_collector, response_to_chunks, ColdSigningRequest,
    ColdSigningResponse, PayloadError, SigningResult,
};
pub use workflow::{ColdSigningState, ColdSigningWorkflow, ScanProgress};
