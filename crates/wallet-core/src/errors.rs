//! Error types shared across the signer workspace

use thiserror::Error;

/// Top-level error aggregating every collaborator failure
#[derive(Debug, Error)]
pub enum Error {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("Preview error: {0}")]
    Preview(#[from] PreviewError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Node connection and query errors
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("Node unreachable at {url}")]
    Unreachable { url: String },

    #[error("Node returned error: {message}")]
    ApiError { message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Box not found: {box_id}")]
    BoxNotFound { box_id: String },

    #[error("Transaction rejected by node: {message}")]
    Rejected { message: String },
}

/// Errors raised while signing a reduced transaction
#[derive(Debug, Clone, Error)]
pub enum SigningError {
    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Key derivation failed for index {index}: {message}")]
    KeyDerivation { index: u32, message: String },

    #[error("Could not parse reduced transaction: {0}")]
    InvalidTransaction(String),

    #[error("Signing failed: {0}")]
    Failed(String),
}

/// Errors raised while building a human-readable transaction preview
#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error("Could not parse reduced transaction: {0}")]
    InvalidTransaction(String),
}

/// Errors raised by the ErgoPay HTTP transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Invalid request URI: {0}")]
    InvalidUri(String),

    #[error("Request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },

    #[error("{url} answered with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),
}

/// Misuse of a workflow: an operation invoked in the wrong state
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Operation {operation} not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("No wallet selected")]
    NoWallet,

    #[error("Wallet {wallet_id} has no address with derivation index {index}")]
    UnknownAddress { wallet_id: i64, index: u32 },

    #[error("Another operation is in progress")]
    Busy,

    #[error("Could not encode signing payload: {0}")]
    Payload(String),
}

/// Result type alias for signer operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for front ends and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Node(e) => e.error_code(),
            Self::Signing(e) => e.error_code(),
            Self::Preview(_) => "preview_failed",
            Self::Transport(e) => e.error_code(),
            Self::Workflow(WorkflowError::Payload(_)) => "payload_error",
            Self::Workflow(_) => "invalid_workflow_state",
            Self::Config(_) => "config_error",
        }
    }
}

impl NodeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "node_unreachable",
            Self::ApiError { .. } => "node_api_error",
            Self::ParseError(_) => "node_parse_error",
            Self::BoxNotFound { .. } => "box_not_found",
            Self::Rejected { .. } => "tx_rejected",
        }
    }
}

impl SigningError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSecret => "invalid_secret",
            Self::KeyDerivation { .. } => "key_derivation_failed",
            Self::InvalidTransaction(_) => "invalid_transaction",
            Self::Failed(_) => "signing_failed",
        }
    }

    /// Whether the user can fix this by re-entering credentials
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::InvalidSecret | Self::KeyDerivation { .. })
    }
}

impl TransportError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUri(_) => "invalid_uri",
            Self::RequestFailed { .. } => "request_failed",
            Self::HttpStatus { .. } => "http_status",
            Self::MalformedBody(_) => "malformed_body",
        }
    }
}
