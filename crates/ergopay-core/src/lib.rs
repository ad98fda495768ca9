//! ErgoPay Core
//!
//! EIP-20 signing requests: URI parsing, fetching from dApps, and the
//! workflow that takes a request from URI to a broadcast transaction.
//!
//! # Example
//!
//! ```ignore
//! use ergopay_core::{ErgoPayServices, ErgoPayWorkflow};
//!
//! let mut workflow = ErgoPayWorkflow::new(uri, wallets, services);
//! workflow.start(None, None).await?;
//! if workflow.state() == ErgoPayState::WaitForConfirmation {
//!     workflow.confirm_signing(&secret).await?;
//! }
//! ```

pub mod error;
pub mod transport;
pub mod types;
pub mod uri;
pub mod workflow;

pub use error::ErgoPayError;
pub use transport::{ErgoPayTransport, HttpTransport};
pub use types::{ErgoPayResponse, ErgoPaySigningRequest, MessageSeverity, ReplyPayload};
pub use uri::{fetch_url, is_ergopay_request, is_static_request, needs_address, parse_static_request};
pub use workflow::{ErgoPayServices, ErgoPayState, ErgoPayWorkflow};
