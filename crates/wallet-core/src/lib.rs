//! wallet-core: Shared types, errors, configuration and workflow plumbing
//!
//! This crate provides the foundational types used across the signer workspace.

pub mod config;
pub mod errors;
pub mod preview;
pub mod services;
pub mod types;
pub mod wallet;
pub mod workflow;

pub use config::*;
pub use errors::*;
pub use preview::*;
pub use services::*;
pub use types::*;
pub use wallet::*;
pub use workflow::*;
