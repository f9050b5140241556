//! EVM chain access for the exact scheme.
//!
//! - [`types`]: wire representations such as [`TokenAmount`] and [`Eip155ChainReference`]
//! - [`config`]: per-chain provider configuration
//! - [`contract`]: ERC-3009 and EIP-6492 validator bindings
//! - [`provider`]: the [`Eip155ChainReader`], [`Eip155SignatureVerifier`] and
//!   [`Eip155ChainWriter`] seams and their alloy implementation
//! - [`pending_nonce_manager`]: nonce tracking for concurrent submissions

pub mod config;
pub use config::*;

pub mod contract;

pub mod pending_nonce_manager;
pub use pending_nonce_manager::*;

pub mod provider;
pub use provider::*;

pub mod types;
pub use types::*;
