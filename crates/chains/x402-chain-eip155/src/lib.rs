//! EIP-155 (EVM) support for the x402 "exact" payment scheme.
//!
//! A buyer signs an ERC-3009 `transferWithAuthorization`; the facilitator
//! verifies it and, on settlement, submits it on-chain and pays the gas.
//!
//! - [`chain`]: chain provider, contract bindings and configuration
//! - [`v1_eip155_exact`]: signature classification, verification and settlement
//!
//! ```ignore
//! use x402_chain_eip155::V1Eip155Exact;
//! use x402_chain_eip155::chain::Eip155ChainProvider;
//! use x402_types::scheme::X402SchemeFacilitatorBuilder;
//!
//! let provider = Arc::new(Eip155ChainProvider::from_config(&config).await?);
//! let facilitator = V1Eip155Exact.build(provider, None)?;
//! let verify_response = facilitator.verify(&verify_request).await?;
//! ```

pub mod chain;
pub mod v1_eip155_exact;

pub use v1_eip155_exact::{ExactEvmFacilitator, V1Eip155Exact, V1Eip155ExactFacilitator, WalletKind};
