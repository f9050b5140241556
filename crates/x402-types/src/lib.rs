//! Core types for x402 exact-scheme payments.
//!
//! The x402 protocol attaches payments to HTTP requests: a resource server
//! answers `402 Payment Required` with payment requirements, the client signs a
//! transfer authorization, and a facilitator verifies and settles it. This
//! crate holds the chain-agnostic parts of a facilitator:
//!
//! - [`chain`] - CAIP-2 chain ids and the registry of configured providers
//! - [`config`] - RPC settings and `$VAR` environment references
//! - [`facilitator`] - the verify / settle / supported interface
//! - [`networks`] - v1 network names and their chain ids
//! - [`proto`] - wire types and the [`proto::ErrorReason`] taxonomy
//! - [`scheme`] - scheme handlers and their registry
//! - [`timestamp`] - Unix timestamps and an injectable clock

pub mod chain;
pub mod config;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod scheme;
pub mod timestamp;
pub mod util;
