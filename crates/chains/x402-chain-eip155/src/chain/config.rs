//! Per-chain configuration of an EVM provider.
//!
//! The facilitator config maps each CAIP-2 chain id to an
//! [`Eip155ChainConfigInner`]:
//!
//! ```json
//! "eip155:84532": {
//!   "eip1559": true,
//!   "signers": ["$EVM_PRIVATE_KEY"],
//!   "rpc": [{ "http": "https://sepolia.base.org", "rate_limit": 50 }],
//!   "receipt_timeout_secs": 30
//! }
//! ```

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use x402_types::chain::ChainId;
use x402_types::config::{LiteralOrEnv, RpcConfig};

use crate::chain::Eip155ChainReference;

#[derive(Debug, Clone)]
pub struct Eip155ChainConfig {
    pub chain_reference: Eip155ChainReference,
    pub inner: Eip155ChainConfigInner,
}

impl Eip155ChainConfig {
    pub fn chain_id(&self) -> ChainId {
        self.chain_reference.into()
    }
    pub fn eip1559(&self) -> bool {
        self.inner.eip1559
    }
    pub fn receipt_timeout_secs(&self) -> u64 {
        self.inner.receipt_timeout_secs
    }
    pub fn signers(&self) -> &Eip155SignersConfig {
        &self.inner.signers
    }
    pub fn rpc(&self) -> &[RpcConfig] {
        &self.inner.rpc
    }
    pub fn chain_reference(&self) -> Eip155ChainReference {
        self.chain_reference
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eip155ChainConfigInner {
    /// EIP-1559 fee market. Legacy `gasPrice` is used when `false`.
    #[serde(default = "eip155_chain_config::default_eip1559")]
    pub eip1559: bool,
    /// Settlement keys, tried round-robin.
    pub signers: Eip155SignersConfig,
    /// Endpoints, used with fallback.
    pub rpc: Vec<RpcConfig>,
    /// Upper bound on waiting for a settlement receipt.
    #[serde(default = "eip155_chain_config::default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

mod eip155_chain_config {
    pub fn default_eip1559() -> bool {
        true
    }
    pub fn default_receipt_timeout_secs() -> u64 {
        30
    }
}

/// Hex private keys, literal or `$VAR` references.
pub type Eip155SignersConfig = Vec<LiteralOrEnv<EvmPrivateKey>>;

/// A 32-byte secp256k1 private key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl Debug for EvmPrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("EvmPrivateKey(..)")
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid evm private key: {e}"))
    }
}
