//! Chain providers of the configured networks.
//!
//! Each `eip155:*` entry of the config gets one [`Eip155ChainProvider`],
//! shared by every scheme handler built for that chain.

use std::collections::HashMap;
use std::sync::Arc;
use x402_chain_eip155::chain::Eip155ChainProvider;
use x402_types::chain::{ChainProviderOps, ChainRegistry, FromConfig};

use crate::config::ChainsConfig;

pub type ChainProvider = Arc<Eip155ChainProvider>;

/// Connects every configured chain.
///
/// Fails on the first chain whose signers or RPC endpoints cannot be set up.
#[async_trait::async_trait]
impl FromConfig<ChainsConfig> for ChainRegistry<ChainProvider> {
    async fn from_config(chains: &ChainsConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut providers = HashMap::new();
        for config in chains.iter() {
            let provider = Eip155ChainProvider::from_config(config).await?;
            providers.insert(provider.chain_id(), Arc::new(provider));
        }
        Ok(Self::new(providers))
    }
}
