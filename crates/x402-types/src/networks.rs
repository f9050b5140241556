//! Registry of the network names used by x402 v1 payloads.
//!
//! Version 1 messages carry a human-readable network name (`"base-sepolia"`)
//! rather than a CAIP-2 chain id. This module maps between the two for the
//! EVM networks the exact scheme is deployed on.
//!
//! ```
//! use x402_types::chain::ChainId;
//! use x402_types::networks::chain_id_by_network_name;
//!
//! let polygon = chain_id_by_network_name("polygon").unwrap();
//! assert_eq!(polygon.to_string(), "eip155:137");
//! assert_eq!(ChainId::new("eip155", "84532").as_network_name(), Some("base-sepolia"));
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::chain::ChainId;

/// A known network: its v1 name and CAIP-2 components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub name: &'static str,
    pub namespace: &'static str,
    pub reference: &'static str,
}

impl NetworkInfo {
    const fn eip155(name: &'static str, reference: &'static str) -> Self {
        Self {
            name,
            namespace: "eip155",
            reference,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

pub static KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo::eip155("base", "8453"),
    NetworkInfo::eip155("base-sepolia", "84532"),
    NetworkInfo::eip155("polygon", "137"),
    NetworkInfo::eip155("polygon-amoy", "80002"),
    NetworkInfo::eip155("avalanche", "43114"),
    NetworkInfo::eip155("avalanche-fuji", "43113"),
    NetworkInfo::eip155("sei", "1329"),
    NetworkInfo::eip155("sei-testnet", "1328"),
    NetworkInfo::eip155("xdc", "50"),
    NetworkInfo::eip155("xrpl-evm", "1440000"),
    NetworkInfo::eip155("peaq", "3338"),
    NetworkInfo::eip155("iotex", "4689"),
    NetworkInfo::eip155("celo", "42220"),
    NetworkInfo::eip155("celo-sepolia", "11142220"),
];

static NAME_TO_CHAIN_ID: LazyLock<HashMap<&'static str, ChainId>> = LazyLock::new(|| {
    KNOWN_NETWORKS
        .iter()
        .map(|network| (network.name, network.chain_id()))
        .collect()
});

static CHAIN_ID_TO_NAME: LazyLock<HashMap<ChainId, &'static str>> = LazyLock::new(|| {
    KNOWN_NETWORKS
        .iter()
        .map(|network| (network.chain_id(), network.name))
        .collect()
});

/// Looks up the chain id behind a v1 network name. Names are matched exactly.
pub fn chain_id_by_network_name(name: &str) -> Option<&'static ChainId> {
    NAME_TO_CHAIN_ID.get(name)
}

pub fn network_name_by_chain_id(chain_id: &ChainId) -> Option<&'static str> {
    CHAIN_ID_TO_NAME.get(chain_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        assert_eq!(NAME_TO_CHAIN_ID.len(), KNOWN_NETWORKS.len());
        assert_eq!(CHAIN_ID_TO_NAME.len(), KNOWN_NETWORKS.len());
    }

    #[test]
    fn test_chain_id_by_network_name() {
        let base = chain_id_by_network_name("base").unwrap();
        assert_eq!(base, &ChainId::new("eip155", "8453"));
        let celo_sepolia = chain_id_by_network_name("celo-sepolia").unwrap();
        assert_eq!(celo_sepolia.reference, "11142220");
        assert!(chain_id_by_network_name("Base").is_none());
        assert!(chain_id_by_network_name("solana").is_none());
    }

    #[test]
    fn test_network_name_by_chain_id() {
        let avalanche_fuji = ChainId::new("eip155", "43113");
        assert_eq!(network_name_by_chain_id(&avalanche_fuji), Some("avalanche-fuji"));
        assert!(network_name_by_chain_id(&ChainId::new("eip155", "999999")).is_none());
    }
}
