use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sentinel for "not fetched yet".
const UNKNOWN_NONCE: u64 = u64::MAX;

/// Nonce manager for settlement signers.
///
/// The first nonce of an address is read with the `pending` block tag, so
/// transactions already in the mempool after a restart are accounted for. Later
/// nonces are handed out locally. Each address has its own lock, so signers do
/// not contend with each other.
///
/// A failed submission or receipt wait leaves the real nonce unknown; callers
/// then [`reset_nonce`](Self::reset_nonce) to force a fresh read.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: alloy_network::Network,
    {
        // Clone the Arc out so the map shard is not locked across the await.
        let slot = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(UNKNOWN_NONCE)));
            Arc::clone(entry.value())
        };

        let mut nonce = slot.lock().await;
        let next = if *nonce == UNKNOWN_NONCE {
            tracing::trace!(%address, "fetching pending nonce");
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }
}

impl PendingNonceManager {
    /// Forgets the cached nonce of `address`.
    pub async fn reset_nonce(&self, address: Address) {
        let slot = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = slot {
            *slot.lock().await = UNKNOWN_NONCE;
            tracing::debug!(%address, "reset nonce cache");
        }
    }

    #[cfg(test)]
    async fn cached(&self, address: Address) -> Option<u64> {
        let slot = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()))?;
        let nonce = *slot.lock().await;
        (nonce != UNKNOWN_NONCE).then_some(nonce)
    }
}
