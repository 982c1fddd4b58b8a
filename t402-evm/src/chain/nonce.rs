//! Pending-aware nonce management for facilitator transactions.

use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A nonce manager that caches nonces locally and includes mempool
/// transactions when fetching the initial value.
///
/// The first call for an address fetches the transaction count with
/// `.pending()`, which counts transactions still in the mempool — this
/// avoids "nonce too low" errors after a restart with transactions in
/// flight. Subsequent calls increment locally without an RPC round trip.
///
/// Each address's nonce is protected by its own mutex so multiple signers
/// can submit concurrently without contending on a global lock.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

// Sentinel meaning "not fetched yet".
const NONE: u64 = u64::MAX;

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: alloy_network::Network,
    {
        // Clone the per-address Arc under the short-lived map lock; the
        // await below must not hold the map lock.
        let nonce = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONE)));
            Arc::clone(entry.value())
        };

        let mut nonce = nonce.lock().await;
        let next = if *nonce == NONE {
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }
}

impl PendingNonceManager {
    /// Resets the cached nonce for an address, forcing a fresh `.pending()`
    /// query on next use.
    ///
    /// Call this after a failed submission or receipt timeout: the
    /// transaction may or may not have reached the mempool, so the local
    /// counter can no longer be trusted.
    pub async fn reset_nonce(&self, address: Address) {
        if let Some(entry) = self.nonces.get(&address) {
            let mut nonce = entry.lock().await;
            *nonce = NONE;
        }
    }
}
