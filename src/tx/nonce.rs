//! Nonce management for reliable transaction submission
//!
//! The next nonce lives in a single-slot async mutex. Holding the slot is
//! represented by a [`NonceGuard`]; dropping the guard always releases the slot,
//! and only [`NonceGuard::commit`] advances the counter. A failed or panicking
//! send therefore hands the same nonce to the next caller.

use crate::chain::ChainClient;
use crate::error::OperatorResult;

use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Owns the signing identity's next nonce
pub struct NonceManager {
    /// Next nonce to use
    next: Arc<Mutex<u64>>,
}

impl NonceManager {
    /// Start from the chain's pending nonce for `wallet_address`
    pub async fn init(wallet_address: Address, client: &dyn ChainClient) -> OperatorResult<Self> {
        let on_chain_nonce = client.pending_nonce(wallet_address).await?;
        debug!(
            "Initialized nonce for {:?}: {}",
            wallet_address, on_chain_nonce
        );
        crate::metrics::record_next_nonce(on_chain_nonce);

        Ok(Self {
            next: Arc::new(Mutex::new(on_chain_nonce)),
        })
    }

    /// Wait for exclusive ownership of the next nonce
    pub async fn acquire(&self) -> NonceGuard {
        let slot = self.next.clone().lock_owned().await;
        debug!("Checked out nonce {}", *slot);
        NonceGuard {
            slot,
            committed: false,
        }
    }

    /// Current value of the counter; waits for any in-flight holder
    pub async fn current(&self) -> u64 {
        *self.next.lock().await
    }
}

/// Exclusive hold on the next nonce
pub struct NonceGuard {
    slot: OwnedMutexGuard<u64>,
    committed: bool,
}

impl NonceGuard {
    pub fn value(&self) -> u64 {
        *self.slot
    }

    /// Mark the nonce as spent and release the slot
    pub fn commit(mut self) {
        *self.slot += 1;
        self.committed = true;
        crate::metrics::record_next_nonce(*self.slot);
    }
}

impl Drop for NonceGuard {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Released nonce {} unused", *self.slot);
        }
    }
}
