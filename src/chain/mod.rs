//! Chain module - the read/submit capability the transaction manager depends on
//!
//! The core only talks to the chain through [`ChainClient`], so the JSON-RPC
//! implementation in [`provider`] can be swapped for a test double.

pub mod provider;

pub use provider::RpcClient;

use crate::error::OperatorResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Transaction, H256, U256};

#[cfg(test)]
use mockall::automock;

/// Result of looking a transaction up by hash
#[derive(Debug, Clone, PartialEq)]
pub enum TxStatus {
    /// The node does not know the hash (yet)
    NotFound,
    /// Known to the node but not included in a block
    Pending,
    /// Included in a block
    Mined(Box<Transaction>),
}

/// Capability to read chain state and submit transactions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Suggested gas price in wei
    async fn gas_price(&self) -> OperatorResult<U256>;

    async fn chain_id(&self) -> OperatorResult<u64>;

    /// Next nonce for `address`, counting transactions still in the mempool
    async fn pending_nonce(&self, address: Address) -> OperatorResult<u64>;

    /// Simulated execution (`eth_call`) against the latest state
    async fn call(&self, to: Address, data: Bytes) -> OperatorResult<Bytes>;

    /// Submit a raw signed transaction
    async fn broadcast(&self, raw: Bytes) -> OperatorResult<()>;

    async fn transaction_status(&self, hash: H256) -> OperatorResult<TxStatus>;
}
