//! JSON-RPC chain client with multi-RPC support and automatic failover

use super::{ChainClient, TxStatus};
use crate::config::ChainConfig;
use crate::error::{OperatorError, OperatorResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionRequest, H256, U256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct RpcClient {
    /// Chain name, for logs
    name: String,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl RpcClient {
    /// Create a new client from the configured RPC URLs
    pub fn new(config: &ChainConfig) -> OperatorResult<Self> {
        let mut http_providers = Vec::new();

        for url in config.rpc_urls.iter().filter(|u| !u.trim().is_empty()) {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {}: {}", config.name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(OperatorError::Config(format!(
                "No valid RPC providers for {}",
                config.name
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} failover to provider {}", self.name, next);
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn gas_price(&self) -> OperatorResult<U256> {
        let mut last_error = String::new();
        for _ in 0..self.http_providers.len() {
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!("Failed to get gas price from {}: {}", self.name, e);
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(OperatorError::GasEstimation(last_error))
    }

    async fn chain_id(&self) -> OperatorResult<u64> {
        self.http()
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| {
                self.failover();
                OperatorError::Remote(format!("chain id lookup failed: {}", e))
            })
    }

    async fn pending_nonce(&self, address: Address) -> OperatorResult<u64> {
        let mut last_error = String::new();
        for _ in 0..self.http_providers.len() {
            match self
                .http()
                .get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
            {
                Ok(nonce) => return Ok(nonce.as_u64()),
                Err(e) => {
                    warn!("Failed to get pending nonce from {}: {}", self.name, e);
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(OperatorError::Remote(format!(
            "pending nonce lookup failed: {}",
            last_error
        )))
    }

    async fn call(&self, to: Address, data: Bytes) -> OperatorResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.http()
            .call(&tx, None)
            .await
            .map_err(|e| OperatorError::Remote(e.to_string()))
    }

    async fn broadcast(&self, raw: Bytes) -> OperatorResult<()> {
        self.http()
            .send_raw_transaction(raw)
            .await
            .map(|_| ())
            .map_err(|e| OperatorError::Broadcast(e.to_string()))
    }

    async fn transaction_status(&self, hash: H256) -> OperatorResult<TxStatus> {
        let tx = self
            .http()
            .get_transaction(hash)
            .await
            .map_err(|e| OperatorError::Remote(e.to_string()))?;

        Ok(match tx {
            None => TxStatus::NotFound,
            Some(tx) if tx.block_number.is_none() => TxStatus::Pending,
            Some(tx) => TxStatus::Mined(Box::new(tx)),
        })
    }
}
