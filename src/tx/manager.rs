//! Transaction manager: read calls, nonce-serialized sends, confirmation polling

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::signer::TransactionSigner;
use crate::chain::{ChainClient, TxStatus};
use crate::config::TransactionConfig;
use crate::contract::{CallResult, ContractDescriptor};
use crate::error::{OperatorError, OperatorResult};

use chrono::{DateTime, Utc};
use ethers::abi::Token;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Transaction, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A broadcast transaction awaiting confirmation
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub hash: H256,
    pub method: String,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
}

/// The only path through which transactions leave the process.
///
/// Exactly one manager may run per signing key: the nonce counter is seeded from
/// the chain at construction and then tracked locally.
pub struct TransactionManager {
    client: Arc<dyn ChainClient>,
    descriptor: Arc<ContractDescriptor>,
    signer: Arc<dyn TransactionSigner>,
    nonces: NonceManager,
    gas: GasEstimator,
    poll_interval: Duration,
    /// Bounds the number of confirmation watchers polling at once
    watchers: Arc<Semaphore>,
}

impl TransactionManager {
    pub async fn new(
        client: Arc<dyn ChainClient>,
        descriptor: Arc<ContractDescriptor>,
        signer: Arc<dyn TransactionSigner>,
        config: &TransactionConfig,
    ) -> OperatorResult<Self> {
        let nonces = NonceManager::init(signer.address(), client.as_ref()).await?;

        info!(
            "Transaction manager initialized for {:?} targeting {:?}",
            signer.address(),
            descriptor.address()
        );

        Ok(Self {
            client,
            descriptor,
            signer,
            nonces,
            gas: GasEstimator::new(config),
            poll_interval: config.poll_interval(),
            watchers: Arc::new(Semaphore::new(config.max_pending_confirmations)),
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn contract_address(&self) -> Address {
        self.descriptor.address()
    }

    /// Next nonce the manager will use
    pub async fn next_nonce(&self) -> u64 {
        self.nonces.current().await
    }

    /// Simulate `method` and decode its outputs into `T`
    pub async fn call<T: CallResult>(&self, method: &str, args: &[Token]) -> OperatorResult<T> {
        let data = self.descriptor.encode_call(method, args)?;

        let output = self
            .client
            .call(self.descriptor.address(), data)
            .await
            .map_err(|e| {
                crate::metrics::record_read_failure(method);
                e
            })?;

        let tokens = self.descriptor.decode_output(method, &output)?;
        crate::metrics::record_read_call(method);
        T::from_tokens(method, tokens)
    }

    /// Sign and broadcast a call to `method`, returning its hash
    pub async fn send(&self, method: &str, args: &[Token]) -> OperatorResult<H256> {
        self.submit(method, args).await.map(|pending| pending.hash)
    }

    /// Send, then block until the transaction is mined or `timeout` elapses
    pub async fn send_and_wait(
        &self,
        method: &str,
        args: &[Token],
        timeout: Duration,
    ) -> OperatorResult<Transaction> {
        let pending = self.submit(method, args).await?;
        self.wait_for(&pending, timeout).await
    }

    /// Sign and broadcast a call to `method`.
    ///
    /// The nonce is held for the whole build/sign/broadcast sequence and is only
    /// consumed when the node accepts the transaction.
    pub async fn submit(&self, method: &str, args: &[Token]) -> OperatorResult<PendingTransaction> {
        let data = self.descriptor.encode_call(method, args).map_err(|e| {
            crate::metrics::record_tx_failed(method, e.stage());
            e
        })?;

        let nonce = self.nonces.acquire().await;

        match self.sign_and_broadcast(data, nonce.value()).await {
            Ok(hash) => {
                let pending = PendingTransaction {
                    hash,
                    method: method.to_string(),
                    nonce: nonce.value(),
                    submitted_at: Utc::now(),
                };
                nonce.commit();
                info!(
                    "Transaction sent: {} {:?} (nonce {})",
                    method, hash, pending.nonce
                );
                crate::metrics::record_tx_submitted(method);
                Ok(pending)
            }
            Err(e) => {
                warn!(
                    "Failed to send {} with nonce {}: {}",
                    method,
                    nonce.value(),
                    e
                );
                crate::metrics::record_tx_failed(method, e.stage());
                Err(e)
            }
        }
    }

    async fn sign_and_broadcast(&self, data: Bytes, nonce: u64) -> OperatorResult<H256> {
        let gas_price = self.gas.gas_price(self.client.as_ref()).await?;
        let chain_id = self.client.chain_id().await?;

        let tx = self.build_tx(data, nonce, gas_price, chain_id);
        debug!(
            "Built tx nonce {} gas price {} (max fee {})",
            nonce,
            gas_price,
            self.gas.max_cost(gas_price)
        );

        let signature = self.signer.sign(&tx).await?;
        let raw = tx.rlp_signed(&signature);
        let hash = tx.hash(&signature);

        self.client.broadcast(raw).await?;
        Ok(hash)
    }

    /// Build a legacy EIP-155 transaction to the contract
    fn build_tx(&self, data: Bytes, nonce: u64, gas_price: U256, chain_id: u64) -> TypedTransaction {
        TransactionRequest::new()
            .from(self.signer.address())
            .to(self.descriptor.address())
            .data(data)
            .nonce(nonce)
            .value(U256::zero())
            .gas(self.gas.gas_limit())
            .gas_price(gas_price)
            .chain_id(chain_id)
            .into()
    }

    /// Poll until `pending` is mined or `timeout` elapses.
    ///
    /// "Not found" and lookup errors are treated as transient. A timeout does not
    /// mean the transaction failed; it may still be mined later.
    pub async fn wait_for(
        &self,
        pending: &PendingTransaction,
        timeout: Duration,
    ) -> OperatorResult<Transaction> {
        let deadline = Instant::now() + timeout;
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return Err(self.timed_out(pending, timeout)),
                _ = ticker.tick() => {}
            }

            // a stalled node must not hold the caller past the deadline
            let status = match timeout_at(deadline, self.client.transaction_status(pending.hash)).await {
                Ok(status) => status,
                Err(_) => return Err(self.timed_out(pending, timeout)),
            };

            match status {
                Ok(TxStatus::Mined(tx)) => {
                    let latency = (Utc::now() - pending.submitted_at)
                        .to_std()
                        .unwrap_or_default();
                    info!(
                        "Transaction {:?} mined in block {:?}",
                        pending.hash, tx.block_number
                    );
                    crate::metrics::record_tx_confirmed(&pending.method, latency);
                    return Ok(*tx);
                }
                Ok(TxStatus::Pending) => {
                    debug!("Transaction {:?} still pending", pending.hash);
                }
                Ok(TxStatus::NotFound) => {
                    debug!(
                        "Waiting for transaction {:?} to be recognized by the network",
                        pending.hash
                    );
                }
                Err(e) => {
                    debug!("Lookup of {:?} failed, retrying: {}", pending.hash, e);
                }
            }
        }
    }

    fn timed_out(&self, pending: &PendingTransaction, waited: Duration) -> OperatorError {
        warn!("Timed out waiting for {} {:?}", pending.method, pending.hash);
        crate::metrics::record_confirmation_timeout(&pending.method);
        OperatorError::Timeout {
            tx_hash: pending.hash,
            waited,
        }
    }

    /// Spawn an independent confirmation wait for `pending`.
    ///
    /// The task only logs its outcome; callers that care hold on to the handle.
    pub fn watch(
        self: &Arc<Self>,
        pending: PendingTransaction,
        timeout: Duration,
    ) -> JoinHandle<OperatorResult<Transaction>> {
        let manager = self.clone();
        tokio::spawn(async move {
            let _permit = manager
                .watchers
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| OperatorError::Internal(e.to_string()))?;

            let result = manager.wait_for(&pending, timeout).await;
            if let Err(e) = &result {
                warn!("Background confirmation of {:?} ended: {}", pending.hash, e);
            }
            result
        })
    }
}
