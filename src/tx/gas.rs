//! Gas price and limit policy for operator transactions

use crate::chain::ChainClient;
use crate::config::TransactionConfig;
use crate::error::OperatorResult;

use ethers::types::U256;
use tracing::{debug, warn};

/// Gas estimator for transactions
pub struct GasEstimator {
    /// Fixed gas limit for every contract call
    gas_limit: U256,
    /// Buffer percentage added to the suggested price
    gas_price_buffer_percent: u64,
    /// Upper bound on the price we are willing to pay
    max_gas_price: Option<U256>,
}

impl GasEstimator {
    pub fn new(config: &TransactionConfig) -> Self {
        Self {
            gas_limit: U256::from(config.gas_limit),
            gas_price_buffer_percent: config.gas_price_buffer_percent,
            max_gas_price: config.max_gas_price_wei(),
        }
    }

    pub fn gas_limit(&self) -> U256 {
        self.gas_limit
    }

    /// Suggested price plus buffer, capped at the configured maximum
    pub async fn gas_price(&self, client: &dyn ChainClient) -> OperatorResult<U256> {
        let suggested = client.gas_price().await?;
        let buffered = suggested + suggested * self.gas_price_buffer_percent / 100;

        let price = match self.max_gas_price {
            Some(cap) if buffered > cap => {
                warn!("Gas price {} above cap, using {}", buffered, cap);
                cap
            }
            _ => buffered,
        };

        debug!("Gas price: {} (suggested {})", price, suggested);
        Ok(price)
    }

    /// Worst-case fee in wei
    pub fn max_cost(&self, gas_price: U256) -> U256 {
        self.gas_limit * gas_price
    }
}
