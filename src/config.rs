//! Configuration management for the operator service
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub operator: OperatorConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub interface: InterfaceConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    pub contract_address: String,
    pub owner_address: String,
    /// Name of the environment variable holding the hex private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    #[serde(default = "default_fee_percent")]
    pub protocol_fee_percent: u64,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    pub gas_limit: u64,
    pub gas_price_buffer_percent: u64,
    pub max_gas_price_gwei: Option<u64>,
    pub poll_interval_secs: u64,
    pub max_pending_confirmations: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfaceConfig {
    pub explorer_url: Option<String>,
    pub api_key: Option<String>,
    /// Local ABI file; takes precedence over the explorer when set
    pub abi_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_private_key_env() -> String {
    "OPERATOR_PRIVATE_KEY".to_string()
}

fn default_fee_percent() -> u64 {
    5
}

fn default_confirmation_timeout() -> u64 {
    120
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            gas_limit: 3_000_000,
            gas_price_buffer_percent: 0,
            max_gas_price_gwei: None,
            poll_interval_secs: 5,
            max_pending_confirmations: 1000,
        }
    }
}

impl TransactionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_gas_price_wei(&self) -> Option<U256> {
        self.max_gas_price_gwei
            .map(|gwei| U256::from(gwei) * U256::exp10(9))
    }
}

impl OperatorConfig {
    pub fn contract_address(&self) -> Result<Address> {
        self.contract_address
            .parse()
            .with_context(|| format!("Invalid contract address: {}", self.contract_address))
    }

    pub fn owner_address(&self) -> Result<Address> {
        self.owner_address
            .parse()
            .with_context(|| format!("Invalid owner address: {}", self.owner_address))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Settings {
    /// Load settings from the file named by `OPERATOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("OPERATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` placeholders first
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.operator.contract_address()?;
        self.operator.owner_address()?;

        if self.operator.protocol_fee_percent > 100 {
            anyhow::bail!(
                "protocol_fee_percent must be at most 100, got {}",
                self.operator.protocol_fee_percent
            );
        }

        let rpc_urls: Vec<_> = self
            .chain
            .rpc_urls
            .iter()
            .filter(|url| !url.trim().is_empty())
            .collect();
        if rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }

        if self.transactions.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }
        if self.transactions.max_pending_confirmations == 0 {
            anyhow::bail!("max_pending_confirmations must be positive");
        }

        if self.interface.abi_path.is_none() && self.interface.explorer_url.is_none() {
            tracing::warn!("No interface source configured - falling back to default explorer");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
