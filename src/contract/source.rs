//! Sources of contract ABI definitions

use crate::error::{OperatorError, OperatorResult};

use async_trait::async_trait;
use ethers::types::Address;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EXPLORER_URL: &str = "https://api.polygonscan.com/api";

/// Resolves a contract address to its ABI JSON
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    async fn fetch_interface(&self, address: Address) -> OperatorResult<String>;
}

/// Explorer `getabi` response; `result` is the ABI as a JSON-encoded string
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    message: String,
    result: String,
}

/// Etherscan-family block explorer (Polygonscan by default)
pub struct ExplorerSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerSource {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> OperatorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OperatorError::Interface(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string()),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl InterfaceSource for ExplorerSource {
    async fn fetch_interface(&self, address: Address) -> OperatorResult<String> {
        let address = format!("{:?}", address);
        let mut query = vec![
            ("module", "contract"),
            ("action", "getabi"),
            ("address", address.as_str()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }

        debug!("Fetching ABI for {} from {}", address, self.base_url);

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| OperatorError::Interface(format!("Explorer request failed: {}", e)))?;

        let body: ExplorerResponse = response
            .json()
            .await
            .map_err(|e| OperatorError::Interface(format!("Unreadable explorer response: {}", e)))?;

        into_abi(body)
    }
}

fn into_abi(response: ExplorerResponse) -> OperatorResult<String> {
    if response.status != "1" {
        return Err(OperatorError::Interface(format!(
            "Error fetching contract ABI: {} ({})",
            response.message, response.result
        )));
    }
    Ok(response.result)
}

/// ABI JSON stored on local disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InterfaceSource for FileSource {
    async fn fetch_interface(&self, _address: Address) -> OperatorResult<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            OperatorError::Interface(format!("Failed to read ABI file {:?}: {}", self.path, e))
        })
    }
}
