//! Signing identity used by the transaction manager

use crate::error::{OperatorError, OperatorResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};

/// Signs transactions for exactly one address
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign `tx`; the chain id must already be set on the transaction
    async fn sign(&self, tx: &TypedTransaction) -> OperatorResult<Signature>;
}

#[async_trait]
impl TransactionSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign(&self, tx: &TypedTransaction) -> OperatorResult<Signature> {
        Signer::sign_transaction(self, tx)
            .await
            .map_err(|e| OperatorError::Signing(e.to_string()))
    }
}

/// Load the private key from the environment variable `var`
pub fn load_wallet(var: &str) -> OperatorResult<LocalWallet> {
    let key = std::env::var(var)
        .map_err(|_| OperatorError::Wallet(format!("No wallet configured. Set {}", var)))?;

    key.trim()
        .parse::<LocalWallet>()
        .map_err(|e| OperatorError::Wallet(format!("Invalid private key: {}", e)))
}
