//! Transaction submission with nonce serialization, gas policy and confirmation tracking

mod gas;
mod manager;
mod nonce;
mod signer;

pub use manager::{PendingTransaction, TransactionManager};
pub use signer::load_wallet;
