//! Typed operations on the Operator contract
//!
//! Every read and send goes through the shared [`TransactionManager`], so the
//! facade can be cloned freely between the HTTP layer and the allocation engine.

pub mod calls;

pub use calls::{
    DeployedStake, SponsorshipStake, SponsorshipsAndEarnings, UndelegationEntry,
    UndelegationQueue,
};

use crate::error::OperatorResult;
use crate::tx::{PendingTransaction, TransactionManager};

use ethers::abi::Token;
use ethers::types::{Address, Transaction, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct Operator {
    tx: Arc<TransactionManager>,
    owner: Address,
    confirmation_timeout: Duration,
}

impl Operator {
    pub fn new(tx: Arc<TransactionManager>, owner: Address, confirmation_timeout: Duration) -> Self {
        Self {
            tx,
            owner,
            confirmation_timeout,
        }
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.tx
    }

    pub fn address(&self) -> Address {
        self.tx.contract_address()
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn signer_address(&self) -> Address {
        self.tx.signer_address()
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    // Reads

    pub async fn value_without_earnings(&self) -> OperatorResult<U256> {
        self.tx.call(calls::VALUE_WITHOUT_EARNINGS, &[]).await
    }

    pub async fn sponsorships_and_earnings(&self) -> OperatorResult<SponsorshipsAndEarnings> {
        self.tx.call(calls::SPONSORSHIPS_AND_EARNINGS, &[]).await
    }

    pub async fn staked_into(&self, sponsorship: Address) -> OperatorResult<U256> {
        self.tx
            .call(calls::STAKED_INTO, &[Token::Address(sponsorship)])
            .await
    }

    /// Sponsorship list followed by one `stakedInto` read per sponsorship
    pub async fn deployed_stake(&self) -> OperatorResult<DeployedStake> {
        let listing = self.sponsorships_and_earnings().await?;

        let mut sponsorships = Vec::with_capacity(listing.addresses.len());
        for (sponsorship, earnings) in listing.iter() {
            let staked = self.staked_into(sponsorship).await?;
            debug!(
                "Sponsorship {:?}: staked {} earnings {}",
                sponsorship, staked, earnings
            );
            sponsorships.push(SponsorshipStake {
                sponsorship,
                staked,
                earnings,
            });
        }

        DeployedStake::new(sponsorships)
    }

    pub async fn undelegation_queue(&self) -> OperatorResult<Vec<UndelegationEntry>> {
        let queue: UndelegationQueue = self.tx.call(calls::UNDELEGATION_QUEUE, &[]).await?;
        Ok(queue.0)
    }

    // Sends

    pub async fn stake(&self, sponsorship: Address, amount: U256) -> OperatorResult<H256> {
        self.tx.send(calls::STAKE, &stake_args(sponsorship, amount)).await
    }

    pub(crate) async fn submit_stake(
        &self,
        sponsorship: Address,
        amount: U256,
    ) -> OperatorResult<PendingTransaction> {
        self.tx
            .submit(calls::STAKE, &stake_args(sponsorship, amount))
            .await
    }

    pub async fn reduce_stake_to(&self, sponsorship: Address, amount: U256) -> OperatorResult<H256> {
        self.tx
            .send(calls::REDUCE_STAKE_TO, &stake_args(sponsorship, amount))
            .await
    }

    pub async fn withdraw_earnings(&self, sponsorships: &[Address]) -> OperatorResult<H256> {
        self.tx
            .send(calls::WITHDRAW_EARNINGS, &withdraw_args(sponsorships))
            .await
    }

    /// Withdraw and block until the withdrawal is mined
    pub async fn withdraw_earnings_and_wait(
        &self,
        sponsorships: &[Address],
    ) -> OperatorResult<Transaction> {
        self.tx
            .send_and_wait(
                calls::WITHDRAW_EARNINGS,
                &withdraw_args(sponsorships),
                self.confirmation_timeout,
            )
            .await
    }
}

fn stake_args(sponsorship: Address, amount: U256) -> [Token; 2] {
    [Token::Address(sponsorship), Token::Uint(amount)]
}

fn withdraw_args(sponsorships: &[Address]) -> [Token; 1] {
    [Token::Array(
        sponsorships.iter().copied().map(Token::Address).collect(),
    )]
}
