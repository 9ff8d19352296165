//! Method names and typed results of the Operator contract

use crate::contract::decode::{address, array, exactly, tuple, uint};
use crate::contract::CallResult;
use crate::error::{OperatorError, OperatorResult};

use ethers::abi::Token;
use ethers::types::{Address, U256};
use serde::Serialize;

pub const VALUE_WITHOUT_EARNINGS: &str = "valueWithoutEarnings";
pub const SPONSORSHIPS_AND_EARNINGS: &str = "getSponsorshipsAndEarnings";
pub const STAKED_INTO: &str = "stakedInto";
pub const UNDELEGATION_QUEUE: &str = "undelegationQueue";
pub const STAKE: &str = "stake";
pub const REDUCE_STAKE_TO: &str = "reduceStakeTo";
pub const WITHDRAW_EARNINGS: &str = "withdrawEarningsFromSponsorships";

/// Sponsorships the operator is staked into, with their unwithdrawn earnings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorshipsAndEarnings {
    pub addresses: Vec<Address>,
    pub earnings: Vec<U256>,
    pub max_allowed_earnings: U256,
}

impl SponsorshipsAndEarnings {
    /// (sponsorship, earnings) pairs in contract order
    pub fn iter(&self) -> impl Iterator<Item = (Address, U256)> + '_ {
        self.addresses
            .iter()
            .copied()
            .zip(self.earnings.iter().copied())
    }
}

impl CallResult for SponsorshipsAndEarnings {
    fn from_tokens(method: &str, tokens: Vec<Token>) -> OperatorResult<Self> {
        let [addresses, earnings, max_allowed] = exactly::<3>(method, tokens)?;
        let addresses = array(method, addresses, address)?;
        let earnings = array(method, earnings, uint)?;

        if addresses.len() != earnings.len() {
            return Err(OperatorError::decoding(
                method,
                format!(
                    "{} sponsorships but {} earnings entries",
                    addresses.len(),
                    earnings.len()
                ),
            ));
        }

        Ok(Self {
            addresses,
            earnings,
            max_allowed_earnings: uint(method, max_allowed)?,
        })
    }
}

/// One sponsorship's current stake and earnings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorshipStake {
    pub sponsorship: Address,
    pub staked: U256,
    pub earnings: U256,
}

/// Per-sponsorship stake in contract order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployedStake {
    pub sponsorships: Vec<SponsorshipStake>,
    pub total_deployed: U256,
}

impl DeployedStake {
    pub fn new(sponsorships: Vec<SponsorshipStake>) -> OperatorResult<Self> {
        let mut total_deployed = U256::zero();
        for stake in &sponsorships {
            total_deployed = total_deployed.checked_add(stake.staked).ok_or_else(|| {
                OperatorError::decoding(STAKED_INTO, "total deployed stake overflows uint256")
            })?;
        }
        Ok(Self {
            sponsorships,
            total_deployed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndelegationEntry {
    pub delegator: Address,
    pub amount: U256,
    pub timestamp: U256,
}

fn undelegation_entry(method: &str, token: Token) -> OperatorResult<UndelegationEntry> {
    let [delegator, amount, timestamp] = exactly::<3>(method, tuple(method, token)?)?;
    Ok(UndelegationEntry {
        delegator: address(method, delegator)?,
        amount: uint(method, amount)?,
        timestamp: uint(method, timestamp)?,
    })
}

/// Pending undelegations, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UndelegationQueue(pub Vec<UndelegationEntry>);

impl CallResult for UndelegationQueue {
    fn from_tokens(method: &str, tokens: Vec<Token>) -> OperatorResult<Self> {
        let [queue] = exactly::<1>(method, tokens)?;
        array(method, queue, undelegation_entry).map(UndelegationQueue)
    }
}
