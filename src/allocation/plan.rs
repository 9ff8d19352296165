//! Allocation plans: how much to add to each sponsorship

use crate::error::{OperatorError, OperatorResult};
use crate::operator::DeployedStake;

use ethers::types::{Address, U256, U512};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedStake {
    pub sponsorship: Address,
    pub amount: U256,
}

/// Ordered sponsorship -> amount mapping; zero amounts are kept as no-ops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationPlan {
    entries: Vec<PlannedStake>,
}

impl AllocationPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Split `unstaked` across `deployed` in proportion to each bucket's stake.
    ///
    /// Each share is `floor(unstaked * d / total)` computed in 512 bits. The
    /// rounding shortfall goes entirely to the first bucket with positive stake,
    /// so the plan always sums to exactly `unstaked`.
    pub fn pro_rata(deployed: &[(Address, U256)], unstaked: U256) -> OperatorResult<Self> {
        let total = deployed
            .iter()
            .fold(U512::zero(), |acc, (_, d)| acc + U512::from(*d));
        if total.is_zero() {
            return Err(OperatorError::Allocation(
                "cannot allocate pro rata without deployed stake".into(),
            ));
        }

        let mut entries = Vec::with_capacity(deployed.len());
        let mut allocated = U256::zero();
        for (sponsorship, d) in deployed {
            // d <= total, so the quotient never exceeds unstaked
            let share = U256::try_from(unstaked.full_mul(*d) / total)
                .map_err(|_| OperatorError::Allocation("share overflow".into()))?;
            allocated += share;
            entries.push(PlannedStake {
                sponsorship: *sponsorship,
                amount: share,
            });
        }

        let shortfall = unstaked - allocated;
        if !shortfall.is_zero() {
            let first = deployed
                .iter()
                .position(|(_, d)| !d.is_zero())
                .ok_or_else(|| OperatorError::Internal("no bucket with stake".into()))?;
            entries[first].amount += shortfall;
        }

        Ok(Self { entries })
    }

    /// Reinvest withdrawn earnings minus the protocol fee.
    ///
    /// Only sponsorships that both earned and already hold stake are included.
    pub fn compound(stake: &DeployedStake, protocol_fee_percent: u64) -> Self {
        let keep = U256::from(100u64.saturating_sub(protocol_fee_percent));
        let entries = stake
            .sponsorships
            .iter()
            .filter(|s| !s.earnings.is_zero() && !s.staked.is_zero())
            .map(|s| PlannedStake {
                sponsorship: s.sponsorship,
                amount: U256::try_from(s.earnings.full_mul(keep) / U512::from(100u8))
                    .unwrap_or(s.earnings),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[PlannedStake] {
        &self.entries
    }

    /// Entries that need a transaction
    pub fn nonzero(&self) -> impl Iterator<Item = &PlannedStake> {
        self.entries.iter().filter(|e| !e.amount.is_zero())
    }

    pub fn total(&self) -> U256 {
        self.entries
            .iter()
            .fold(U256::zero(), |acc, e| acc + e.amount)
    }

    pub fn is_noop(&self) -> bool {
        self.nonzero().next().is_none()
    }
}
