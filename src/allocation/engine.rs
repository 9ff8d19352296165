//! Drives allocation plans through the transaction manager

use super::plan::AllocationPlan;
use crate::error::{OperatorError, OperatorResult};
use crate::operator::Operator;

use ethers::types::{Address, Transaction, H256, U256};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Background confirmation waits for the transactions of one run
#[derive(Default)]
pub struct Confirmations {
    handles: Vec<(H256, JoinHandle<OperatorResult<Transaction>>)>,
}

impl Confirmations {
    pub fn hashes(&self) -> Vec<H256> {
        self.handles.iter().map(|(hash, _)| *hash).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Block until every watcher has finished, in submission order
    pub async fn wait_all(self) -> Vec<(H256, OperatorResult<Transaction>)> {
        let mut results = Vec::with_capacity(self.handles.len());
        for (hash, handle) in self.handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(OperatorError::Internal(e.to_string())));
            results.push((hash, result));
        }
        results
    }
}

#[derive(Serialize)]
pub struct AllocationOutcome {
    pub run_id: Uuid,
    /// Confirmed withdrawal that preceded a compound run
    pub withdrawal: Option<H256>,
    pub plan: AllocationPlan,
    pub submitted: Vec<H256>,
    #[serde(skip_serializing)]
    pub confirmations: Confirmations,
}

impl AllocationOutcome {
    fn empty(run_id: Uuid) -> Self {
        Self {
            run_id,
            withdrawal: None,
            plan: AllocationPlan::empty(),
            submitted: Vec::new(),
            confirmations: Confirmations::default(),
        }
    }
}

#[derive(Clone)]
pub struct AllocationEngine {
    operator: Operator,
    protocol_fee_percent: u64,
}

impl AllocationEngine {
    pub fn new(operator: Operator, protocol_fee_percent: u64) -> Self {
        Self {
            operator,
            protocol_fee_percent,
        }
    }

    /// Stake all unstaked value in proportion to the current per-sponsorship stake.
    ///
    /// Returns once every stake transaction is broadcast; confirmations are
    /// tracked in the returned outcome.
    pub async fn stake_pro_rata(&self) -> OperatorResult<AllocationOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("allocation", %run_id, kind = "stake_pro_rata");

        let result = self.stake_pro_rata_run(run_id).instrument(span).await;
        crate::metrics::record_allocation_run("stake_pro_rata", result.is_ok());
        result
    }

    async fn stake_pro_rata_run(&self, run_id: Uuid) -> OperatorResult<AllocationOutcome> {
        let total_value = self.operator.value_without_earnings().await?;
        let deployed = self.operator.deployed_stake().await?;

        if total_value <= deployed.total_deployed {
            info!(
                "Nothing to stake: value {} already deployed ({})",
                total_value, deployed.total_deployed
            );
            return Ok(AllocationOutcome::empty(run_id));
        }

        let unstaked = total_value - deployed.total_deployed;
        let buckets: Vec<(Address, U256)> = deployed
            .sponsorships
            .iter()
            .map(|s| (s.sponsorship, s.staked))
            .collect();
        let plan = AllocationPlan::pro_rata(&buckets, unstaked)?;

        info!(
            "Staking {} across {} sponsorships",
            unstaked,
            plan.nonzero().count()
        );

        let (submitted, confirmations) = self.execute(&plan).await?;
        Ok(AllocationOutcome {
            run_id,
            withdrawal: None,
            plan,
            submitted,
            confirmations,
        })
    }

    /// Withdraw all earnings, then restake them (minus the protocol fee) into
    /// the sponsorships they came from.
    pub async fn withdraw_and_compound(&self) -> OperatorResult<AllocationOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("allocation", %run_id, kind = "withdraw_and_compound");

        let result = self.withdraw_and_compound_run(run_id).instrument(span).await;
        crate::metrics::record_allocation_run("withdraw_and_compound", result.is_ok());
        result
    }

    async fn withdraw_and_compound_run(&self, run_id: Uuid) -> OperatorResult<AllocationOutcome> {
        let deployed = self.operator.deployed_stake().await?;

        let earning: Vec<Address> = deployed
            .sponsorships
            .iter()
            .filter(|s| !s.earnings.is_zero())
            .map(|s| s.sponsorship)
            .collect();
        if earning.is_empty() {
            info!("No earnings to withdraw");
            return Ok(AllocationOutcome::empty(run_id));
        }

        info!("Withdrawing earnings from {} sponsorships", earning.len());
        let withdrawal = self
            .operator
            .withdraw_earnings_and_wait(&earning)
            .await
            .map_err(|e| with_prior(&[], e))?;

        let plan = AllocationPlan::compound(&deployed, self.protocol_fee_percent);
        info!(
            "Compounding {} into {} sponsorships",
            plan.total(),
            plan.nonzero().count()
        );

        let (submitted, confirmations) = self
            .execute(&plan)
            .await
            .map_err(|e| with_prior(&[withdrawal.hash], e))?;

        Ok(AllocationOutcome {
            run_id,
            withdrawal: Some(withdrawal.hash),
            plan,
            submitted,
            confirmations,
        })
    }

    /// One serial `stake` send per nonzero entry; aborts on the first failure
    async fn execute(&self, plan: &AllocationPlan) -> OperatorResult<(Vec<H256>, Confirmations)> {
        let timeout = self.operator.confirmation_timeout();
        let mut confirmations = Confirmations::default();

        for entry in plan.nonzero() {
            match self
                .operator
                .submit_stake(entry.sponsorship, entry.amount)
                .await
            {
                Ok(pending) => {
                    let hash = pending.hash;
                    let handle = self.operator.transactions().watch(pending, timeout);
                    confirmations.handles.push((hash, handle));
                }
                Err(e) => {
                    warn!(
                        "Staking {} into {:?} failed after {} submissions: {}",
                        entry.amount,
                        entry.sponsorship,
                        confirmations.len(),
                        e
                    );
                    return Err(with_prior(&confirmations.hashes(), e));
                }
            }
        }

        Ok((confirmations.hashes(), confirmations))
    }
}

/// Attach already-submitted hashes to `error`
fn with_prior(prior: &[H256], error: OperatorError) -> OperatorError {
    let (mut submitted, source) = match error {
        OperatorError::PartialSubmission { submitted, source } => (submitted, *source),
        other => (other.submitted(), other),
    };
    if prior.is_empty() && submitted.is_empty() {
        return source;
    }

    submitted.splice(0..0, prior.iter().copied());
    OperatorError::PartialSubmission {
        submitted,
        source: Box::new(source),
    }
}
