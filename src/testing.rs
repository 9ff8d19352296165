//! Shared test fixtures: the operator ABI and a scripted in-memory chain

use crate::chain::{ChainClient, TxStatus};
use crate::contract::ContractDescriptor;
use crate::error::{OperatorError, OperatorResult};

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, Transaction, H256, U256, U64};
use ethers::utils::rlp;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const OPERATOR_ABI: &str = r#"[
  {"type":"function","name":"valueWithoutEarnings","stateMutability":"view","inputs":[],
   "outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"getSponsorshipsAndEarnings","stateMutability":"view","inputs":[],
   "outputs":[{"name":"addresses","type":"address[]"},{"name":"earnings","type":"uint256[]"},
              {"name":"maxAllowedEarnings","type":"uint256"}]},
  {"type":"function","name":"stakedInto","stateMutability":"view",
   "inputs":[{"name":"","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"undelegationQueue","stateMutability":"view","inputs":[],
   "outputs":[{"name":"queue","type":"tuple[]","components":[
     {"name":"delegator","type":"address"},{"name":"amountWei","type":"uint256"},
     {"name":"timestamp","type":"uint256"}]}]},
  {"type":"function","name":"stake","stateMutability":"nonpayable",
   "inputs":[{"name":"sponsorship","type":"address"},{"name":"amountWei","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"reduceStakeTo","stateMutability":"nonpayable",
   "inputs":[{"name":"sponsorship","type":"address"},{"name":"targetStakeWei","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"withdrawEarningsFromSponsorships","stateMutability":"nonpayable",
   "inputs":[{"name":"sponsorshipAddresses","type":"address[]"}],"outputs":[]}
]"#;

/// Well-known development key; never holds funds
pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn contract_address() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn operator_descriptor() -> ContractDescriptor {
    ContractDescriptor::from_json(contract_address(), OPERATOR_ABI).expect("fixture ABI")
}

pub fn test_wallet() -> LocalWallet {
    TEST_KEY.parse().expect("fixture key")
}

/// How `transaction_status` answers for broadcast hashes
#[derive(Debug, Clone, Copy)]
pub enum LookupScript {
    Mined,
    AlwaysPending,
    NotFoundFor(usize),
    /// The lookup hangs for an hour, then reports pending
    Stalled,
}

type Responder = Box<dyn Fn(Vec<Token>) -> OperatorResult<Vec<Token>> + Send + Sync>;

struct State {
    pending_nonce: u64,
    broadcasts: Vec<Transaction>,
    broadcast_attempts: usize,
    failing_broadcasts: HashSet<usize>,
    gas_failures: usize,
    lookup: LookupScript,
    polls: usize,
    responders: HashMap<[u8; 4], (String, Responder)>,
}

/// In-memory chain that records every broadcast transaction
pub struct TestChain {
    descriptor: ContractDescriptor,
    pub gas_price: U256,
    pub chain_id: u64,
    state: Mutex<State>,
}

impl TestChain {
    pub fn new(pending_nonce: u64) -> Arc<Self> {
        Arc::new(Self {
            descriptor: operator_descriptor(),
            gas_price: U256::from(30_000_000_000u64),
            chain_id: 137,
            state: Mutex::new(State {
                pending_nonce,
                broadcasts: Vec::new(),
                broadcast_attempts: 0,
                failing_broadcasts: HashSet::new(),
                gas_failures: 0,
                lookup: LookupScript::Mined,
                polls: 0,
                responders: HashMap::new(),
            }),
        })
    }

    /// Answer read calls to `method` with `f(decoded args)`
    pub fn respond(
        &self,
        method: &str,
        f: impl Fn(Vec<Token>) -> OperatorResult<Vec<Token>> + Send + Sync + 'static,
    ) {
        let selector = self
            .descriptor
            .function(method)
            .expect("fixture method")
            .short_signature();
        self.state
            .lock()
            .unwrap()
            .responders
            .insert(selector, (method.to_string(), Box::new(f)));
    }

    /// Fail the broadcast attempt with this zero-based index
    pub fn fail_broadcast(&self, attempt: usize) {
        self.state.lock().unwrap().failing_broadcasts.insert(attempt);
    }

    pub fn fail_gas_price(&self, times: usize) {
        self.state.lock().unwrap().gas_failures = times;
    }

    pub fn set_lookup(&self, script: LookupScript) {
        self.state.lock().unwrap().lookup = script;
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn nonces(&self) -> Vec<u64> {
        self.broadcasts().iter().map(|tx| tx.nonce.as_u64()).collect()
    }

    /// Decoded (method, args) of every broadcast transaction, in broadcast order
    pub fn sent_calls(&self) -> Vec<(String, Vec<Token>)> {
        self.broadcasts()
            .iter()
            .map(|tx| {
                let function = self
                    .descriptor
                    .method_for_selector(&tx.input)
                    .expect("known selector");
                let args = function.decode_input(&tx.input[4..]).expect("valid input");
                (function.name.clone(), args)
            })
            .collect()
    }
}

#[async_trait]
impl ChainClient for TestChain {
    async fn gas_price(&self) -> OperatorResult<U256> {
        let mut state = self.state.lock().unwrap();
        if state.gas_failures > 0 {
            state.gas_failures -= 1;
            return Err(OperatorError::GasEstimation("fee oracle unavailable".into()));
        }
        Ok(self.gas_price)
    }

    async fn chain_id(&self) -> OperatorResult<u64> {
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> OperatorResult<u64> {
        Ok(self.state.lock().unwrap().pending_nonce)
    }

    async fn call(&self, to: Address, data: Bytes) -> OperatorResult<Bytes> {
        assert_eq!(to, self.descriptor.address());
        let state = self.state.lock().unwrap();
        let selector = <[u8; 4]>::try_from(&data[..4]).expect("selector");
        let (method, responder) = state
            .responders
            .get(&selector)
            .ok_or_else(|| OperatorError::Remote("execution reverted".into()))?;
        let args = self
            .descriptor
            .function(method)?
            .decode_input(&data[4..])
            .map_err(|e| OperatorError::Remote(e.to_string()))?;
        let outputs = responder(args)?;
        Ok(ethers::abi::encode(&outputs).into())
    }

    async fn broadcast(&self, raw: Bytes) -> OperatorResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        let attempt = state.broadcast_attempts;
        state.broadcast_attempts += 1;
        if state.failing_broadcasts.contains(&attempt) {
            return Err(OperatorError::Broadcast("connection reset".into()));
        }

        let tx: Transaction =
            rlp::decode(&raw).map_err(|e| OperatorError::Broadcast(e.to_string()))?;
        if tx.nonce.as_u64() != state.pending_nonce {
            return Err(OperatorError::Broadcast(format!(
                "nonce too low/high: expected {}, got {}",
                state.pending_nonce, tx.nonce
            )));
        }
        state.pending_nonce += 1;
        state.broadcasts.push(tx);
        Ok(())
    }

    async fn transaction_status(&self, hash: H256) -> OperatorResult<TxStatus> {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            let stalled = matches!(state.lookup, LookupScript::Stalled);
            if stalled {
                state.polls += 1;
            }
            stalled
        };
        if stalled {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            return Ok(TxStatus::Pending);
        }

        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        let known = state.broadcasts.iter().find(|tx| tx.hash == hash).cloned();

        Ok(match (state.lookup, known) {
            (_, None) => TxStatus::NotFound,
            (LookupScript::AlwaysPending, Some(_)) => TxStatus::Pending,
            (LookupScript::NotFoundFor(n), Some(_)) if state.polls <= n => TxStatus::NotFound,
            (_, Some(mut tx)) => {
                tx.block_number = Some(U64::from(1));
                TxStatus::Mined(Box::new(tx))
            }
        })
    }
}
