//! In-memory stand-in for the Airdrop1155 contract and its node

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;

use crate::chain::{AirdropContract, ChainResult, MintReceipt, MintRequest};
use crate::error::ChainError;

/// Gas charged per minted recipient by the mock
pub const MOCK_GAS_PER_RECIPIENT: u64 = 50_000;

#[derive(Default)]
struct MockState {
    balances: HashMap<(Address, U256), U256>,
    next_nonce: u64,
    gas_price: u128,
    native_balance: U256,
    block_number: u64,

    nonce_reads: usize,
    balance_calls: Vec<usize>,
    failing_accounts: HashSet<Address>,
    fail_next_balance: u32,

    sent: Vec<MintRequest>,
    in_flight: HashMap<TxHash, MintRequest>,
    fail_send_nonces: HashSet<u64>,
    revert_nonces: HashSet<u64>,
    timeout_nonces: HashSet<u64>,
}

/// Mock chain. Mints land on confirmation; reverted batches change nothing;
/// timed-out batches still land, like a transaction the node mines after the
/// caller stopped waiting.
pub struct MockChain {
    signer: Address,
    state: Mutex<MockState>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            signer: Address::repeat_byte(0xd0),
            state: Mutex::new(MockState {
                gas_price: 1_000_000_000,
                native_balance: U256::from(10u128.pow(19)),
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_balance(&self, account: Address, token_id: U256, balance: U256) {
        self.state().balances.insert((account, token_id), balance);
    }

    pub fn balance(&self, account: Address, token_id: U256) -> U256 {
        self.state()
            .balances
            .get(&(account, token_id))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        self.state().next_nonce = nonce;
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    /// Every balance query that includes `account` fails
    pub fn fail_balance_queries_containing(&self, account: Address) {
        self.state().failing_accounts.insert(account);
    }

    pub fn clear_balance_failures(&self) {
        let mut state = self.state();
        state.failing_accounts.clear();
        state.fail_next_balance = 0;
    }

    /// The next `n` balance queries fail, whatever they contain
    pub fn fail_next_balance_queries(&self, n: u32) {
        self.state().fail_next_balance = n;
    }

    /// Sending with this nonce is rejected by the node
    pub fn fail_send_for_nonce(&self, nonce: u64) {
        self.state().fail_send_nonces.insert(nonce);
    }

    /// The transaction with this nonce is mined but reverts
    pub fn revert_nonce(&self, nonce: u64) {
        self.state().revert_nonces.insert(nonce);
    }

    /// The receipt for this nonce never arrives in time, but the mint lands
    pub fn time_out_nonce(&self, nonce: u64) {
        self.state().timeout_nonces.insert(nonce);
    }

    pub fn clear_write_failures(&self) {
        let mut state = self.state();
        state.fail_send_nonces.clear();
        state.revert_nonces.clear();
        state.timeout_nonces.clear();
    }

    /// Sizes of every `balanceOfBatch` call, in call order
    pub fn balance_calls(&self) -> Vec<usize> {
        self.state().balance_calls.clone()
    }

    /// Number of pending-nonce reads
    pub fn nonce_reads(&self) -> usize {
        self.state().nonce_reads
    }

    /// Every mint request the node accepted, in send order
    pub fn sent_requests(&self) -> Vec<MintRequest> {
        self.state().sent.clone()
    }

    pub fn pending_nonce_value(&self) -> u64 {
        self.state().next_nonce
    }

    fn tx_hash_for(nonce: u64) -> TxHash {
        B256::from(U256::from(nonce) + U256::from(1))
    }

    fn apply_mint(state: &mut MockState, request: &MintRequest) {
        for ((to, id), amount) in request.to.iter().zip(&request.ids).zip(&request.amounts) {
            let balance = state.balances.entry((*to, *id)).or_default();
            *balance += *amount;
        }
    }
}

#[async_trait]
impl AirdropContract for MockChain {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn pending_nonce(&self) -> ChainResult<u64> {
        let mut state = self.state();
        state.nonce_reads += 1;
        Ok(state.next_nonce)
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        Ok(self.state().gas_price)
    }

    async fn native_balance(&self, _address: Address) -> ChainResult<U256> {
        Ok(self.state().native_balance)
    }

    async fn balance_of_batch(
        &self,
        accounts: Vec<Address>,
        token_ids: Vec<U256>,
    ) -> ChainResult<Vec<U256>> {
        let mut state = self.state();
        state.balance_calls.push(accounts.len());

        if state.fail_next_balance > 0 {
            state.fail_next_balance -= 1;
            return Err(ChainError::ContractCall("balanceOfBatch: upstream unavailable".into()));
        }
        if accounts.iter().any(|a| state.failing_accounts.contains(a)) {
            return Err(ChainError::ContractCall("balanceOfBatch: execution reverted".into()));
        }
        if accounts.len() != token_ids.len() {
            return Err(ChainError::ContractCall("ERC1155: accounts and ids length mismatch".into()));
        }

        Ok(accounts
            .iter()
            .zip(&token_ids)
            .map(|(a, id)| state.balances.get(&(*a, *id)).copied().unwrap_or_default())
            .collect())
    }

    async fn send_mint_many(&self, request: &MintRequest) -> ChainResult<TxHash> {
        let mut state = self.state();

        if state.fail_send_nonces.contains(&request.nonce) {
            return Err(ChainError::Transaction("connection reset by peer".into()));
        }
        if request.nonce != state.next_nonce {
            return Err(ChainError::Transaction(format!(
                "nonce mismatch: expected {}, got {}",
                state.next_nonce, request.nonce
            )));
        }

        state.next_nonce += 1;
        state.sent.push(request.clone());
        let tx_hash = Self::tx_hash_for(request.nonce);
        state.in_flight.insert(tx_hash, request.clone());
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        _timeout: Duration,
        _confirmations: u64,
    ) -> ChainResult<MintReceipt> {
        let mut state = self.state();
        let request = state
            .in_flight
            .remove(&tx_hash)
            .ok_or_else(|| ChainError::Transaction(format!("unknown transaction {}", tx_hash)))?;

        state.block_number += 1;

        if state.revert_nonces.contains(&request.nonce) {
            return Ok(MintReceipt {
                tx_hash,
                block_number: Some(state.block_number),
                gas_used: request.gas_limit,
                success: false,
            });
        }

        Self::apply_mint(&mut state, &request);

        if state.timeout_nonces.contains(&request.nonce) {
            return Err(ChainError::ReceiptTimeout(tx_hash));
        }

        Ok(MintReceipt {
            tx_hash,
            block_number: Some(state.block_number),
            gas_used: MOCK_GAS_PER_RECIPIENT * request.to.len() as u64,
            success: true,
        })
    }
}
