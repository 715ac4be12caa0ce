//! In-process chain simulation.
//!
//! Keeps balances, per-sender nonces, role assignments and a log of every
//! accepted transaction behind a single lock. Transactions take effect when
//! they are submitted; confirmation only waits out the configured latency.
//! Failure switches let tests break each chain operation independently. A
//! failed confirmation still leaves its transaction applied, like a receipt
//! wait that timed out on a transaction that landed. Use
//! [`MemoryChain::drop_submissions`] for transactions that never land.

use crate::chain::ChainProvider;
use crate::error::PoolError;
use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What a recorded transaction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxKind {
    Transfer { to: Address, value: U256 },
    GrantRole { contract: Address, role: B256, account: Address },
}

/// A transaction accepted by the simulated chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub kind: TxKind,
}

#[derive(Default)]
struct Ledger {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    roles: HashSet<(Address, B256, Address)>,
    transactions: Vec<TxRecord>,
    // sends currently inside `transfer`/`grant_role`, per sender
    in_flight: HashMap<Address, usize>,
    max_in_flight: HashMap<Address, usize>,
}

#[derive(Default)]
pub struct MemoryChain {
    ledger: Mutex<Ledger>,
    latency: Option<Duration>,
    gas_cost: U256,
    fail_balance: AtomicBool,
    fail_submit: AtomicBool,
    fail_confirm: AtomicBool,
    drop_submit: AtomicBool,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every chain call, giving concurrent callers a
    /// chance to interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fee charged to the sender of every transaction.
    pub fn with_gas_cost(mut self, gas_cost: U256) -> Self {
        self.gas_cost = gas_cost;
        self
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.ledger().balances.insert(address, balance);
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.ledger()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// Burn `amount` from `address`, as gas spent by work done with a slot.
    pub fn spend(&self, address: Address, amount: U256) {
        let mut ledger = self.ledger();
        let balance = ledger.balances.entry(address).or_default();
        *balance = balance.saturating_sub(amount);
    }

    pub fn grant_directly(&self, contract: Address, role: B256, account: Address) {
        self.ledger().roles.insert((contract, role, account));
    }

    pub fn holds_role(&self, contract: Address, role: B256, account: Address) -> bool {
        self.ledger().roles.contains(&(contract, role, account))
    }

    pub fn transactions(&self) -> Vec<TxRecord> {
        self.ledger().transactions.clone()
    }

    /// Transfers sent from `from`, in submission order.
    pub fn transfers_from(&self, from: Address) -> Vec<(Address, U256)> {
        self.ledger()
            .transactions
            .iter()
            .filter(|tx| tx.from == from)
            .filter_map(|tx| match tx.kind {
                TxKind::Transfer { to, value } => Some((to, value)),
                TxKind::GrantRole { .. } => None,
            })
            .collect()
    }

    pub fn role_grants(&self) -> Vec<TxRecord> {
        self.ledger()
            .transactions
            .iter()
            .filter(|tx| matches!(tx.kind, TxKind::GrantRole { .. }))
            .cloned()
            .collect()
    }

    /// Highest number of overlapping sends ever observed from `sender`.
    pub fn max_concurrent_sends(&self, sender: Address) -> usize {
        self.ledger()
            .max_in_flight
            .get(&sender)
            .copied()
            .unwrap_or_default()
    }

    pub fn fail_balance_queries(&self, fail: bool) {
        self.fail_balance.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_confirmations(&self, fail: bool) {
        self.fail_confirm.store(fail, Ordering::SeqCst);
    }

    /// Accept submissions and hand back a hash, but never apply or record
    /// them. Waiting for such a transaction fails.
    pub fn drop_submissions(&self, enabled: bool) {
        self.drop_submit.store(enabled, Ordering::SeqCst);
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Run a send from `from` through latency, tracking overlap, then apply it.
    async fn submit(&self, from: Address, kind: TxKind) -> Result<TxHash, PoolError> {
        {
            let mut ledger = self.ledger();
            let count = ledger.in_flight.entry(from).or_default();
            *count += 1;
            let current = *count;
            let max = ledger.max_in_flight.entry(from).or_default();
            *max = (*max).max(current);
        }

        self.delay().await;

        let mut ledger = self.ledger();
        if let Some(count) = ledger.in_flight.get_mut(&from) {
            *count -= 1;
        }

        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(PoolError::Transaction(format!(
                "Submission from {from} rejected by node"
            )));
        }

        let value = match &kind {
            TxKind::Transfer { value, .. } => *value,
            TxKind::GrantRole { .. } => U256::ZERO,
        };
        let cost = value.saturating_add(self.gas_cost);
        let available = ledger.balances.get(&from).copied().unwrap_or_default();
        if available < cost {
            return Err(PoolError::Transaction(format!(
                "Insufficient funds for {from}: have {available}, need {cost}"
            )));
        }

        if self.drop_submit.load(Ordering::SeqCst) {
            // Nonce is left unused; a later send reuses it
            let nonce = ledger.nonces.get(&from).copied().unwrap_or_default();
            return Ok(tx_hash(from, nonce));
        }

        let nonce = {
            let next = ledger.nonces.entry(from).or_default();
            let nonce = *next;
            *next += 1;
            nonce
        };

        ledger.balances.insert(from, available - cost);
        match &kind {
            TxKind::Transfer { to, value } => {
                let balance = ledger.balances.entry(*to).or_default();
                *balance = balance.saturating_add(*value);
            }
            TxKind::GrantRole {
                contract,
                role,
                account,
            } => {
                ledger.roles.insert((*contract, *role, *account));
            }
        }

        let hash = tx_hash(from, nonce);
        ledger.transactions.push(TxRecord {
            hash,
            from,
            nonce,
            kind,
        });
        Ok(hash)
    }
}

fn tx_hash(from: Address, nonce: u64) -> TxHash {
    let mut preimage = from.to_vec();
    preimage.extend_from_slice(&nonce.to_be_bytes());
    keccak256(&preimage)
}

impl ChainProvider for MemoryChain {
    async fn balance(&self, address: Address) -> Result<U256, PoolError> {
        self.delay().await;
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(PoolError::Rpc(format!(
                "Balance query for {address} failed: node unavailable"
            )));
        }
        Ok(self.balance_of(address))
    }

    async fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: U256,
    ) -> Result<TxHash, PoolError> {
        self.submit(from.address(), TxKind::Transfer { to, value })
            .await
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<(), PoolError> {
        self.delay().await;
        if self.fail_confirm.load(Ordering::SeqCst) {
            return Err(PoolError::Transaction(format!(
                "No receipt for {tx}: timed out"
            )));
        }

        let known = self.ledger().transactions.iter().any(|t| t.hash == tx);
        if !known {
            return Err(PoolError::Transaction(format!(
                "Transaction {tx} not found on chain"
            )));
        }
        Ok(())
    }

    async fn has_role(
        &self,
        contract: Address,
        role: B256,
        account: Address,
    ) -> Result<bool, PoolError> {
        self.delay().await;
        Ok(self.holds_role(contract, role, account))
    }

    async fn grant_role(
        &self,
        admin: &PrivateKeySigner,
        contract: Address,
        role: B256,
        account: Address,
    ) -> Result<TxHash, PoolError> {
        self.submit(
            admin.address(),
            TxKind::GrantRole {
                contract,
                role,
                account,
            },
        )
        .await
    }
}
