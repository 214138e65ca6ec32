//! Ports for collaborators that live outside the core.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ChatId, UserId};

/// Credit ledger debited once per successful transformation.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Debit `amount` if the balance allows it. Returns `false` (and debits nothing) otherwise.
    async fn try_debit(&self, user: UserId, amount: u64) -> bool;

    async fn balance(&self, user: UserId) -> u64;
}

/// Receives the owner notification when the reaper evicts an idle session.
#[async_trait]
pub trait IdleNotifier: Send + Sync {
    async fn notify_idle_timeout(&self, owner: UserId, reply: ChatId);
}

/// In-process ledger; balances are lost on restart.
pub struct MemoryLedger {
    starting_balance: u64,
    balances: Mutex<HashMap<UserId, u64>>,
}

impl MemoryLedger {
    pub fn new(starting_balance: u64) -> Self {
        Self {
            starting_balance,
            balances: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn try_debit(&self, user: UserId, amount: u64) -> bool {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(user).or_insert(self.starting_balance);
        if *balance < amount {
            return false;
        }
        *balance -= amount;
        true
    }

    async fn balance(&self, user: UserId) -> u64 {
        self.balances
            .lock()
            .await
            .get(&user)
            .copied()
            .unwrap_or(self.starting_balance)
    }
}
