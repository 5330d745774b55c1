//! Credit ledger collaborator.
//!
//! The gateway itself never charges; the request-handling layer charges
//! through this interface after a successful route result, keeping
//! pricing and persistence outside the routing path.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Result of an atomic charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Charged,
    InsufficientFunds,
}

#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically deduct `amount` credits from the user's balance.
    async fn charge_atomic(&self, user_id: &str, amount: u64) -> ChargeOutcome;
}

/// Ledger that accepts every charge and only logs it. Used when billing
/// is handled out of band.
#[derive(Debug, Default)]
pub struct NullLedger;

#[async_trait]
impl CreditLedger for NullLedger {
    async fn charge_atomic(&self, user_id: &str, amount: u64) -> ChargeOutcome {
        tracing::debug!(user = %user_id, amount, "charge accepted (null ledger)");
        ChargeOutcome::Charged
    }
}

/// In-memory ledger for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: RwLock<HashMap<String, u64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deposit(&self, user_id: &str, amount: u64) {
        let mut balances = self.balances.write().await;
        *balances.entry(user_id.to_string()).or_insert(0) += amount;
    }

    pub async fn balance(&self, user_id: &str) -> u64 {
        self.balances
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn charge_atomic(&self, user_id: &str, amount: u64) -> ChargeOutcome {
        let mut balances = self.balances.write().await;
        match balances.get_mut(user_id) {
            Some(balance) if *balance >= amount => {
                *balance -= amount;
                ChargeOutcome::Charged
            }
            _ => ChargeOutcome::InsufficientFunds,
        }
    }
}
