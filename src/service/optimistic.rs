use std::sync::Arc;

use log::{debug, info};
use rust_decimal::Decimal;

use crate::account::AccountId;
use crate::errors::Result;
use crate::service::retry::{retry_on_conflict, RetryPolicy, Sleeper, ThreadSleeper};
use crate::thoth::Thoth;

/// Deposits and withdrawals protected by the account version only.
///
/// Nothing is locked while the account is read and modified. The commit
/// rejects the write with [`crate::ThothError::Conflict`] if another
/// transaction committed the account in the meantime. `withdraw_with_retry`
/// absorbs such conflicts; `withdraw_no_retry` surfaces them.
pub struct OptimisticLockService {
    thoth: Arc<Thoth>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl OptimisticLockService {
    /// Uses the store's retry configuration and real sleeps.
    pub fn new(thoth: Arc<Thoth>) -> Self {
        let policy = RetryPolicy::from(&thoth.config().retry);
        Self::with_sleeper(thoth, policy, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(thoth: Arc<Thoth>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            thoth,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deposits `amount` in a single attempt.
    pub fn deposit(&self, id: AccountId, amount: Decimal) -> Result<()> {
        let mut txn = self.thoth.start_transaction();
        let mut account = txn.find(id)?;
        account.deposit(amount)?;
        txn.write(account)?;
        txn.record_log("DEPOSIT", format!("account={}, amount={}", id, amount));
        txn.commit()
    }

    /// Withdraws `amount`, retrying on version conflicts.
    ///
    /// Each attempt re-reads the account so it starts from the latest
    /// committed version.
    ///
    /// # Errors
    ///
    /// [`crate::ThothError::RetryExhausted`] when every attempt conflicted.
    /// Insufficient funds, invalid amounts and missing accounts fail at once.
    pub fn withdraw_with_retry(&self, id: AccountId, amount: Decimal) -> Result<()> {
        retry_on_conflict(&self.policy, self.sleeper.as_ref(), id, |attempt| {
            info!(
                "Withdraw attempt {}/{}: account={}, amount={}",
                attempt, self.policy.max_attempts, id, amount
            );
            self.withdraw_once(id, amount)
        })?;
        info!("Withdraw committed: account={}, amount={}", id, amount);
        Ok(())
    }

    /// Withdraws `amount` in a single attempt; conflicts are returned as is.
    pub fn withdraw_no_retry(&self, id: AccountId, amount: Decimal) -> Result<()> {
        info!("Withdraw without retry: account={}, amount={}", id, amount);
        self.withdraw_once(id, amount)
    }

    fn withdraw_once(&self, id: AccountId, amount: Decimal) -> Result<()> {
        let mut txn = self.thoth.start_transaction();
        let mut account = txn.find(id)?;
        debug!(
            "Tx {} read account {}: balance={}, version={}",
            txn.id(),
            id,
            account.balance(),
            account.version()
        );
        account.withdraw(amount)?;
        txn.write(account)?;
        txn.record_log("WITHDRAW", format!("account={}, amount={}", id, amount));
        txn.commit()
    }
}
