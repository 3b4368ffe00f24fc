use std::sync::Arc;

use log::info;
use rust_decimal::Decimal;

use crate::account::{Account, AccountId};
use crate::errors::Result;
use crate::thoth::Thoth;
use crate::TransactionIsolation;

/// Account lifecycle, transfers and isolation-level reads.
pub struct AccountService {
    thoth: Arc<Thoth>,
}

impl AccountService {
    pub fn new(thoth: Arc<Thoth>) -> Self {
        Self { thoth }
    }

    /// Creates and commits a new account. The returned account has version 0.
    pub fn open_account(&self, name: &str, initial_balance: Decimal) -> Result<Account> {
        let mut txn = self.thoth.start_transaction();
        let account = txn.insert(name, initial_balance)?;
        txn.record_log(
            "OPEN",
            format!("account={}, name={}, balance={}", account.id(), name, initial_balance),
        );
        txn.commit()?;
        info!("Opened {}", account);
        Ok(account)
    }

    /// Moves `amount` from `source` to `destination` in one transaction.
    ///
    /// Both rows are version-checked at commit, so a concurrent change to
    /// either of them aborts the transfer with [`crate::ThothError::Conflict`].
    /// A failed withdrawal leaves both accounts untouched. Transferring to the
    /// same account changes nothing but still requires sufficient funds.
    pub fn transfer(&self, source: AccountId, destination: AccountId, amount: Decimal) -> Result<()> {
        info!(
            "=== Transfer started: {} -> {}, amount: {} ===",
            source, destination, amount
        );
        let mut txn = self.thoth.start_transaction();

        let mut from = txn.find(source)?;
        txn.find(destination)?;
        from.withdraw(amount)?;
        txn.write(from)?;

        // Re-read so a self-transfer sees the withdrawal staged above.
        let mut to = txn.find(destination)?;
        to.deposit(amount)?;
        txn.write(to)?;

        txn.record_log(
            "TRANSFER",
            format!("from={}, to={}, amount={}", source, destination, amount),
        );
        txn.commit()?;
        info!("=== Transfer completed ===");
        Ok(())
    }

    /// Like [`AccountService::transfer`], with both rows locked exclusively
    /// for the whole transaction. Locks are taken in ascending id order.
    pub fn transfer_with_lock(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        info!(
            "=== Locked transfer started: {} -> {}, amount: {} ===",
            source, destination, amount
        );
        let mut txn = self.thoth.start_transaction();

        let (first, second) = if source <= destination {
            (source, destination)
        } else {
            (destination, source)
        };
        txn.find_for_exclusive_access(first)?;
        txn.find_for_exclusive_access(second)?;

        let mut from = txn.find_for_exclusive_access(source)?;
        from.withdraw(amount)?;
        txn.write(from)?;

        let mut to = txn.find_for_exclusive_access(destination)?;
        to.deposit(amount)?;
        txn.write(to)?;

        txn.record_log(
            "TRANSFER",
            format!("from={}, to={}, amount={}, locked", source, destination, amount),
        );
        txn.commit()?;
        info!("=== Locked transfer completed ===");
        Ok(())
    }

    /// Reads an account in its own transaction at `isolation_level`.
    pub fn read_at_isolation(
        &self,
        id: AccountId,
        isolation_level: TransactionIsolation,
    ) -> Result<Account> {
        info!("=== Reading account {} at {:?} ===", id, isolation_level);
        let mut txn = self.thoth.start_transaction_with(isolation_level);
        let account = txn.find(id)?;
        txn.commit()?;
        Ok(account)
    }

    /// Runs `f` on an exclusively locked account and commits the result.
    ///
    /// Concurrent callers for the same account run one after another, each
    /// seeing the previous caller's committed state. If `f` fails, nothing is
    /// written and the lock is released. An account `f` leaves unchanged is not
    /// written, so its version stays the same.
    pub fn with_exclusive_access<R, F>(&self, id: AccountId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Account) -> Result<R>,
    {
        let mut txn = self.thoth.start_transaction();
        let mut account = txn.find_for_exclusive_access(id)?;
        let before = account.clone();
        let result = f(&mut account)?;
        if account != before {
            txn.write(account)?;
        }
        txn.commit()?;
        Ok(result)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Account>> {
        let mut txn = self.thoth.start_transaction();
        let account = txn.find_by_name(name)?;
        txn.commit()?;
        Ok(account)
    }

    /// Accounts with `min <= balance <= max`, by ascending id.
    pub fn find_by_balance_between(
        &self,
        min: Decimal,
        max: Decimal,
        isolation_level: TransactionIsolation,
    ) -> Result<Vec<Account>> {
        let mut txn = self.thoth.start_transaction_with(isolation_level);
        let accounts = txn.scan_balance_between(min, max)?;
        txn.commit()?;
        Ok(accounts)
    }
}
