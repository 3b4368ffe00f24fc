use std::sync::Arc;

use crate::account::Account;

/// Represents a committed account with an associated commit timestamp.
///
/// Rows stored in the transaction buffer are wrapped in `VersionedValue` to
/// track the timestamp of the commit that last installed them. Read sets
/// record this timestamp, and commit-time validation compares it against the
/// current one to find rows that changed underneath a transaction.
///
/// The timestamp is distinct from [`Account::version`]: the former is global
/// and drawn from the transaction counter, the latter counts mutations of one
/// account.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    /// The committed account.
    data: Arc<Account>,
    /// Commit timestamp of the transaction that installed this value.
    version: u64,
}

impl VersionedValue {
    /// Creates a new `VersionedValue`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use rust_decimal::Decimal;
    /// use thoth::prelude::*;
    ///
    /// let account = Account::new(AccountId::new(1), "alice", Decimal::from(100)).unwrap();
    /// let value = VersionedValue::new(Arc::new(account), 7);
    /// assert_eq!(value.version(), 7);
    /// assert_eq!(value.data().balance(), Decimal::from(100));
    /// ```
    pub fn new(data: Arc<Account>, version: u64) -> Self {
        Self { data, version }
    }

    /// Returns a reference to the committed account.
    pub fn data(&self) -> &Arc<Account> {
        &self.data
    }

    /// Returns the commit timestamp of the value.
    pub fn version(&self) -> u64 {
        self.version
    }
}
