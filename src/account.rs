//! Account records and the audit log entries written alongside them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ThothError};

/// Opaque identity of an account. Allocated by the store, starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountId(u64);

impl AccountId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A balance-holding record.
///
/// The balance is an exact decimal and never goes negative through
/// [`Account::withdraw`]. The version counter is owned by the store: it is 0
/// once the account is first committed and grows by one with every committed
/// mutation. A copy of an account carries the version it was read at, which is
/// what the optimistic check at commit compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AccountRecord")]
pub struct Account {
    id: AccountId,
    name: String,
    balance: Decimal,
    version: u64,
}

impl Account {
    /// Creates a not-yet-persisted account at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`ThothError::InvalidAmount`] if `balance` is negative.
    pub fn new(id: AccountId, name: impl Into<String>, balance: Decimal) -> Result<Self> {
        if balance < Decimal::ZERO {
            return Err(ThothError::InvalidAmount(balance));
        }
        Ok(Self {
            id,
            name: name.into(),
            balance,
            version: 0,
        })
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adds `amount` to the balance.
    ///
    /// # Errors
    ///
    /// [`ThothError::InvalidAmount`] if `amount` is zero or negative.
    pub fn deposit(&mut self, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        self.balance += amount;
        Ok(())
    }

    /// Subtracts `amount` from the balance.
    ///
    /// # Errors
    ///
    /// [`ThothError::InvalidAmount`] if `amount` is zero or negative, and
    /// [`ThothError::InsufficientFunds`] if the balance is smaller than `amount`.
    /// The balance is untouched on error.
    pub fn withdraw(&mut self, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        if self.balance < amount {
            return Err(ThothError::InsufficientFunds {
                account: self.id,
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Account{{id={}, name='{}', balance={}, version={}}}",
            self.id, self.name, self.balance, self.version
        )
    }
}

/// Wire shape of [`Account`]; converted through [`Account::new`]'s checks.
#[derive(Deserialize)]
struct AccountRecord {
    id: AccountId,
    name: String,
    balance: Decimal,
    version: u64,
}

impl TryFrom<AccountRecord> for Account {
    type Error = ThothError;

    fn try_from(record: AccountRecord) -> Result<Self> {
        Ok(Account::new(record.id, record.name, record.balance)?.with_version(record.version))
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(ThothError::InvalidAmount(amount));
    }
    Ok(())
}

/// Audit entry persisted in the same commit as the mutation it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLog {
    pub transaction_id: u64,
    pub operation: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl TxLog {
    pub fn new(transaction_id: u64, operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            transaction_id,
            operation: operation.into(),
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}
