use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::AccountId;

#[derive(Error, Debug)]
pub enum ThothError {
    #[error("Amount must be greater than zero, got {0}")]
    InvalidAmount(Decimal),

    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Optimistic lock conflict on account {0}")]
    Conflict(AccountId),

    #[error("Could not serialize access: {0}")]
    SerializationFailure(String),

    #[error("Gave up on account {account} after {attempts} attempts")]
    RetryExhausted { account: AccountId, attempts: u32 },

    #[error("Timed out waiting for exclusive lock on account {0}")]
    LockTimeout(AccountId),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ThothError {
    /// Whether a fresh attempt of the same unit of work may succeed.
    ///
    /// Only concurrency conflicts qualify. Business rule violations, missing
    /// accounts and lock timeouts are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ThothError::Conflict(_) | ThothError::SerializationFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ThothError>;
