pub mod account;
pub mod config;
pub mod conflict;
pub mod data_store;
pub mod errors;
pub mod isolation;
pub mod service;
pub mod storage;
pub mod thoth;
pub mod transaction;

// Re-export key types and structs for easier access
pub use account::{Account, AccountId, TxLog};
pub use config::{RetryConfig, ThothConfig};
pub use conflict::detection::ConflictType;
pub use data_store::txn_buffer::TxnBuffer;
pub use data_store::versioned_value::VersionedValue;
pub use errors::{Result, ThothError};
pub use isolation::TransactionIsolation;
pub use service::{AccountService, OptimisticLockService, RetryPolicy, Sleeper, ThreadSleeper};
pub use storage::{InMemoryStorage, Storage, StorageMutation};
pub use thoth::{prelude, Thoth};
pub use transaction::{BalanceRange, Transaction};
