//! Account operations built on top of [`crate::Thoth`] transactions.

/// Optimistic (version-checked) deposits and withdrawals.
pub mod optimistic;
/// Bounded retry with randomized backoff.
pub mod retry;
/// Transfers, isolation-level reads and pessimistic access.
pub mod transfer;

pub use optimistic::OptimisticLockService;
pub use retry::{retry_on_conflict, RetryPolicy, Sleeper, ThreadSleeper};
pub use transfer::AccountService;
