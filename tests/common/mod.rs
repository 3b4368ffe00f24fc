//! Common utilities for Thoth integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use thoth::prelude::*;

/// Helper to build a whole-unit decimal.
pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Creates a store over fresh in-memory storage, returning both.
pub fn setup_thoth(isolation: TransactionIsolation) -> (Arc<Thoth>, Arc<InMemoryStorage>) {
    let config = ThothConfig {
        default_isolation: isolation,
        ..ThothConfig::default()
    };
    setup_thoth_with(config)
}

pub fn setup_thoth_with(config: ThothConfig) -> (Arc<Thoth>, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    let thoth = Arc::new(Thoth::new(storage.clone(), config));
    (thoth, storage)
}

/// Commits a new account and returns it.
pub fn seed_account(thoth: &Thoth, name: &str, balance: i64) -> Account {
    let mut txn = thoth.start_transaction();
    let account = txn.insert(name, dec(balance)).unwrap();
    txn.commit().unwrap();
    account
}

/// Reads the committed state of an account.
pub fn committed(thoth: &Thoth, id: AccountId) -> Account {
    let mut txn = thoth.start_transaction_with(TransactionIsolation::ReadCommitted);
    txn.find(id).unwrap()
}

/// Storage that can be switched into failing every commit.
#[derive(Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    failing: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.inner.get(id)
    }
}

impl Storage for FlakyStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ThothError::StorageError("disk on fire".to_string()));
        }
        self.inner.apply_mutations(mutations)
    }

    fn load_accounts(&self) -> Result<Vec<Account>> {
        self.inner.load_accounts()
    }
}

/// Sleeper that records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}
