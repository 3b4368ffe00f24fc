use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::account::AccountId;
use crate::config::ThothConfig;
use crate::data_store::lock_table::LockTable;
use crate::data_store::txn_buffer::TxnBuffer;
use crate::data_store::versioned_value::VersionedValue;
use crate::errors::Result;
use crate::storage::Storage;
use crate::transaction::Transaction;
use crate::TransactionIsolation;

/// Thoth Prelude
pub mod prelude {
    pub use crate::account::*;
    pub use crate::config::*;
    pub use crate::conflict::detection::ConflictType;
    pub use crate::data_store::txn_buffer::TxnBuffer;
    pub use crate::data_store::versioned_value::*;
    pub use crate::errors::*;
    pub use crate::isolation::*;
    pub use crate::service::*;
    pub use crate::storage::*;
    pub use crate::transaction::*;
    pub use super::Thoth;
}

/// The main entry point for the Thoth account store.
pub struct Thoth {
    /// Committed rows and published uncommitted writes.
    txn_buffer: Arc<TxnBuffer>,
    /// Exclusive row locks.
    lock_table: Arc<LockTable>,
    /// Serializes commit validation and installation.
    commit_lock: Arc<Mutex<()>>,
    /// A globally increasing counter for transaction IDs and commit timestamps.
    transaction_counter: Arc<AtomicU64>,
    /// Next account id to hand out.
    account_ids: Arc<AtomicU64>,
    /// The storage implementation for persisting committed data.
    storage: Arc<dyn Storage>,
    config: ThothConfig,
}

impl Thoth {
    /// Creates an empty store on top of `storage`.
    pub fn new(storage: Arc<dyn Storage>, config: ThothConfig) -> Self {
        Self {
            txn_buffer: Arc::new(TxnBuffer::new()),
            lock_table: Arc::new(LockTable::new()),
            commit_lock: Arc::new(Mutex::new(())),
            transaction_counter: Arc::new(AtomicU64::new(1)),
            account_ids: Arc::new(AtomicU64::new(1)),
            storage,
            config,
        }
    }

    /// Creates a store and loads the accounts already persisted in `storage`.
    ///
    /// Recovered accounts keep their version. New account ids continue after
    /// the highest recovered one.
    pub fn open(storage: Arc<dyn Storage>, config: ThothConfig) -> Result<Self> {
        config.validate()?;
        let accounts = storage.load_accounts()?;
        let thoth = Self::new(storage, config);
        let recovered_at = thoth.transaction_counter.fetch_add(1, Ordering::SeqCst);
        let mut next_id = 1;
        for account in accounts {
            next_id = next_id.max(account.id().get() + 1);
            thoth
                .txn_buffer
                .insert(account.id(), VersionedValue::new(Arc::new(account), recovered_at));
        }
        thoth.account_ids.store(next_id, Ordering::SeqCst);
        debug!("Recovered {} account(s) from storage", thoth.txn_buffer.len());
        Ok(thoth)
    }

    /// Starts a new transaction at the configured default isolation level.
    pub fn start_transaction(&self) -> Transaction {
        self.start_transaction_with(self.config.default_isolation)
    }

    /// Starts a new transaction at the given isolation level.
    pub fn start_transaction_with(&self, isolation_level: TransactionIsolation) -> Transaction {
        let transaction_id = self.transaction_counter.fetch_add(1, Ordering::SeqCst);

        Transaction::new(
            transaction_id,
            isolation_level,
            Arc::clone(&self.txn_buffer),
            Arc::clone(&self.lock_table),
            Arc::clone(&self.commit_lock),
            Arc::clone(&self.transaction_counter),
            Arc::clone(&self.account_ids),
            Arc::clone(&self.storage),
            self.config.lock_timeout(),
        )
    }

    /// Whether some transaction holds the exclusive lock on `id`.
    pub fn is_locked(&self, id: AccountId) -> bool {
        self.lock_table.holder(&id).is_some()
    }

    pub fn config(&self) -> &ThothConfig {
        &self.config
    }
}
