use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use log::debug;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::account::{Account, AccountId, TxLog};
use crate::conflict::detection::detect_conflicts;
use crate::data_store::lock_table::LockTable;
use crate::data_store::txn_buffer::TxnBuffer;
use crate::data_store::versioned_value::VersionedValue;
use crate::errors::{Result, ThothError};
use crate::storage::{Storage, StorageMutation};
use crate::TransactionIsolation;

/// An inclusive balance interval used by range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl BalanceRange {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, balance: Decimal) -> bool {
        self.min <= balance && balance <= self.max
    }
}

/// A range scanned under `Serializable` and the committed rows it held then.
#[derive(Debug, Clone)]
pub(crate) struct RangeRead {
    pub(crate) range: BalanceRange,
    pub(crate) ids: HashSet<AccountId>,
}

/// A change staged by a transaction.
#[derive(Debug, Clone)]
pub(crate) enum StagedWrite {
    /// A new account, committed at version 0.
    Insert(Account),
    /// An update of an existing account. The account's version is the one
    /// observed at read time and must still be current at commit.
    Update(Account),
}

impl StagedWrite {
    pub(crate) fn account(&self) -> &Account {
        match self {
            StagedWrite::Insert(account) | StagedWrite::Update(account) => account,
        }
    }
}

/// Represents a single transaction.
///
/// A transaction is one atomic unit of work: reads follow its isolation level,
/// writes are staged privately and become visible to other committed readers
/// only when [`Transaction::commit`] succeeds.
///
/// It is also the scope of every row lock it takes. Locks are released on
/// commit, on rollback, and when the transaction is dropped without either.
pub struct Transaction {
    /// Unique identifier for the transaction (timestamp).
    id: u64,
    /// The isolation level for this transaction.
    isolation_level: TransactionIsolation,
    txn_buffer: Arc<TxnBuffer>,
    lock_table: Arc<LockTable>,
    /// Serializes validation and installation of commits.
    commit_lock: Arc<Mutex<()>>,
    /// Reference to the global transaction counter.
    transaction_counter: Arc<AtomicU64>,
    account_ids: Arc<AtomicU64>,
    storage: Arc<dyn Storage>,
    lock_timeout: Option<Duration>,
    /// Commit timestamps of the rows read, for `RepeatableRead` and up.
    read_set: HashMap<AccountId, u64>,
    /// First-read values, for `RepeatableRead` and up.
    snapshot: HashMap<AccountId, Arc<Account>>,
    write_set: HashMap<AccountId, StagedWrite>,
    range_reads: Vec<RangeRead>,
    logs: Vec<TxLog>,
    held_locks: Vec<AccountId>,
    finished: bool,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        isolation_level: TransactionIsolation,
        txn_buffer: Arc<TxnBuffer>,
        lock_table: Arc<LockTable>,
        commit_lock: Arc<Mutex<()>>,
        transaction_counter: Arc<AtomicU64>,
        account_ids: Arc<AtomicU64>,
        storage: Arc<dyn Storage>,
        lock_timeout: Option<Duration>,
    ) -> Self {
        debug!("Tx {} started at {:?}", id, isolation_level);
        Self {
            id,
            isolation_level,
            txn_buffer,
            lock_table,
            commit_lock,
            transaction_counter,
            account_ids,
            storage,
            lock_timeout,
            read_set: HashMap::new(),
            snapshot: HashMap::new(),
            write_set: HashMap::new(),
            range_reads: Vec::new(),
            logs: Vec::new(),
            held_locks: Vec::new(),
            finished: false,
        }
    }

    /// Returns the unique identifier of the transaction.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation_level(&self) -> TransactionIsolation {
        self.isolation_level
    }

    /// Reads an account.
    ///
    /// A row this transaction has written is returned as staged. Otherwise the
    /// result depends on the isolation level:
    ///
    /// * `ReadUncommitted`: the latest published uncommitted write, else the
    ///   committed value.
    /// * `ReadCommitted`: the committed value as of now.
    /// * `RepeatableRead` / `Serializable`: the value seen by the first read of
    ///   this row in this transaction.
    ///
    /// Returns `Ok(None)` if the account does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use rust_decimal::Decimal;
    /// use thoth::prelude::*;
    ///
    /// let thoth = Thoth::new(Arc::new(InMemoryStorage::new()), ThothConfig::default());
    /// let mut setup = thoth.start_transaction();
    /// let account = setup.insert("alice", Decimal::from(1000)).unwrap();
    /// setup.commit().unwrap();
    ///
    /// let mut txn = thoth.start_transaction_with(TransactionIsolation::RepeatableRead);
    /// let read = txn.read(account.id()).unwrap().unwrap();
    /// assert_eq!(read.balance(), Decimal::from(1000));
    /// assert_eq!(read.version(), 0);
    /// ```
    pub fn read(&mut self, id: AccountId) -> Result<Option<Account>> {
        if let Some(staged) = self.write_set.get(&id) {
            return Ok(Some(staged.account().clone()));
        }

        match self.isolation_level {
            TransactionIsolation::ReadUncommitted => {
                if let Some(dirty) = self.txn_buffer.get_uncommitted(&id) {
                    return Ok(Some(dirty.as_ref().clone()));
                }
                Ok(self.txn_buffer.get(&id).map(|value| value.data().as_ref().clone()))
            }
            TransactionIsolation::ReadCommitted => {
                Ok(self.txn_buffer.get(&id).map(|value| value.data().as_ref().clone()))
            }
            TransactionIsolation::RepeatableRead | TransactionIsolation::Serializable => {
                if let Some(cached) = self.snapshot.get(&id) {
                    return Ok(Some(cached.as_ref().clone()));
                }
                match self.txn_buffer.get(&id) {
                    Some(value) => {
                        self.remember(&value);
                        Ok(Some(value.data().as_ref().clone()))
                    }
                    None => {
                        // Absence is part of what was read.
                        self.read_set.insert(id, 0);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Reads an account that must exist.
    ///
    /// # Errors
    ///
    /// [`ThothError::AccountNotFound`] if there is no such account.
    pub fn find(&mut self, id: AccountId) -> Result<Account> {
        self.read(id)?.ok_or(ThothError::AccountNotFound(id))
    }

    /// Takes the exclusive lock on an account and returns its latest state.
    ///
    /// Blocks while another transaction holds the lock. The lock stays with
    /// this transaction until it commits, rolls back or is dropped. The value
    /// returned is the latest committed one regardless of isolation level, and
    /// it replaces whatever the transaction's snapshot held for the row.
    ///
    /// # Errors
    ///
    /// [`ThothError::LockTimeout`] if a lock timeout is configured and expires,
    /// [`ThothError::AccountNotFound`] if the account does not exist.
    pub fn find_for_exclusive_access(&mut self, id: AccountId) -> Result<Account> {
        self.lock_table.acquire(self.id, id, self.lock_timeout)?;
        if !self.held_locks.contains(&id) {
            self.held_locks.push(id);
        }

        if let Some(staged) = self.write_set.get(&id) {
            return Ok(staged.account().clone());
        }

        let value = self
            .txn_buffer
            .get(&id)
            .ok_or(ThothError::AccountNotFound(id))?;
        if self.isolation_level.keeps_snapshot() {
            self.remember(&value);
        }
        Ok(value.data().as_ref().clone())
    }

    /// Stages the creation of a new account and returns it.
    ///
    /// The account gets a fresh id right away and version 0 once committed.
    ///
    /// # Errors
    ///
    /// [`ThothError::InvalidAmount`] if `initial_balance` is negative.
    pub fn insert(&mut self, name: &str, initial_balance: Decimal) -> Result<Account> {
        let id = AccountId::new(self.account_ids.fetch_add(1, Ordering::SeqCst));
        let account = Account::new(id, name, initial_balance)?;
        self.txn_buffer
            .publish_uncommitted(self.id, Arc::new(account.clone()));
        self.write_set.insert(id, StagedWrite::Insert(account.clone()));
        debug!("Tx {} staged insert of account {}", self.id, id);
        Ok(account)
    }

    /// Stages an update of an account.
    ///
    /// The account's version must be the one it was read at; commit fails with
    /// [`ThothError::Conflict`] if another transaction committed the row since.
    /// The staged value is published to `ReadUncommitted` readers immediately.
    ///
    /// # Errors
    ///
    /// [`ThothError::InvalidAmount`] if the balance is negative.
    pub fn write(&mut self, account: Account) -> Result<()> {
        if account.balance() < Decimal::ZERO {
            return Err(ThothError::InvalidAmount(account.balance()));
        }
        let id = account.id();
        self.txn_buffer
            .publish_uncommitted(self.id, Arc::new(account.clone()));
        let staged = match self.write_set.get(&id) {
            Some(StagedWrite::Insert(_)) => StagedWrite::Insert(account),
            _ => StagedWrite::Update(account),
        };
        self.write_set.insert(id, staged);
        debug!("Tx {} staged write of account {}", self.id, id);
        Ok(())
    }

    /// Returns the accounts whose balance lies in `[min, max]`, by ascending id.
    ///
    /// Under `Serializable`, repeating a scan of the same range returns the
    /// same rows, and commit of a writing transaction fails if the range's
    /// membership changed. Under the other levels every scan re-enumerates.
    pub fn scan_balance_between(&mut self, min: Decimal, max: Decimal) -> Result<Vec<Account>> {
        let range = BalanceRange::new(min, max);

        if self.isolation_level == TransactionIsolation::Serializable {
            if let Some(ids) = self
                .range_reads
                .iter()
                .find(|range_read| range_read.range == range)
                .map(|range_read| range_read.ids.clone())
            {
                let candidates: BTreeMap<AccountId, Account> = ids
                    .iter()
                    .chain(self.write_set.keys())
                    .filter_map(|id| self.current_view(id).map(|account| (*id, account)))
                    .collect();
                return Ok(candidates
                    .into_values()
                    .filter(|account| range.contains(account.balance()))
                    .collect());
            }
        }

        let committed = self.txn_buffer.committed_values();
        if self.isolation_level == TransactionIsolation::Serializable {
            // Membership is validated against committed rows at commit, so it
            // is recorded from the same committed state the scan reads.
            let ids: HashSet<AccountId> = committed
                .iter()
                .map(|value| value.data())
                .filter(|account| range.contains(account.balance()))
                .map(|account| account.id())
                .collect();
            self.range_reads.push(RangeRead { range, ids });
        }
        Ok(self.visible_rows(committed, |account| range.contains(account.balance())))
    }

    /// Returns the first account, by ascending id, with the given name.
    pub fn find_by_name(&mut self, name: &str) -> Result<Option<Account>> {
        let committed = self.txn_buffer.committed_values();
        Ok(self
            .visible_rows(committed, |account| account.name() == name)
            .into_iter()
            .next())
    }

    /// Stages an audit entry, persisted only if the transaction commits.
    pub fn record_log(&mut self, operation: &str, details: impl Into<String>) {
        self.logs.push(TxLog::new(self.id, operation, details));
    }

    /// Attempts to commit the transaction.
    ///
    /// Row locks are taken for every written account in ascending id order,
    /// waiting for holders as a database `UPDATE` would. Then, under the global
    /// commit lock, the transaction is validated: version check of every
    /// written row, plus read set and range validation for the stricter
    /// levels. On success the changes are persisted through [`Storage`] and
    /// installed in the buffer. Updated rows get `version + 1`, inserted rows
    /// version 0.
    ///
    /// Transactions without writes or audit entries always commit.
    ///
    /// # Errors
    ///
    /// * [`ThothError::Conflict`] on a stale version.
    /// * [`ThothError::SerializationFailure`] on a failed read or range validation.
    /// * [`ThothError::AccountNotFound`] when updating a missing account.
    /// * [`ThothError::LockTimeout`] when a row lock cannot be obtained in time.
    /// * [`ThothError::StorageError`] from the storage layer.
    ///
    /// Nothing is applied on error, and all locks are released.
    pub fn commit(mut self) -> Result<()> {
        if self.write_set.is_empty() && self.logs.is_empty() {
            debug!("Tx {} committed (read-only)", self.id);
            self.finish();
            return Ok(());
        }

        let mut written: Vec<AccountId> = self.write_set.keys().copied().collect();
        written.sort();
        for id in &written {
            self.lock_table.acquire(self.id, *id, self.lock_timeout)?;
            if !self.held_locks.contains(id) {
                self.held_locks.push(*id);
            }
        }

        let commit_lock = Arc::clone(&self.commit_lock);
        let _commit_guard = commit_lock.lock();

        let conflicts = detect_conflicts(
            self.isolation_level,
            &self.read_set,
            &self.write_set,
            &self.range_reads,
            &self.txn_buffer,
        );
        if let Some((id, conflict)) = conflicts.iter().min_by_key(|(id, _)| **id) {
            debug!(
                "Tx {} aborted: {:?} conflict on account {}",
                self.id, conflict, id
            );
            return Err(conflict.into_error(*id));
        }

        let mut installed: Vec<Account> = Vec::with_capacity(written.len());
        for id in &written {
            if let Some(staged) = self.write_set.get(id) {
                let committed = match staged {
                    StagedWrite::Insert(account) => account.clone().with_version(0),
                    StagedWrite::Update(account) => {
                        let next = account.version() + 1;
                        account.clone().with_version(next)
                    }
                };
                installed.push(committed);
            }
        }

        let mut mutations: Vec<StorageMutation> = installed
            .iter()
            .cloned()
            .map(StorageMutation::Put)
            .collect();
        mutations.extend(self.logs.drain(..).map(StorageMutation::AppendLog));
        self.storage.apply_mutations(mutations)?;

        let commit_timestamp = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
        for account in installed {
            self.txn_buffer
                .insert(account.id(), VersionedValue::new(Arc::new(account), commit_timestamp));
        }

        debug!(
            "Tx {} committed {} row(s) at {}",
            self.id,
            written.len(),
            commit_timestamp
        );
        self.finish();
        Ok(())
    }

    /// Aborts the transaction, discarding staged changes and releasing locks.
    pub fn rollback(mut self) {
        debug!("Tx {} rolled back", self.id);
        self.finish();
    }

    fn remember(&mut self, value: &VersionedValue) {
        let id = value.data().id();
        self.read_set.insert(id, value.version());
        self.snapshot.insert(id, Arc::clone(value.data()));
    }

    /// The row as this transaction currently sees it, without recording a read.
    fn current_view(&self, id: &AccountId) -> Option<Account> {
        if let Some(staged) = self.write_set.get(id) {
            return Some(staged.account().clone());
        }
        self.snapshot
            .get(id)
            .map(|account| account.as_ref().clone())
            .or_else(|| self.txn_buffer.get(id).map(|value| value.data().as_ref().clone()))
    }

    /// Rows visible to this transaction that satisfy `predicate`, by ascending id.
    ///
    /// Under `RepeatableRead` and up, only committed rows matching the
    /// predicate join the snapshot and read set.
    fn visible_rows<P>(&mut self, committed: Vec<VersionedValue>, predicate: P) -> Vec<Account>
    where
        P: Fn(&Account) -> bool,
    {
        let mut rows: BTreeMap<AccountId, Account> = BTreeMap::new();
        for value in committed {
            let id = value.data().id();
            let account = if self.isolation_level.keeps_snapshot() {
                match self.snapshot.get(&id) {
                    Some(cached) => cached.as_ref().clone(),
                    None => {
                        if predicate(value.data().as_ref()) {
                            self.remember(&value);
                        }
                        value.data().as_ref().clone()
                    }
                }
            } else {
                value.data().as_ref().clone()
            };
            rows.insert(id, account);
        }

        if self.isolation_level == TransactionIsolation::ReadUncommitted {
            for dirty in self.txn_buffer.uncommitted_values() {
                rows.insert(dirty.id(), dirty.as_ref().clone());
            }
        }

        for (id, staged) in &self.write_set {
            rows.insert(*id, staged.account().clone());
        }
        rows.into_values().filter(|account| predicate(account)).collect()
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        for id in self.write_set.keys() {
            self.txn_buffer.retract_uncommitted(self.id, id);
        }
        self.lock_table.release_all(self.id, &self.held_locks);
        self.held_locks.clear();
        self.finished = true;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Tx {} dropped without commit, rolling back", self.id);
            self.finish();
        }
    }
}
