use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::account::{Account, AccountId};
use crate::data_store::versioned_value::VersionedValue;

/// A staged write made visible to `ReadUncommitted` readers before commit.
#[derive(Debug, Clone)]
struct UncommittedWrite {
    /// Publish order across all transactions; the highest one is the latest.
    sequence: u64,
    account: Arc<Account>,
}

/// The Transaction Buffer (TxnBuffer) implemented using lock-free SkipMaps.
///
/// `committed` holds the latest committed version of every account, ordered by
/// account id. `uncommitted` holds the published, not yet committed writes,
/// one per account and transaction. A dirty read returns the most recently
/// published of them, so retracting one transaction's write uncovers the
/// write of another transaction that is still pending. Only `ReadUncommitted`
/// readers look at the overlay.
pub struct TxnBuffer {
    committed: SkipMap<AccountId, VersionedValue>,
    uncommitted: SkipMap<(AccountId, u64), UncommittedWrite>,
    publish_sequence: AtomicU64,
}

impl Default for TxnBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TxnBuffer {
    /// Creates a new, empty `TxnBuffer`.
    pub fn new() -> Self {
        Self {
            committed: SkipMap::new(),
            uncommitted: SkipMap::new(),
            publish_sequence: AtomicU64::new(0),
        }
    }

    /// Retrieves the committed value of an account.
    /// Returns `None` if the account was never committed.
    pub fn get(&self, id: &AccountId) -> Option<VersionedValue> {
        self.committed.get(id).map(|entry| entry.value().clone())
    }

    /// Installs a committed value, replacing the previous one.
    pub fn insert(&self, id: AccountId, value: VersionedValue) {
        self.committed.insert(id, value);
    }

    /// All committed values in ascending account id order.
    pub fn committed_values(&self) -> Vec<VersionedValue> {
        self.committed
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of committed accounts.
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// The latest published uncommitted write for an account, if any.
    pub fn get_uncommitted(&self, id: &AccountId) -> Option<Arc<Account>> {
        self.uncommitted
            .range((*id, u64::MIN)..=(*id, u64::MAX))
            .max_by_key(|entry| entry.value().sequence)
            .map(|entry| Arc::clone(&entry.value().account))
    }

    /// The latest published uncommitted write of every account that has one,
    /// in ascending account id order.
    pub fn uncommitted_values(&self) -> Vec<Arc<Account>> {
        let mut latest: Vec<UncommittedWrite> = Vec::new();
        for entry in self.uncommitted.iter() {
            let write = entry.value();
            match latest.last_mut() {
                Some(last) if last.account.id() == write.account.id() => {
                    if write.sequence > last.sequence {
                        *last = write.clone();
                    }
                }
                _ => latest.push(write.clone()),
            }
        }
        latest.into_iter().map(|write| write.account).collect()
    }

    /// Publishes a staged write of `txn_id`, replacing that transaction's
    /// earlier write of the same account.
    pub fn publish_uncommitted(&self, txn_id: u64, account: Arc<Account>) {
        let sequence = self.publish_sequence.fetch_add(1, Ordering::SeqCst);
        self.uncommitted
            .insert((account.id(), txn_id), UncommittedWrite { sequence, account });
    }

    /// Withdraws the published write of `txn_id` for `id`, if any.
    pub fn retract_uncommitted(&self, txn_id: u64, id: &AccountId) {
        self.uncommitted.remove(&(*id, txn_id));
    }
}
