use ahash::{AHashMap as HashMap, AHashSet as HashSet};

use crate::account::AccountId;
use crate::data_store::txn_buffer::TxnBuffer;
use crate::errors::ThothError;
use crate::transaction::{RangeRead, StagedWrite};
use crate::TransactionIsolation;

/// Represents the type of conflict detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// The transaction read a row that another transaction has since committed.
    ReadWrite,
    /// The stored version of a written row differs from the version the
    /// transaction observed when it read the row.
    WriteWrite,
    /// A range scanned under `Serializable` gained or lost rows.
    Phantom,
    /// The transaction updates a row that does not exist.
    Missing,
}

impl ConflictType {
    /// Converts a detected conflict on `id` into the error surfaced by commit.
    pub fn into_error(self, id: AccountId) -> ThothError {
        match self {
            ConflictType::WriteWrite => ThothError::Conflict(id),
            ConflictType::Missing => ThothError::AccountNotFound(id),
            ConflictType::ReadWrite => ThothError::SerializationFailure(format!(
                "account {} changed after it was read",
                id
            )),
            ConflictType::Phantom => ThothError::SerializationFailure(format!(
                "scanned range membership changed at account {}",
                id
            )),
        }
    }
}

/// Checks a committing transaction's read and write sets against the buffer.
///
/// Must run while the caller holds the commit lock, so that the state it
/// validates against is the state the commit will be installed over.
///
/// * Every level: version check of the write set (optimistic locking).
/// * `RepeatableRead` and `Serializable`: read set validation.
/// * `Serializable`: range membership validation.
///
/// Read-side validation only applies to transactions that write.
pub(crate) fn detect_conflicts(
    isolation_level: TransactionIsolation,
    read_set: &HashMap<AccountId, u64>,
    write_set: &HashMap<AccountId, StagedWrite>,
    range_reads: &[RangeRead],
    txn_buffer: &TxnBuffer,
) -> HashMap<AccountId, ConflictType> {
    let mut conflicts: HashMap<AccountId, ConflictType> = HashMap::new();

    for (id, staged) in write_set {
        let current = txn_buffer.get(id);
        match (staged, current) {
            (StagedWrite::Insert(_), Some(_)) => {
                conflicts.insert(*id, ConflictType::WriteWrite);
            }
            (StagedWrite::Insert(_), None) => {}
            (StagedWrite::Update(_), None) => {
                conflicts.insert(*id, ConflictType::Missing);
            }
            (StagedWrite::Update(account), Some(current)) => {
                if current.data().version() != account.version() {
                    conflicts.insert(*id, ConflictType::WriteWrite);
                }
            }
        }
    }

    if write_set.is_empty() || !isolation_level.keeps_snapshot() {
        return conflicts;
    }

    for (id, read_version) in read_set {
        let current_version = txn_buffer.get(id).map_or(0, |value| value.version());
        if current_version != *read_version {
            conflicts.entry(*id).or_insert(ConflictType::ReadWrite);
        }
    }

    if isolation_level == TransactionIsolation::Serializable {
        for range_read in range_reads {
            let current: HashSet<AccountId> = txn_buffer
                .committed_values()
                .iter()
                .map(|value| value.data())
                .filter(|account| range_read.range.contains(account.balance()))
                .map(|account| account.id())
                .collect();
            if let Some(id) = current
                .symmetric_difference(&range_read.ids)
                .min()
                .copied()
            {
                conflicts.entry(id).or_insert(ConflictType::Phantom);
            }
        }
    }

    conflicts
}
