use serde::{Deserialize, Serialize};

/// Defines the isolation levels supported by the Thoth account store.
///
/// Levels are ordered by strictness, so `ReadUncommitted < Serializable`.
/// Higher levels give stronger guarantees about what a transaction can observe
/// of concurrent work, at the price of more commit-time validation failures.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionIsolation {
    /// **Read Uncommitted:**
    ///
    /// Reads observe the most recent staged write of any concurrent transaction,
    /// even if that transaction later rolls back (dirty read). When no staged
    /// write exists for a row, the committed value is returned.
    ReadUncommitted,
    /// **Read Committed:**
    ///
    /// Every read returns the latest committed value at the moment it is read.
    /// Reading the same row twice may return different values if another
    /// transaction commits in between (non-repeatable read).
    #[default]
    ReadCommitted,
    /// **Repeatable Read:**
    ///
    /// The first read of a row is kept in the transaction's private snapshot and
    /// every later read of that row returns the same value. Range scans still
    /// enumerate the committed rows on each call, so rows committed by others
    /// may show up in a repeated scan (phantom read).
    ///
    /// A transaction that writes validates its read set at commit and aborts if
    /// a row it read was changed by another commit in the meantime.
    RepeatableRead,
    /// **Serializable:**
    ///
    /// Behaves like `RepeatableRead` for single-row reads. In addition, a range
    /// scan remembers the set of rows it returned and answers repeated scans of
    /// the same range from that set. At commit, a writing transaction whose
    /// scanned ranges gained or lost rows is aborted.
    Serializable,
}

impl TransactionIsolation {
    /// Whether reads of a row are pinned to the first observed value.
    pub(crate) fn keeps_snapshot(self) -> bool {
        self >= TransactionIsolation::RepeatableRead
    }
}

