use std::time::{Duration, Instant};

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::account::AccountId;
use crate::errors::{Result, ThothError};

/// Exclusive row locks owned by transactions.
///
/// A lock is held by a single transaction id. Acquiring a lock the caller
/// already owns succeeds immediately. Any other caller waits on a condition
/// variable until the owner releases, optionally bounded by a timeout.
///
/// There is no deadlock detection. Callers that lock several rows take them
/// in ascending id order, and a configured timeout is the escape hatch.
#[derive(Default)]
pub struct LockTable {
    owners: Mutex<HashMap<AccountId, u64>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive lock on `id` for transaction `txn_id`.
    ///
    /// Blocks while another transaction holds it. With `timeout` set, gives
    /// up once the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`ThothError::LockTimeout`] if the lock could not be obtained
    /// before the deadline.
    pub fn acquire(&self, txn_id: u64, id: AccountId, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut owners = self.owners.lock();
        loop {
            match owners.get(&id) {
                None => {
                    owners.insert(id, txn_id);
                    debug!("Tx {} acquired exclusive lock on account {}", txn_id, id);
                    return Ok(());
                }
                Some(&owner) if owner == txn_id => return Ok(()),
                Some(&owner) => {
                    debug!(
                        "Tx {} waiting for exclusive lock on account {} held by Tx {}",
                        txn_id, id, owner
                    );
                    match deadline {
                        None => self.released.wait(&mut owners),
                        Some(deadline) => {
                            if self.released.wait_until(&mut owners, deadline).timed_out()
                                && owners.get(&id).is_some_and(|owner| *owner != txn_id)
                            {
                                debug!("Tx {} timed out on account {}", txn_id, id);
                                return Err(ThothError::LockTimeout(id));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Releases every lock in `ids` still owned by `txn_id` and wakes waiters.
    pub fn release_all(&self, txn_id: u64, ids: &[AccountId]) {
        if ids.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for id in ids {
            if owners.get(id) == Some(&txn_id) {
                owners.remove(id);
            }
        }
        drop(owners);
        debug!("Tx {} released {} lock(s)", txn_id, ids.len());
        self.released.notify_all();
    }

    /// The transaction currently holding the lock on `id`, if any.
    pub fn holder(&self, id: &AccountId) -> Option<u64> {
        self.owners.lock().get(id).copied()
    }
}
