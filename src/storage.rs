use ahash::AHashMap as HashMap;
use parking_lot::Mutex;

use crate::account::{Account, AccountId, TxLog};
use crate::errors::Result;

/// Represents a single mutation to be applied to the storage layer.
///
/// `StorageMutation` describes a change that needs to be persisted as part of
/// a committed transaction.
#[derive(Debug, Clone)]
pub enum StorageMutation {
    /// Insert or replace an account. The account carries its committed version.
    Put(Account),
    /// Append an audit entry.
    AppendLog(TxLog),
}

/// Trait for interacting with a storage layer to persist committed data.
///
/// The store hands each commit's mutations to `apply_mutations` in one call.
/// Implementations must apply either all of them or none. This trait carries
/// no transaction logic of its own.
///
/// Implementations must be `Send` and `Sync` to be used concurrently by multiple
/// transactions.
pub trait Storage: Send + Sync {
    /// Atomically applies the given mutations to the storage layer.
    ///
    /// # Errors
    ///
    /// Returns a `ThothError::StorageError` if the mutations could not be
    /// applied. Nothing of the commit becomes visible in that case.
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()>;

    /// Returns every persisted account, used to rebuild state on open.
    fn load_accounts(&self) -> Result<Vec<Account>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    logs: Vec<TxLog>,
}

/// Storage kept in process memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<MemoryState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The persisted copy of an account.
    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.state.lock().accounts.get(&id).cloned()
    }

    /// All persisted audit entries, in commit order.
    pub fn logs(&self) -> Vec<TxLog> {
        self.state.lock().logs.clone()
    }
}

impl Storage for InMemoryStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        let mut state = self.state.lock();
        for mutation in mutations {
            match mutation {
                StorageMutation::Put(account) => {
                    state.accounts.insert(account.id(), account);
                }
                StorageMutation::AppendLog(entry) => state.logs.push(entry),
            }
        }
        Ok(())
    }

    fn load_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self.state.lock().accounts.values().cloned().collect();
        accounts.sort_by_key(Account::id);
        Ok(accounts)
    }
}
