mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;
use rust_decimal::Decimal;
use thoth::prelude::*;

use common::{committed, dec, setup_thoth, FlakyStorage};

fn service_with_pair(from: i64, to: i64) -> (Arc<Thoth>, Arc<InMemoryStorage>, AccountService, Account, Account) {
    let (thoth, storage) = setup_thoth(TransactionIsolation::ReadCommitted);
    let service = AccountService::new(Arc::clone(&thoth));
    let source = service.open_account("source", dec(from)).unwrap();
    let destination = service.open_account("destination", dec(to)).unwrap();
    (thoth, storage, service, source, destination)
}

#[test]
fn test_transfer_moves_funds() {
    let (thoth, _storage, service, source, destination) = service_with_pair(10000, 5000);

    service
        .transfer(source.id(), destination.id(), dec(3000))
        .unwrap();

    let from = committed(&thoth, source.id());
    let to = committed(&thoth, destination.id());
    assert_eq!(from.balance(), dec(7000));
    assert_eq!(to.balance(), dec(8000));
    assert_eq!(from.version(), 1);
    assert_eq!(to.version(), 1);
}

#[test]
fn test_transfer_with_lock_moves_funds() {
    let (thoth, _storage, service, source, destination) = service_with_pair(10000, 5000);

    service
        .transfer_with_lock(source.id(), destination.id(), dec(3000))
        .unwrap();

    assert_eq!(committed(&thoth, source.id()).balance(), dec(7000));
    assert_eq!(committed(&thoth, destination.id()).balance(), dec(8000));
    assert!(!thoth.is_locked(source.id()));
    assert!(!thoth.is_locked(destination.id()));
}

#[test]
fn test_insufficient_funds_leaves_both_accounts_unchanged() {
    let (thoth, _storage, service, source, destination) = service_with_pair(1000, 5000);

    let result = service.transfer(source.id(), destination.id(), dec(1001));
    assert!(matches!(result, Err(ThothError::InsufficientFunds { .. })));

    let from = committed(&thoth, source.id());
    let to = committed(&thoth, destination.id());
    assert_eq!((from.balance(), from.version()), (dec(1000), 0));
    assert_eq!((to.balance(), to.version()), (dec(5000), 0));
}

#[test]
fn test_transfer_rejects_invalid_amounts() {
    let (thoth, _storage, service, source, destination) = service_with_pair(1000, 1000);

    for amount in [Decimal::ZERO, dec(-10)] {
        let result = service.transfer(source.id(), destination.id(), amount);
        assert!(matches!(result, Err(ThothError::InvalidAmount(_))));
    }
    assert_eq!(committed(&thoth, source.id()).balance(), dec(1000));
}

#[test]
fn test_transfer_to_missing_account() {
    let (thoth, _storage, service, source, _destination) = service_with_pair(1000, 0);
    let missing = AccountId::new(999);

    assert!(matches!(
        service.transfer(source.id(), missing, dec(10)),
        Err(ThothError::AccountNotFound(id)) if id == missing
    ));
    assert!(matches!(
        service.transfer(missing, source.id(), dec(10)),
        Err(ThothError::AccountNotFound(id)) if id == missing
    ));
    assert!(matches!(
        service.transfer_with_lock(source.id(), missing, dec(10)),
        Err(ThothError::AccountNotFound(id)) if id == missing
    ));
    assert_eq!(committed(&thoth, source.id()).balance(), dec(1000));
    assert!(!thoth.is_locked(source.id()));
}

#[test]
fn test_self_transfer_changes_nothing() {
    let (thoth, _storage, service, source, _destination) = service_with_pair(1000, 0);

    service.transfer(source.id(), source.id(), dec(400)).unwrap();
    assert_eq!(committed(&thoth, source.id()).balance(), dec(1000));

    // Funds are still checked.
    assert!(matches!(
        service.transfer(source.id(), source.id(), dec(5000)),
        Err(ThothError::InsufficientFunds { .. })
    ));
}

#[test]
fn test_transfer_is_logged_with_commit() {
    let (_thoth, storage, service, source, destination) = service_with_pair(1000, 0);

    service.transfer(source.id(), destination.id(), dec(250)).unwrap();
    let _ = service.transfer(source.id(), destination.id(), dec(5000));

    let transfers: Vec<TxLog> = storage
        .logs()
        .into_iter()
        .filter(|entry| entry.operation == "TRANSFER")
        .collect();
    assert_eq!(transfers.len(), 1);
    assert!(transfers[0].details.contains("amount=250"));
}

#[test]
fn test_transfer_storage_failure_is_atomic() {
    let storage = Arc::new(FlakyStorage::new());
    let thoth = Arc::new(Thoth::new(storage.clone(), ThothConfig::default()));
    let service = AccountService::new(Arc::clone(&thoth));
    let source = service.open_account("source", dec(1000)).unwrap();
    let destination = service.open_account("destination", dec(0)).unwrap();

    storage.fail_commits(true);
    assert!(matches!(
        service.transfer(source.id(), destination.id(), dec(600)),
        Err(ThothError::StorageError(_))
    ));
    storage.fail_commits(false);

    assert_eq!(committed(&thoth, source.id()).balance(), dec(1000));
    assert_eq!(committed(&thoth, destination.id()).balance(), dec(0));
    assert_eq!(storage.get(source.id()).unwrap().balance(), dec(1000));
    assert_eq!(storage.get(destination.id()).unwrap().balance(), dec(0));
}

#[test]
fn test_concurrent_random_transfers_conserve_total() {
    const ACCOUNTS: usize = 5;
    const THREADS: usize = 4;
    const TRANSFERS: usize = 50;

    let (thoth, _storage) = setup_thoth(TransactionIsolation::ReadCommitted);
    let service = Arc::new(AccountService::new(Arc::clone(&thoth)));
    let ids: Arc<Vec<AccountId>> = Arc::new(
        (0..ACCOUNTS)
            .map(|i| {
                service
                    .open_account(&format!("acct{}", i), dec(1000))
                    .unwrap()
                    .id()
            })
            .collect(),
    );
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = Arc::clone(&service);
            let ids = Arc::clone(&ids);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::rng();
                let mut done = 0;
                barrier.wait();
                for _ in 0..TRANSFERS {
                    let from = ids[rng.random_range(0..ids.len())];
                    let to = ids[rng.random_range(0..ids.len())];
                    let amount = dec(rng.random_range(1..200));
                    match service.transfer(from, to, amount) {
                        Ok(()) => done += 1,
                        Err(e) if e.is_retryable() => {}
                        Err(ThothError::InsufficientFunds { .. }) => {}
                        Err(e) => panic!("unexpected transfer error: {}", e),
                    }
                }
                done
            })
        })
        .collect();

    let total_committed: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("transfer thread panicked"))
        .sum();
    assert!(total_committed > 0);

    let total: Decimal = ids
        .iter()
        .map(|id| {
            let account = committed(&thoth, *id);
            assert!(account.balance() >= Decimal::ZERO);
            account.balance()
        })
        .sum();
    assert_eq!(total, dec(1000 * ACCOUNTS as i64));
}

#[test]
fn test_concurrent_locked_transfers_never_conflict() {
    const THREADS: usize = 4;
    const TRANSFERS: usize = 25;

    let (thoth, _storage) = setup_thoth(TransactionIsolation::ReadCommitted);
    let service = Arc::new(AccountService::new(Arc::clone(&thoth)));
    let a = service.open_account("a", dec(100000)).unwrap().id();
    let b = service.open_account("b", dec(100000)).unwrap().id();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|index| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let (from, to) = if index % 2 == 0 { (a, b) } else { (b, a) };
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..TRANSFERS {
                    service.transfer_with_lock(from, to, dec(7)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("locked transfer thread panicked");
    }

    assert_eq!(committed(&thoth, a).balance(), dec(100000));
    assert_eq!(committed(&thoth, b).balance(), dec(100000));
    assert_eq!(
        committed(&thoth, a).version(),
        (THREADS * TRANSFERS) as u64
    );
}
