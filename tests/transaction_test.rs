//! Integration tests for thread-bound transaction scoping.

mod common;

use common::MockProvider;
use hydro_dao::db::TransactionManager;
use hydro_dao::error::ErrorKind;
use hydro_dao::models::{IsolationLevel, TransactionState};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

fn manager() -> (Arc<MockProvider>, TransactionManager) {
    let provider = Arc::new(MockProvider::new());
    let manager = TransactionManager::new("mock", provider.clone());
    (provider, manager)
}

#[test]
fn test_commit_releases_connection() {
    let (provider, tm) = manager();
    tm.start(IsolationLevel::ReadCommitted).unwrap();
    assert!(tm.is_active());
    assert_eq!(tm.isolation(), Some(IsolationLevel::ReadCommitted));

    assert_eq!(tm.commit().unwrap(), TransactionState::Committed);
    assert!(!tm.is_active());
    assert_eq!(provider.kinds(), vec!["acquire", "begin", "commit", "release"]);
}

#[test]
fn test_nested_scopes_share_one_physical_transaction() {
    let (provider, tm) = manager();
    tm.start(IsolationLevel::default()).unwrap();
    let outer = tm.current_handle().unwrap().id();
    tm.start(IsolationLevel::Serializable).unwrap();
    assert_eq!(tm.depth(), 2);
    assert_eq!(tm.current_handle().unwrap().id(), outer);

    assert_eq!(tm.commit().unwrap(), TransactionState::Active);
    assert_eq!(provider.count("commit"), 0);
    assert_eq!(tm.commit().unwrap(), TransactionState::Committed);

    assert_eq!(provider.count("acquire"), 1);
    assert_eq!(provider.count("begin"), 1);
    assert_eq!(provider.count("commit"), 1);
}

#[test]
fn test_nested_rollback_forces_outer_rollback() {
    let (provider, tm) = manager();
    tm.start(IsolationLevel::default()).unwrap();
    tm.start(IsolationLevel::default()).unwrap();

    assert_eq!(tm.rollback().unwrap(), TransactionState::Active);
    assert!(tm.is_marked_for_rollback());
    assert_eq!(provider.count("rollback"), 0);

    let err = tm.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(provider.count("commit"), 0);
    assert_eq!(provider.count("rollback"), 1);
    assert_eq!(provider.count("release"), 1);
    assert!(!tm.is_active());
}

#[test]
fn test_commit_without_transaction_fails() {
    let (_, tm) = manager();
    let err = tm.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);
}

#[test]
fn test_second_commit_fails() {
    let (_, tm) = manager();
    tm.start(IsolationLevel::default()).unwrap();
    tm.commit().unwrap();
    assert_eq!(tm.commit().unwrap_err().kind(), ErrorKind::Transaction);
}

#[test]
fn test_rollback_without_transaction_is_noop() {
    let (provider, tm) = manager();
    assert_eq!(tm.rollback().unwrap(), TransactionState::RolledBack);
    assert!(provider.events().is_empty());
}

#[test]
fn test_failed_commit_rolls_back_and_releases() {
    let provider = Arc::new(MockProvider::failing_commit());
    let tm = TransactionManager::new("mock", provider.clone());
    tm.start(IsolationLevel::default()).unwrap();

    let err = tm.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataAccess);
    assert_eq!(
        provider.kinds(),
        vec!["acquire", "begin", "commit", "rollback", "release"]
    );
    assert!(!tm.is_active());
}

#[test]
fn test_run_commits_on_success() {
    let (provider, tm) = manager();
    let value = tm.run(IsolationLevel::default(), || Ok(7)).unwrap();
    assert_eq!(value, 7);
    assert_eq!(provider.count("commit"), 1);
    assert_eq!(provider.count("rollback"), 0);
}

#[test]
fn test_run_rolls_back_on_error() {
    let (provider, tm) = manager();
    let err = tm
        .run(IsolationLevel::default(), || -> hydro_dao::DaoResult<()> {
            Err(hydro_dao::DaoError::data_access("boom"))
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(provider.count("commit"), 0);
    assert_eq!(provider.count("rollback"), 1);
    assert_eq!(provider.count("release"), 1);
}

#[test]
fn test_run_rolls_back_on_panic() {
    let (provider, tm) = manager();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        tm.run(IsolationLevel::default(), || -> hydro_dao::DaoResult<()> {
            panic!("block panicked")
        })
    }));
    assert!(outcome.is_err());
    assert!(!tm.is_active());
    assert_eq!(provider.count("rollback"), 1);
    assert_eq!(provider.count("release"), 1);
}

#[test]
fn test_transactions_are_per_thread() {
    let provider = Arc::new(MockProvider::new());
    let tm = Arc::new(TransactionManager::new("mock", provider.clone()));
    tm.start(IsolationLevel::default()).unwrap();

    let other = tm.clone();
    let seen_elsewhere = std::thread::spawn(move || (other.is_active(), other.depth()))
        .join()
        .unwrap();
    assert_eq!(seen_elsewhere, (false, 0));

    assert!(tm.is_active());
    tm.rollback().unwrap();
    assert_eq!(provider.count("rollback"), 1);
}
