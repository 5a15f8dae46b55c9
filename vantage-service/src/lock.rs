//! Process-local per-company mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use vantage_core::CompanyIdentifier;

/// One async mutex per company identifier, created on first use.
///
/// Handles are never removed; the map grows with the number of distinct
/// companies seen by the process.
#[derive(Debug, Clone, Default)]
pub struct CompanyLockRegistry {
    locks: Arc<DashMap<CompanyIdentifier, Arc<Mutex<()>>>>,
}

impl CompanyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock handle for `identifier`.
    pub fn handle(&self, identifier: &CompanyIdentifier) -> Arc<Mutex<()>> {
        self.locks
            .entry(identifier.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `identifier`.
    pub async fn lock(&self, identifier: &CompanyIdentifier) -> OwnedMutexGuard<()> {
        self.handle(identifier).lock_owned().await
    }

    /// Whether some task currently holds the lock for `identifier`.
    pub fn is_locked(&self, identifier: &CompanyIdentifier) -> bool {
        self.locks
            .get(identifier)
            .is_some_and(|m| m.try_lock().is_err())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_identifier_shares_handle() {
        let registry = CompanyLockRegistry::new();
        let id = CompanyIdentifier::from_assigned("acme.io");
        let a = registry.handle(&id);
        let b = registry.handle(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_second_locker_waits() {
        let registry = CompanyLockRegistry::new();
        let id = CompanyIdentifier::from_assigned("acme.io");
        let guard = registry.lock(&id).await;
        assert!(registry.is_locked(&id));

        let other = registry.clone();
        let waiter_id = id.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock(&waiter_id).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert!(!registry.is_locked(&id));
    }

    #[tokio::test]
    async fn test_distinct_identifiers_do_not_block() {
        let registry = CompanyLockRegistry::new();
        let _a = registry.lock(&CompanyIdentifier::from_assigned("a.io")).await;
        let _b = registry.lock(&CompanyIdentifier::from_assigned("b.io")).await;
        assert_eq!(registry.len(), 2);
    }
}
