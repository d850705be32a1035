//! Per-product write serialization.
//!
//! ```text
//! sell(A) ──► lock(A) ──► begin ──► plan + write ──► commit ──► drop guard
//! sell(A) ──► lock(A) ········ waits ························► proceeds
//! sell(B) ──► lock(B) ──► runs concurrently with A
//! ```
//!
//! Conn-level ledger writes take a `&ProductLock` so they cannot run without
//! the guard. The product `version` column is the second line of defence for
//! writers outside this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::error::{DbError, DbResult};

type LockTable = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Shared table of one async mutex per product id.
///
/// Clones share the table. An entry lives while some task holds or waits on
/// it and is removed when the last guard drops.
#[derive(Debug, Clone, Default)]
pub struct ProductLocks {
    inner: LockTable,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `product_id`.
    pub async fn lock(&self, product_id: &str) -> ProductLock {
        let mutex = {
            // Poisoning only means another thread panicked mid-insert; the map
            // itself is still usable.
            let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            table
                .entry(product_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        trace!(product_id = %product_id, "Waiting for product lock");
        let guard = mutex.lock_owned().await;
        trace!(product_id = %product_id, "Product lock acquired");

        ProductLock {
            product_id: product_id.to_string(),
            guard,
            table: Arc::clone(&self.inner),
        }
    }

    /// Number of products currently locked or waited on.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Proof that the holder has exclusive write access to one product.
///
/// Released on drop.
#[derive(Debug)]
pub struct ProductLock {
    product_id: String,
    guard: OwnedMutexGuard<()>,
    table: LockTable,
}

impl ProductLock {
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Fails unless this guard covers `product_id`.
    pub fn ensure_covers(&self, product_id: &str) -> DbResult<()> {
        if self.product_id != product_id {
            return Err(DbError::LockMismatch {
                held: self.product_id.clone(),
                requested: product_id.to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for ProductLock {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let held = OwnedMutexGuard::mutex(&self.guard);

        // One reference from the table, one from this guard. Waiters hold
        // their own clone, and clones are only taken under the table lock.
        let unused = Arc::strong_count(held) == 2
            && table
                .get(&self.product_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, held));
        if unused {
            table.remove(&self.product_id);
            trace!(product_id = %self.product_id, "Product lock entry released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_product_is_exclusive() {
        let locks = ProductLocks::new();
        let guard = locks.lock("p-1").await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move { contender.lock("p-1").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        let second = waiting.await.unwrap();
        assert_eq!(second.product_id(), "p-1");
    }

    #[tokio::test]
    async fn test_different_products_do_not_block() {
        let locks = ProductLocks::new();
        let _a = locks.lock("p-1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("p-2")).await;

        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_removed_after_last_guard() {
        let locks = ProductLocks::new();
        for n in 0..50 {
            let guard = locks.lock(&format!("p-{n}")).await;
            drop(guard);
        }
        assert!(locks.is_empty());

        let first = locks.lock("p-1").await;
        let contender = locks.clone();
        let waiting = tokio::spawn(async move { contender.lock("p-1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A waiter keeps the entry alive past the first release.
        drop(first);
        let second = waiting.await.unwrap();
        assert_eq!(locks.len(), 1);

        drop(second);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_covers() {
        let locks = ProductLocks::new();
        let guard = locks.lock("p-1").await;

        assert!(guard.ensure_covers("p-1").is_ok());
        assert!(matches!(
            guard.ensure_covers("p-2"),
            Err(DbError::LockMismatch { .. })
        ));
    }
}
