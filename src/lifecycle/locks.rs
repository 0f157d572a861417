//! Per-loan write locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per loan id, created on first use
#[derive(Debug, Default)]
pub struct LoanLocks {
    locks: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

impl LoanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `loan_id`
    pub async fn acquire(&self, loan_id: u64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(loan_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_loan_is_exclusive() {
        let locks = LoanLocks::new();
        let _guard = locks.acquire(1).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(1)).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_different_loans_do_not_contend() {
        let locks = LoanLocks::new();
        let _first = locks.acquire(1).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let locks = LoanLocks::new();
        drop(locks.acquire(1).await);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(1)).await;
        assert!(again.is_ok());
    }
}
