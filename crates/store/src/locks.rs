//! Postgres advisory locks guarding scheduler sweeps against overlap.
//!
//! Uses transaction-scoped locks (`pg_try_advisory_xact_lock`): the lock
//! releases when the guard's transaction commits or rolls back, so a
//! crashed sweep can never wedge its successor.

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StoreError;

/// Held while a sweep runs; dropping it rolls back the transaction and
/// releases the lock. Call [`SweepGuard::release`] to finish cleanly.
pub struct SweepGuard {
    tx: Transaction<'static, Postgres>,
}

impl SweepGuard {
    pub async fn release(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AdvisoryLock {
    pool: PgPool,
}

impl AdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Try to take the named sweep lock. `None` means another instance
    /// holds it and this run should be skipped.
    pub async fn try_acquire(&self, name: &str) -> Result<Option<SweepGuard>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(lock_key(name))
            .fetch_one(&mut *tx)
            .await?;
        if acquired {
            Ok(Some(SweepGuard { tx }))
        } else {
            tx.rollback().await?;
            Ok(None)
        }
    }
}

/// Stable 64-bit FNV-1a over the sweep name. Must not change between
/// releases or two versions could run the same sweep concurrently.
fn lock_key(name: &str) -> i64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x1000_0000_01b3;
    let mut hash = OFFSET;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_stable_and_distinct() {
        assert_eq!(lock_key("expiry"), lock_key("expiry"));
        assert_ne!(lock_key("expiry"), lock_key("escalation"));
        assert_ne!(lock_key("retention"), lock_key("rule_reload"));
    }
}
