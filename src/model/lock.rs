//! Scoped store locks
//!
//! A `Lock` owns a fresh lease and, if acquisition succeeded, the lock
//! key under it. Dropping the guard unlocks and revokes the lease on
//! every exit path, acquired or not.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::kv::Store;
use crate::lease::LeaseId;

/// Guard for one lock attempt
pub struct Lock {
    store: Store,
    key: String,
    lease: LeaseId,
    ttl: Duration,
    acquired: bool,
    released: bool,
}

impl Lock {
    /// Grant a lease of `ttl` and try to lock `key` under it
    ///
    /// `timeout` bounds how long a busy lock is retried; zero makes a
    /// single attempt and `Duration::MAX` waits indefinitely.
    pub fn acquire(
        store: &Store,
        key: impl Into<String>,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let key = key.into();
        let lease = store.grant_lease(ttl)?;

        let acquired = match store.lock(&key, lease, timeout) {
            Ok(acquired) => acquired,
            Err(e) => {
                if let Err(revoke_err) = store.revoke_lease(lease) {
                    tracing::warn!("Failed to revoke lease {}: {}", lease, revoke_err);
                }
                return Err(e);
            }
        };

        Ok(Self {
            store: Arc::clone(store),
            key,
            lease,
            ttl,
            acquired,
            released: false,
        })
    }

    /// Whether this guard holds the lock right now
    ///
    /// Turns false after `release` and after the lease TTL has elapsed.
    pub fn is_acquired(&self) -> bool {
        if !self.acquired || self.released {
            return false;
        }
        match self.store.get(&self.key) {
            Ok(Some(kv)) => kv.lease == Some(self.lease),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to check lock {}: {}", self.key, e);
                false
            }
        }
    }

    /// Release early; later calls (and the drop) are no-ops
    ///
    /// Returns whether the lock key was still held. The lease is revoked
    /// even when unlocking fails; the first error is returned.
    pub fn release(&mut self) -> Result<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;

        let unlocked = if self.acquired {
            self.store.unlock(&self.key, self.lease)
        } else {
            Ok(false)
        };
        // Revoking also deletes the lock key, so it runs even if unlock failed
        let revoked = self.store.revoke_lease(self.lease);

        let unlocked = unlocked?;
        revoked?;
        Ok(unlocked)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn lease(&self) -> LeaseId {
        self.lease
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to release lock {}: {}", self.key, e);
        }
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("lease", &self.lease)
            .field("ttl", &self.ttl)
            .field("acquired", &self.acquired)
            .field("released", &self.released)
            .finish()
    }
}
