//! Session-level advisory lock serializing migrators on one store

use crate::executor::Executor;
use crate::migration::MigrationError;
use crate::value::Value;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock guard that automatically releases the lock when dropped
///
/// The lock is a PostgreSQL advisory lock held by the session, so it is also
/// released by the server if the connection dies mid-walk.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn Executor,
    key: i64,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the advisory lock `key`, polling until `timeout_seconds` elapse
    ///
    /// # Arguments
    ///
    /// * `executor` - Session that will hold the lock
    /// * `key` - Advisory lock key shared by every migrator of the database
    /// * `timeout_seconds` - How long to keep polling before giving up
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if another session keeps the lock,
    /// or `MigrationError::Store` if `pg_try_advisory_lock` itself fails.
    pub fn acquire(
        executor: &'a dyn Executor,
        key: i64,
        timeout_seconds: u64,
    ) -> Result<Self, MigrationError> {
        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_seconds);

        loop {
            let row = executor.query_one("SELECT pg_try_advisory_lock($1)", &[Value::BigInt(key)])?;
            if row.get_bool(0)? {
                log::debug!("Acquired migration lock {key}");
                return Ok(Self { executor, key });
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout {
                    key,
                    seconds: timeout_seconds,
                });
            }
            log::debug!("Migration lock {key} is held by another session, waiting");
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    #[must_use]
    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn executor(&self) -> &'a dyn Executor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        match self
            .executor
            .query_one("SELECT pg_advisory_unlock($1)", &[Value::BigInt(self.key)])
            .and_then(|row| row.get_bool(0))
        {
            Ok(true) => log::debug!("Released migration lock {}", self.key),
            Ok(false) => log::warn!("Migration lock {} was not held at release", self.key),
            Err(e) => log::error!("Failed to release migration lock {}: {e}", self.key),
        }
    }
}
