//! Named, expiring locks.
//!
//! Acquiring is one atomic "set if absent or expired" write. Expiry only
//! protects against a crashed holder leaking the lock forever; holders
//! renew while they make progress.

use crate::error::{StorageError, StorageResult};
use crate::rows::LOCK_SCHEMA;
use chrono::Utc;
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Proof of holding a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub name: String,
    owner: String,
}

impl LockToken {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: Uuid::new_v4().to_string(),
        }
    }
}

/// Mutual exclusion keyed by name.
pub trait LockStore: Send + Sync {
    /// Takes `name` for `ttl`. Returns `None` if a live holder has it.
    fn acquire(&self, name: &str, ttl: Duration) -> StorageResult<Option<LockToken>>;

    /// Extends a held lock. Returns `false` if it expired and was taken
    /// by someone else.
    fn renew(&self, token: &LockToken, ttl: Duration) -> StorageResult<bool>;

    /// Releases a held lock. Releasing a lock held by someone else is a no-op.
    fn release(&self, token: &LockToken) -> StorageResult<()>;
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Locks stored in the `locks` table, visible to every process sharing
/// the database file.
#[derive(Clone)]
pub struct SqliteLockStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLockStore {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(LOCK_SCHEMA)?;
        Ok(Self::shared(Arc::new(Mutex::new(conn))))
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(LOCK_SCHEMA)?;
        Ok(Self::shared(Arc::new(Mutex::new(conn))))
    }

    pub(crate) fn shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl LockStore for SqliteLockStore {
    fn acquire(&self, name: &str, ttl: Duration) -> StorageResult<Option<LockToken>> {
        let token = LockToken::new(name);
        let now = Utc::now().timestamp_millis();
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO locks (name, owner, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at
             WHERE locks.expires_at <= ?4",
            params![name, token.owner, now.saturating_add(ttl_millis(ttl)), now],
        )?;
        if changed == 0 {
            debug!(lock = name, "lock held elsewhere");
            return Ok(None);
        }
        Ok(Some(token))
    }

    fn renew(&self, token: &LockToken, ttl: Duration) -> StorageResult<bool> {
        let expires = Utc::now().timestamp_millis().saturating_add(ttl_millis(ttl));
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE locks SET expires_at = ?3 WHERE name = ?1 AND owner = ?2",
            params![token.name, token.owner, expires],
        )?;
        Ok(changed == 1)
    }

    fn release(&self, token: &LockToken) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM locks WHERE name = ?1 AND owner = ?2",
            params![token.name, token.owner],
        )?;
        Ok(())
    }
}

/// Process-local locks.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    held: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> StorageResult<MutexGuard<'_, HashMap<String, (String, Option<Instant>)>>> {
        self.held.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl LockStore for MemoryLockStore {
    fn acquire(&self, name: &str, ttl: Duration) -> StorageResult<Option<LockToken>> {
        let now = Instant::now();
        let mut held = self.held()?;
        // `None` expiry: a ttl too large to represent never expires.
        let live = held
            .get(name)
            .is_some_and(|(_, expires)| expires.is_none_or(|at| at > now));
        if live {
            return Ok(None);
        }
        let token = LockToken::new(name);
        held.insert(name.to_string(), (token.owner.clone(), now.checked_add(ttl)));
        Ok(Some(token))
    }

    fn renew(&self, token: &LockToken, ttl: Duration) -> StorageResult<bool> {
        let mut held = self.held()?;
        match held.get_mut(&token.name) {
            Some((owner, expires)) if *owner == token.owner => {
                *expires = Instant::now().checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release(&self, token: &LockToken) -> StorageResult<()> {
        let mut held = self.held()?;
        if held.get(&token.name).is_some_and(|(owner, _)| *owner == token.owner) {
            held.remove(&token.name);
        }
        Ok(())
    }
}
