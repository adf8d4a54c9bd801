//! The external key-value config store and the lock value kept in it.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::error::{MigrationLockError, MigrationLockResult};

/// The hosting platform's key-value configuration service.
///
/// Every process serving the site must see the same values, and a write
/// must be visible to the next read from any process.
pub trait ConfigStore: Send + Sync {
    /// Current value of `key`, if any.
    fn get_option(&self, key: &str) -> MigrationLockResult<Option<String>>;

    /// Store `value` under `key`. Returns whether the stored value changed.
    fn update_option(&self, key: &str, value: &str) -> MigrationLockResult<bool>;

    /// Remove `key`. Returns whether there was a value to remove.
    fn delete_option(&self, key: &str) -> MigrationLockResult<bool>;
}

/// Shared handle to a [`ConfigStore`].
pub type ConfigStoreRef = Arc<dyn ConfigStore>;

/// Process-local [`ConfigStore`]. Only correct when a single process serves
/// the site.
#[derive(Clone, Debug, Default)]
pub struct MemConfigStore(Arc<RwLock<HashMap<String, String>>>);

impl MemConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemConfigStore {
    fn get_option(&self, key: &str) -> MigrationLockResult<Option<String>> {
        Ok(self.0.read().get(key).cloned())
    }

    fn update_option(&self, key: &str, value: &str) -> MigrationLockResult<bool> {
        let mut lock = self.0.write();
        if lock.get(key).map(String::as_str) == Some(value) {
            return Ok(false);
        }
        lock.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    fn delete_option(&self, key: &str) -> MigrationLockResult<bool> {
        Ok(self.0.write().remove(key).is_some())
    }
}

/// The persisted "writes blocked until" timestamp.
///
/// Absent or zero means unlocked. The value is a unix timestamp in seconds
/// and expires on its own once that instant has passed.
#[derive(Clone)]
pub struct LockStateStore {
    store: ConfigStoreRef,
    key: String,
}

impl LockStateStore {
    pub fn new(store: ConfigStoreRef, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The stored unlock instant. `None` when absent or not positive.
    pub fn unlock_at(&self) -> MigrationLockResult<Option<i64>> {
        let raw = match self.store.get_option(&self.key)? {
            None => return Ok(None),
            Some(raw) => raw,
        };
        let ts: i64 = raw
            .trim()
            .parse()
            .map_err(|_| MigrationLockError::InvalidTimestamp {
                key: self.key.clone(),
                value: raw.clone(),
            })?;
        Ok((ts > 0).then_some(ts))
    }

    /// Persist a new unlock instant.
    pub fn arm(&self, unlock_at: i64) -> MigrationLockResult<bool> {
        self.store.update_option(&self.key, &unlock_at.to_string())
    }

    /// Remove the persisted lock entirely.
    pub fn disarm(&self) -> MigrationLockResult<bool> {
        self.store.delete_option(&self.key)
    }
}
