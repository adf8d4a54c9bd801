use migration_lock::{ConfigStore, MigrationLockResult};
use rusqlite::OptionalExtension;

use crate::db::SiteDb;
use crate::error::DatabaseResult;

/// [`ConfigStore`] over the site's `options` table.
///
/// These writes bypass the request gate: only the coordinator itself and
/// the authenticated control API write through here.
#[derive(Clone)]
pub struct SqliteConfigStore {
    db: SiteDb,
}

impl SqliteConfigStore {
    pub fn new(db: SiteDb) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> DatabaseResult<Option<String>> {
        Ok(self
            .db
            .conn()?
            .query_row("SELECT value FROM options WHERE name = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    #[tracing::instrument(skip(self, value))]
    fn upsert(&self, key: &str, value: &str) -> DatabaseResult<usize> {
        Ok(self.db.conn()?.execute(
            "INSERT INTO options (name, value) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET value = excluded.value
             WHERE value IS NOT excluded.value",
            [key, value],
        )?)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, key: &str) -> DatabaseResult<usize> {
        Ok(self
            .db
            .conn()?
            .execute("DELETE FROM options WHERE name = ?1", [key])?)
    }
}

impl ConfigStore for SqliteConfigStore {
    fn get_option(&self, key: &str) -> MigrationLockResult<Option<String>> {
        Ok(self.get(key)?)
    }

    fn update_option(&self, key: &str, value: &str) -> MigrationLockResult<bool> {
        Ok(self.upsert(key, value)? > 0)
    }

    fn delete_option(&self, key: &str) -> MigrationLockResult<bool> {
        Ok(self.delete(key)? > 0)
    }
}
