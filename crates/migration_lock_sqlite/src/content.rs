use migration_lock::{ContentRow, ContentSource, MigrationLockResult, RequestLock};

use crate::db::SiteDb;
use crate::error::DatabaseResult;

/// The site's `posts` table, as checksummed content and as the host's
/// write target.
#[derive(Clone)]
pub struct SqliteContentStore {
    db: SiteDb,
}

impl SqliteContentStore {
    pub fn new(db: SiteDb) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip_all)]
    pub fn rows(&self) -> DatabaseResult<Vec<ContentRow>> {
        let conn = self.db.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT id, title, guid, content FROM posts ORDER BY id DESC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ContentRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    guid: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a post through the request gate. Returns the number of rows
    /// written, zero when the lock swallowed the write.
    pub fn insert_post(
        &self,
        lock: &RequestLock,
        title: &str,
        guid: &str,
        content: &str,
    ) -> DatabaseResult<usize> {
        self.db.execute_gated(
            lock,
            "INSERT INTO posts (title, guid, content) VALUES (?1, ?2, ?3)",
            [title, guid, content],
        )
    }

    /// Edit a post's content through the request gate.
    pub fn update_content(
        &self,
        lock: &RequestLock,
        id: i64,
        content: &str,
    ) -> DatabaseResult<usize> {
        self.db.execute_gated(
            lock,
            "UPDATE posts SET content = ?1 WHERE id = ?2",
            rusqlite::params![content, id],
        )
    }
}

impl ContentSource for SqliteContentStore {
    fn content_rows(&self) -> MigrationLockResult<Vec<ContentRow>> {
        Ok(self.rows()?)
    }
}
