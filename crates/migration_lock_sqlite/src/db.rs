//! The site database: one pooled SQLite file shared by every request handler.

use std::path::{Path, PathBuf};
use std::time::Duration;

use migration_lock::{Intercepted, RequestLock};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Params;

use crate::error::{DatabaseError, DatabaseResult};
use crate::schema::SCHEMA_SITE;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

pub type PConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Handle to the site database. Cheap to clone.
///
/// Separate handles opened on the same file see each other's writes, which
/// is what lets several server processes share one lock.
#[derive(Clone)]
pub struct SiteDb {
    path: PathBuf,
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl SiteDb {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        Self::open_with_max_connections(path, DEFAULT_MAX_CONNECTIONS)
    }

    pub fn open_with_max_connections(path: &Path, max_connections: u32) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(parent.to_owned(), e))?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(initialize_connection);
        let pool = r2d2::Pool::builder()
            .max_size(max_connections)
            .build(manager)?;

        {
            let mut conn = pool.get()?;
            SCHEMA_SITE.initialize(&mut conn, &path.display().to_string())?;
        }

        Ok(Self {
            path: path.to_owned(),
            pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A pooled connection, for reads and for writes that must not go
    /// through the lock.
    pub fn conn(&self) -> DatabaseResult<PConn> {
        Ok(self.pool.get()?)
    }

    /// Run a host data-mutation statement through the request gate.
    ///
    /// A neutralized statement runs the dialect's inert statement instead,
    /// `params` are dropped and zero rows are reported changed.
    pub fn execute_gated<P: Params>(
        &self,
        lock: &RequestLock,
        sql: &str,
        params: P,
    ) -> DatabaseResult<usize> {
        let conn = self.conn()?;
        match lock.intercept(sql) {
            Intercepted::Pass(sql) => Ok(conn.execute(sql, params)?),
            Intercepted::Neutralized(noop) => {
                conn.execute_batch(noop)?;
                Ok(0)
            }
        }
    }
}

fn initialize_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    // tell SQLite to wait this long during write contention
    conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}
