//! Helpers for unit tests

use std::ops::Deref;
use std::sync::Arc;

use tempfile::TempDir;

use crate::db::SiteDb;

/// Create a [TestDb] backed by a temp directory.
pub fn test_site_db() -> TestDb {
    let tmpdir = Arc::new(
        tempfile::Builder::new()
            .prefix("migration-lock-test-db")
            .tempdir()
            .unwrap(),
    );
    TestDb {
        db: SiteDb::open(&tmpdir.path().join("site.sqlite3"))
            .expect("Couldn't create test database"),
        _tmpdir: tmpdir,
    }
}

/// A test database in a temp directory
#[derive(Clone)]
pub struct TestDb {
    /// sqlite database
    db: SiteDb,
    /// temp directory for this database, removed when the last clone drops
    _tmpdir: Arc<TempDir>,
}

impl TestDb {
    /// Accessor
    pub fn db(&self) -> SiteDb {
        self.db.clone()
    }

    /// A second, independent handle on the same file, as another process
    /// serving the site would have.
    pub fn reopen(&self) -> SiteDb {
        SiteDb::open(self.db.path()).expect("Couldn't reopen test database")
    }
}

impl Deref for TestDb {
    type Target = SiteDb;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}
