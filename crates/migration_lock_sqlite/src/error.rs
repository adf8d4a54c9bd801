//! All possible errors when working with the site database

use std::path::PathBuf;

use migration_lock::MigrationLockError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Could not get a connection from the pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Could not create the database directory {0}: {1}")]
    DirectoryError(PathBuf, std::io::Error),

    #[error("Database schema version {found} is newer than the {known} known migrations")]
    SchemaTooNew { found: usize, known: usize },
}

impl PartialEq for DatabaseError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<DatabaseError> for MigrationLockError {
    fn from(e: DatabaseError) -> Self {
        MigrationLockError::store(e)
    }
}
