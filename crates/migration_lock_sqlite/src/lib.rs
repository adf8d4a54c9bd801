//! SQLite backing for the migration lock.
//!
//! The site's `options` table is the shared config store every request
//! handler reads the lock from, and its `posts` table is the content the
//! consistency checksum is computed over. Host writes go through
//! [`SiteDb::execute_gated`] so an active lock can neutralize them.

mod config_store;
mod content;
mod db;
pub mod error;
pub mod schema;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config_store::SqliteConfigStore;
pub use content::SqliteContentStore;
pub use db::{SiteDb, DEFAULT_MAX_CONNECTIONS};
pub use error::{DatabaseError, DatabaseResult};
