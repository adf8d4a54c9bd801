//! A site server with the migration lock in front of it.
//!
//! Every process started against the same database shares one lock, so a
//! site can be served by any number of them during a migration.

use std::net::SocketAddr;
use std::sync::Arc;

use migration_lock::{Coordinator, MigrationLockDriver};
use migration_lock_sqlite::{SiteDb, SqliteConfigStore, SqliteContentStore};

pub mod config;
mod host;

pub use config::{ServerConfig, ServerConfigError, ServerConfigResult};
pub use host::host;

/// Open the site database and build the coordinator for it.
pub fn coordinator(config: &ServerConfig) -> anyhow::Result<(Coordinator, SqliteContentStore)> {
    let db = SiteDb::open(&config.database)?;
    let posts = SqliteContentStore::new(db.clone());
    let coordinator = Coordinator::new(
        config.lock.clone(),
        config.site.clone(),
        Arc::new(SqliteConfigStore::new(db)),
        Arc::new(posts.clone()),
    )?;
    Ok((coordinator, posts))
}

/// Bind the site on `config.listen`.
pub async fn serve(config: &ServerConfig) -> anyhow::Result<(MigrationLockDriver, SocketAddr)> {
    let (coordinator, posts) = coordinator(config)?;
    tracing::info!(
        database = %config.database.display(),
        enforce_lock = coordinator.config().enforce_lock,
        "site database ready"
    );
    let host = host(coordinator.clone(), posts);
    migration_lock::run(config.listen, coordinator, host)
        .await
        .map_err(anyhow::Error::msg)
}
