//! Schema and migration definitions
//!
//! To change the schema, append a [`Migration`] to the schema's list. The
//! `user_version` pragma records how many migrations a database has seen, so
//! existing migrations must never be edited.

use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction};

use crate::error::{DatabaseError, DatabaseResult};

pub static SCHEMA_SITE: Lazy<Schema> = Lazy::new(|| Schema {
    migrations: vec![M::initial(include_str!("sql/site/schema/0.sql"))],
});

pub struct Schema {
    migrations: Vec<Migration>,
}

impl Schema {
    /// Run every migration the database has not seen yet, in one
    /// transaction. NB: `user_version` is the count of applied migrations.
    pub fn initialize(&self, conn: &mut Connection, db_name: &str) -> DatabaseResult<()> {
        let user_version: u16 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        let migrations_applied = user_version as usize;
        let num_migrations = self.migrations.len();
        match migrations_applied.cmp(&num_migrations) {
            std::cmp::Ordering::Less => {
                let mut txn = conn.transaction()?;
                for v in migrations_applied..num_migrations {
                    self.migrations[v].run_forward(&mut txn)?;
                    txn.pragma_update(None, "user_version", v + 1)?;
                }
                txn.commit()?;
                tracing::info!(
                    "database forward migrated: {} from {} to {}",
                    db_name,
                    migrations_applied,
                    num_migrations,
                );
            }
            std::cmp::Ordering::Equal => {
                tracing::debug!("database needed no migration: {}", db_name);
            }
            std::cmp::Ordering::Greater => {
                return Err(DatabaseError::SchemaTooNew {
                    found: migrations_applied,
                    known: num_migrations,
                });
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Migration {
    forward: Sql,
}

impl Migration {
    /// The initial migration's forward migration is the entire schema
    pub fn initial(schema: &str) -> Self {
        Self {
            forward: schema.into(),
        }
    }

    pub fn forward(sql: &str) -> Self {
        Self { forward: sql.into() }
    }

    pub fn run_forward(&self, txn: &mut Transaction) -> rusqlite::Result<()> {
        txn.execute_batch(&self.forward)
    }
}
type M = Migration;

type Sql = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_schema_applies_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        SCHEMA_SITE.initialize(&mut conn, "test").unwrap();
        SCHEMA_SITE.initialize(&mut conn, "test").unwrap();
        assert_eq!(
            conn.execute("INSERT INTO options (name, value) VALUES ('a', 'b')", ())
                .unwrap(),
            1
        );
        assert_eq!(
            conn.execute("INSERT INTO posts (title) VALUES ('hello')", ())
                .unwrap(),
            1
        );
    }

    #[test]
    fn only_new_migrations_run() {
        let mut schema = Schema {
            migrations: vec![M::initial("CREATE TABLE Numbers (num INTEGER);")],
        };

        let mut conn = Connection::open_in_memory().unwrap();
        schema.initialize(&mut conn, "test").unwrap();
        assert!(conn
            .execute("INSERT INTO Names (name) VALUES ('Mike')", ())
            .is_err());

        schema.migrations = vec![
            M::initial("This bad SQL won't run, phew!"),
            M::forward("CREATE TABLE Names (name TEXT);"),
        ];
        schema.initialize(&mut conn, "test").unwrap();
        assert_eq!(
            conn.execute("INSERT INTO Names (name) VALUES ('Mike')", ())
                .unwrap(),
            1
        );
    }

    #[test]
    fn newer_database_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 5).unwrap();
        assert_eq!(
            SCHEMA_SITE.initialize(&mut conn, "test"),
            Err(DatabaseError::SchemaTooNew { found: 5, known: 1 })
        );
    }
}
