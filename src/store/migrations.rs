//! Schema migrations for the SQLite store.
//!
//! Migrations are versioned and tracked in the `migrations` table.
//! Each migration is run exactly once, in order.

use rusqlite::Connection;

use crate::store::schema::{
    CREATE_KV_ENTRIES_TABLE, CREATE_KV_ENTRIES_UPDATED_AT_INDEX, CREATE_MIGRATIONS_TABLE,
};
use crate::store::StoreError;

/// A schema migration with a version number, name, and SQL statements.
struct Migration {
    version: i32,
    name: &'static str,
    statements: &'static [&'static str],
}

/// All migrations to be applied, in order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_kv_entries_table",
        statements: &[CREATE_KV_ENTRIES_TABLE],
    },
    Migration {
        version: 2,
        name: "index_kv_entries_updated_at",
        statements: &[CREATE_KV_ENTRIES_UPDATED_AT_INDEX],
    },
];

/// Returns the latest schema version this build knows about.
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Returns the current schema version from the database.
pub fn current_version(conn: &Connection) -> Result<i32, StoreError> {
    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Records a migration as applied.
fn record_migration(conn: &Connection, version: i32, name: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        (version, name),
    )?;
    Ok(())
}

/// Runs all pending migrations.
///
/// Each migration runs in its own transaction; a failing migration is rolled
/// back and leaves earlier ones in place.
pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;

    let version = current_version(conn)?;
    if version > latest_version() {
        return Err(StoreError::Migration(format!(
            "Database schema v{} is newer than this build (v{})",
            version,
            latest_version()
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > version).collect();

    if pending.is_empty() {
        tracing::debug!("Store schema is up to date (v{})", version);
        return Ok(());
    }

    tracing::info!(
        "Store schema at v{}, {} pending migration(s)",
        version,
        pending.len()
    );

    for migration in pending {
        let tx = conn.transaction()?;

        for statement in migration.statements {
            tx.execute_batch(statement).map_err(|e| {
                StoreError::Migration(format!("Migration {} failed: {}", migration.name, e))
            })?;
        }

        record_migration(&tx, migration.version, migration.name)?;
        tx.commit()?;

        tracing::info!(
            "Applied migration {} (v{})",
            migration.name,
            migration.version
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();

        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let table_exists: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='kv_entries'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_exists, 1);
    }

    #[test]
    fn test_migration_version_tracking() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), latest_version());
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (99, 'from_the_future')",
            [],
        )
        .unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
    }
}
