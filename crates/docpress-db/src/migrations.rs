//! Embedded SQL schema migrations.
//!
//! Fresh installs apply the highest-numbered migration, which is canonical
//! for the whole schema. The runner keys off the presence of the `documents`
//! table and tolerates statements that would duplicate existing objects, so
//! a partially-applied schema can be repaired by re-running startup.

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use docpress_core::{Error, Result};

/// Embedded migrations, ordered by version number ascending.
const MIGRATIONS: &[(u32, &str)] = &[(1, include_str!("migrations/0001_init.sql"))];

/// Whether this error reports an object that already exists.
fn is_duplicate_object(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.contains("already exists") || msg.contains("duplicate column name")
        }
        _ => false,
    }
}

/// Apply the embedded schema if the store has not been initialized.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let initialized: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'documents'",
    )
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)?;

    if initialized.is_some() {
        debug!(
            subsystem = "db",
            component = "migrations",
            "Schema present, skipping migration"
        );
        return Ok(());
    }

    let Some((version, sql)) = MIGRATIONS.last() else {
        return Ok(());
    };

    let mut applied = 0;
    for statement in sql.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        match sqlx::query(statement).execute(pool).await {
            Ok(_) => applied += 1,
            Err(e) if is_duplicate_object(&e) => {
                debug!(
                    subsystem = "db",
                    component = "migrations",
                    "Skipping statement for existing object"
                );
            }
            Err(e) => return Err(Error::Database(e)),
        }
    }

    info!(
        subsystem = "db",
        component = "migrations",
        version,
        statements = applied,
        "Applied schema migration"
    );
    Ok(())
}
