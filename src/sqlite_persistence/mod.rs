mod versioned_schema;

pub use versioned_schema::*;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Opens the database at `db_path`, creating it with the latest schema when it
/// does not exist yet, otherwise validating it against its recorded version and
/// migrating it forward.
///
/// `schemas` must be sorted by version, latest last.
pub fn open_versioned_db<P: AsRef<Path>>(
    db_path: P,
    schemas: &'static [VersionedSchema],
    label: &str,
) -> Result<Connection> {
    let path = db_path.as_ref();
    let is_new_db = !path.exists();
    let latest = schemas
        .last()
        .with_context(|| format!("No schema registered for {} database", label))?;

    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open {} database at {:?}", label, path))?;

    if is_new_db {
        info!("Creating new {} database at {:?}", label, path);
        latest.create(&conn)?;
        return Ok(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 1 {
        bail!(
            "{} database version {} is invalid (expected >= 1)",
            label,
            db_version
        );
    }
    let db_version = db_version as usize;

    let schema = schemas
        .iter()
        .find(|s| s.version == db_version)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?;
    schema.validate(&conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            label, db_version
        )
    })?;

    if db_version < latest.version {
        info!(
            "Migrating {} database from version {} to {}",
            label, db_version, latest.version
        );
        migrate(&mut conn, schemas, db_version)?;
    }

    Ok(conn)
}

/// Creates a throwaway in-memory database with the latest schema.
pub fn open_in_memory_db(schemas: &'static [VersionedSchema]) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schemas
        .last()
        .context("No schema registered")?
        .create(&conn)?;
    Ok(conn)
}

fn migrate(
    conn: &mut Connection,
    schemas: &'static [VersionedSchema],
    from_version: usize,
) -> Result<()> {
    let tx = conn.transaction()?;
    let mut current = from_version;
    for schema in schemas.iter().filter(|s| s.version > from_version) {
        info!(
            "Running migration from version {} to {}",
            current, schema.version
        );
        if let Some(migration_fn) = schema.migration {
            migration_fn(&tx).with_context(|| {
                format!("Failed to run migration to version {}", schema.version)
            })?;
        }
        current = schema.version;
    }
    tx.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + current),
        [],
    )?;
    tx.commit()?;
    Ok(())
}
