//! Schema upgrades for a lanes database.
//!
//! The file records how far it has been upgraded twice: in
//! `PRAGMA user_version` and in `store_meta.schema_version`. Both move
//! together inside the step's transaction, so a crash mid-upgrade leaves
//! the file at the previous step rather than half-applied.

use super::schema;
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// One forward step of the schema.
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Migration] = &[
    Migration {
        version: 1,
        name: "tables",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "partition indexes",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Schema version a freshly migrated database ends up at.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Schema step the database at `conn` has reached, `0` when untouched.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] when `user_version` is negative, or a storage
/// error if the pragma cannot be read.
pub fn current_schema_version(conn: &Connection) -> Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(raw).map_err(|_| Error::Corrupt(format!("schema version {raw}")))
}

/// Bring the database up to [`LATEST_SCHEMA_VERSION`] and return the
/// version it ends at.
///
/// Steps already recorded are skipped, so opening the same file again is a
/// no-op.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] for a database written by a newer `lanes`, or
/// a storage error when a step fails. A failed step is rolled back and the
/// earlier steps stay applied.
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    let found = current_schema_version(conn)?;
    if found > LATEST_SCHEMA_VERSION {
        return Err(Error::Corrupt(format!(
            "schema version {found} is newer than {LATEST_SCHEMA_VERSION}; upgrade lanes"
        )));
    }

    let mut reached = found;
    for step in STEPS.iter().filter(|step| step.version > found) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;
        debug!(version = step.version, name = step.name, "schema step applied");
        reached = step.version;
    }

    if reached != found {
        info!(from = found, to = reached, "database schema upgraded");
    }
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, STEPS, current_schema_version, migrate};
    use crate::error::{Error, ErrorCode, Result};
    use crate::store::sqlite::schema;
    use rusqlite::{Connection, params};

    fn has(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            params![kind, name],
            |row| row.get(0),
        )?)
    }

    fn meta_version(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT schema_version FROM store_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?)
    }

    #[test]
    fn steps_are_ascending_and_end_at_latest() {
        assert!(STEPS.windows(2).all(|pair| pair[0].version < pair[1].version));
        assert_eq!(STEPS.last().map(|step| step.version), Some(LATEST_SCHEMA_VERSION));
    }

    #[test]
    fn fresh_database_gets_every_table_and_index() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(current_schema_version(&conn)?, 0);

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(meta_version(&conn)?, i64::from(LATEST_SCHEMA_VERSION));

        for table in [
            "boards",
            "stages",
            "tasks",
            "labels",
            "task_labels",
            "task_assignees",
            "subtask_groups",
            "store_meta",
        ] {
            assert!(has(&conn, "table", table)?, "missing table {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(has(&conn, "index", index)?, "missing index {index}");
        }
        Ok(())
    }

    #[test]
    fn reopening_changes_nothing() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        conn.execute(
            "INSERT INTO boards (title, created_by, created_at_us, updated_at_us)
             VALUES ('kept', 1, 1, 1)",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        let boards: i64 = conn.query_row("SELECT COUNT(*) FROM boards", [], |row| row.get(0))?;
        let meta_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM store_meta", [], |row| row.get(0))?;
        assert_eq!((boards, meta_rows), (1, 1));
        Ok(())
    }

    #[test]
    fn partial_database_resumes_at_next_step() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1_i64)?;
        assert!(!has(&conn, "index", schema::REQUIRED_INDEXES[0])?);

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert!(has(&conn, "index", schema::REQUIRED_INDEXES[0])?);
        assert_eq!(meta_version(&conn)?, i64::from(LATEST_SCHEMA_VERSION));
        Ok(())
    }

    #[test]
    fn newer_database_is_refused() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "user_version", i64::from(LATEST_SCHEMA_VERSION + 1))?;

        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, Error::Corrupt(ref detail) if detail.contains("newer")));
        assert_eq!(err.code(), ErrorCode::CorruptStore);
        assert!(!has(&conn, "table", "boards")?);
        Ok(())
    }

    #[test]
    fn task_must_have_exactly_one_container() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        conn.execute(
            "INSERT INTO boards (title, created_by, created_at_us, updated_at_us)
             VALUES ('b', 1, 1, 1)",
            [],
        )?;
        let orphan = conn.execute(
            "INSERT INTO tasks (board_id, title, position, created_by, created_at_us, updated_at_us)
             VALUES (1, 'loose', 65536, 1, 1, 1)",
            [],
        );
        assert!(orphan.is_err());
        Ok(())
    }
}
