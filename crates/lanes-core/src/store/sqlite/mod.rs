//! SQLite-backed store.
//!
//! Runtime defaults follow the usual single-file setup:
//! - `journal_mode = WAL` so a reader sees the last committed snapshot
//!   while another process writes
//! - `busy_timeout` (configurable, 5s default) absorbs short lock waits
//!   from other processes
//! - `foreign_keys = ON` so deletes cascade to subtasks, labels and
//!   assignees
//!
//! Write transactions use `BEGIN IMMEDIATE`, taking SQLite's write lock up
//! front so read-compute-write sequences never interleave across processes.
//! [`Store::read`] opens a deferred `BEGIN` instead, which takes no write
//! lock and so never waits on another process's writer.

pub mod migrations;
mod queries;
pub mod schema;

use super::Store;
use crate::error::Result;
use rusqlite::Connection;
use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::{debug, warn};

/// Busy timeout used when the caller has no configured value.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single SQLite connection shared behind a mutex.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, apply pragmas and migrate
    /// the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opening,
    /// configuring or migrating the database fails.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)?;
        configure_connection(&conn, busy_timeout)?;
        let version = migrations::migrate(&mut conn)?;
        debug!(path = %path.display(), version, "opened sqlite store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate or migrate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Backing file, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// An open SQLite transaction. Rolled back on drop unless committed.
pub struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteTx<'a>;

    fn begin(&self) -> Result<SqliteTx<'_>> {
        self.start("BEGIN IMMEDIATE")
    }

    fn read(&self) -> Result<SqliteTx<'_>> {
        self.start("BEGIN")
    }
}

impl SqliteStore {
    fn start(&self, statement: &str) -> Result<SqliteTx<'_>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(statement)?;
        Ok(SqliteTx {
            conn,
            finished: false,
        })
    }
}

impl SqliteTx<'_> {
    fn finish(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(error) = self.conn.execute_batch("ROLLBACK") {
            warn!(%error, "rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, SqliteStore, migrations};
    use crate::error::Error;
    use crate::model::{
        ItemKey, NewBoard, NewStage, NewTask, Partition, Priority, StageSettings, TaskStatus,
        UserId,
    };
    use crate::position::Position;
    use crate::store::{Store, StoreTx};
    use std::time::Duration;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = SqliteStore::open(&dir.path().join("lanes.sqlite3"), DEFAULT_BUSY_TIMEOUT)
            .expect("open store");
        (dir, store)
    }

    fn seed(store: &SqliteStore) -> (crate::model::BoardId, crate::model::StageId) {
        let mut tx = store.begin().unwrap();
        let board = tx
            .insert_board(&NewBoard {
                title: "Ops".into(),
                description: Some("on-call".into()),
                created_by: UserId::new(1),
                created_at_us: 10,
            })
            .unwrap();
        let stage = tx
            .insert_stage(&NewStage {
                board_id: board.id,
                title: "Todo".into(),
                position: Position::nth(1),
                settings: StageSettings {
                    default_task_status: Some(TaskStatus::Open),
                    ..StageSettings::default()
                },
                created_at_us: 10,
            })
            .unwrap();
        tx.commit().unwrap();
        (board.id, stage.id)
    }

    fn new_task(board: crate::model::BoardId, stage: crate::model::StageId, n: i64) -> NewTask {
        NewTask {
            board_id: board,
            stage_id: Some(stage),
            parent_id: None,
            group_id: None,
            title: format!("task {n}"),
            description: None,
            status: TaskStatus::Open,
            priority: Priority::High,
            is_template: false,
            position: Position::nth(n),
            created_by: UserId::new(1),
            created_at_us: 10,
        }
    }

    #[test]
    fn open_sets_wal_busy_timeout_and_fk() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            SqliteStore::open(&dir.path().join("a/b/lanes.sqlite3"), Duration::from_millis(1500))
                .unwrap();
        assert!(store.path().is_some());
        let conn = store.conn.lock().unwrap();

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout_ms, 1500);

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);

        assert_eq!(
            migrations::current_schema_version(&conn).unwrap(),
            migrations::LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn rows_roundtrip_through_columns() {
        let (_dir, store) = temp_store();
        let (board, stage) = seed(&store);
        let mut tx = store.begin().unwrap();
        let task = tx.insert_task(&new_task(board, stage, 1)).unwrap();

        let loaded = tx.task(task.id).unwrap().unwrap();
        assert_eq!(loaded, task);
        let stage_row = tx.stage(stage).unwrap().unwrap();
        assert_eq!(
            stage_row.settings.default_task_status,
            Some(TaskStatus::Open)
        );
        assert_eq!(tx.board(board).unwrap().unwrap().description.as_deref(), Some("on-call"));
    }

    #[test]
    fn uncommitted_writes_are_rolled_back() {
        let (_dir, store) = temp_store();
        let (board, stage) = seed(&store);
        {
            let mut tx = store.begin().unwrap();
            tx.insert_task(&new_task(board, stage, 1)).unwrap();
        }
        let tx = store.begin().unwrap();
        assert!(tx.tasks(Partition::Stage(stage), true).unwrap().is_empty());
    }

    #[test]
    fn stale_revision_is_a_conflict() {
        let (_dir, store) = temp_store();
        let (board, stage) = seed(&store);
        let mut tx = store.begin().unwrap();
        let task = tx.insert_task(&new_task(board, stage, 1)).unwrap();
        let item = task.ordered().unwrap();

        let bumped = tx.update_item(&item).unwrap();
        assert_eq!(bumped.revision, 1);
        let err = tx.update_item(&item).unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));
    }

    #[test]
    fn delete_cascades_to_subtasks() {
        let (_dir, store) = temp_store();
        let (board, stage) = seed(&store);
        let mut tx = store.begin().unwrap();
        let parent = tx.insert_task(&new_task(board, stage, 1)).unwrap();
        let child = tx
            .insert_task(&NewTask {
                stage_id: None,
                parent_id: Some(parent.id),
                ..new_task(board, stage, 1)
            })
            .unwrap();
        tx.assign(child.id, UserId::new(4)).unwrap();

        tx.delete_item(ItemKey::Stage(stage)).unwrap();
        assert!(tx.task(parent.id).unwrap().is_none());
        assert!(tx.task(child.id).unwrap().is_none());
        assert!(tx.assignees(child.id).unwrap().is_empty());
        assert!(matches!(
            tx.delete_item(ItemKey::Stage(stage)),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn reads_do_not_wait_for_another_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lanes.sqlite3");
        let writer = SqliteStore::open(&path, Duration::from_millis(50)).unwrap();
        let reader = SqliteStore::open(&path, Duration::from_millis(50)).unwrap();
        seed(&writer);

        let mut held = writer.begin().unwrap();
        held.insert_board(&NewBoard {
            title: "Pending".into(),
            description: None,
            created_by: UserId::new(1),
            created_at_us: 20,
        })
        .unwrap();

        let tx = reader.read().unwrap();
        let titles: Vec<String> = tx.boards().unwrap().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["Ops".to_string()]);
        drop(tx);

        assert!(matches!(reader.begin(), Err(Error::Storage(_))));
        held.commit().unwrap();
        assert_eq!(reader.read().unwrap().boards().unwrap().len(), 2);
    }
}
