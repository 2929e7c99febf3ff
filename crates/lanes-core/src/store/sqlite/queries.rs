//! Row mapping and the [`StoreTx`] implementation for [`SqliteTx`].

use super::SqliteTx;
use crate::error::{Error, Missing, Result};
use crate::model::{
    Board, BoardId, ItemKey, Label, LabelId, NewBoard, NewLabel, NewStage, NewSubtaskGroup,
    NewTask, OrderedItem, Partition, Stage, StageId, StageSettings, SubtaskGroup, SubtaskGroupId,
    Task, TaskId, TaskStatus, UserId,
};
use crate::store::StoreTx;
use rusqlite::{OptionalExtension, Row, params, types::Type};
use std::collections::BTreeSet;
use std::str::FromStr;

const BOARD_COLUMNS: &str = "id, title, description, created_by, created_at_us, updated_at_us";

const STAGE_COLUMNS: &str = "id, board_id, title, position, settings_json, archived_at_us, \
     created_at_us, updated_at_us, revision";

const TASK_COLUMNS: &str = "id, board_id, stage_id, parent_id, group_id, title, description, \
     status, priority, is_template, position, archived_at_us, created_by, created_at_us, \
     updated_at_us, revision";

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error)))
}

fn row_to_board(row: &Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        created_at_us: row.get(4)?,
        updated_at_us: row.get(5)?,
    })
}

fn row_to_stage(row: &Row<'_>) -> rusqlite::Result<Stage> {
    let settings_json: String = row.get(4)?;
    let settings: StageSettings = serde_json::from_str(&settings_json).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(error))
    })?;
    Ok(Stage {
        id: row.get(0)?,
        board_id: row.get(1)?,
        title: row.get(2)?,
        position: row.get(3)?,
        settings,
        archived_at_us: row.get(5)?,
        created_at_us: row.get(6)?,
        updated_at_us: row.get(7)?,
        revision: row.get(8)?,
    })
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        board_id: row.get(1)?,
        stage_id: row.get(2)?,
        parent_id: row.get(3)?,
        group_id: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        status: parse_column(row, 7)?,
        priority: parse_column(row, 8)?,
        is_template: row.get(9)?,
        position: row.get(10)?,
        archived_at_us: row.get(11)?,
        created_by: row.get(12)?,
        created_at_us: row.get(13)?,
        updated_at_us: row.get(14)?,
        revision: row.get(15)?,
    })
}

fn row_to_label(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        board_id: row.get(1)?,
        title: row.get(2)?,
        color: row.get(3)?,
        created_at_us: row.get(4)?,
    })
}

/// Surface row-mapping failures as corruption rather than generic storage
/// errors.
fn map_row_error(error: rusqlite::Error) -> Error {
    match error {
        rusqlite::Error::FromSqlConversionFailure(idx, _, inner) => {
            Error::Corrupt(format!("column {idx}: {inner}"))
        }
        other => Error::Storage(other),
    }
}

impl SqliteTx<'_> {
    fn exists(&self, table: &str, id: i64) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
        Ok(self.conn.query_row(&sql, [id], |row| row.get(0))?)
    }

    fn collect_tasks(&self, sql: &str, id: i64) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([id], row_to_task)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_row_error)
    }

    /// Report why a revision-guarded update touched no row.
    fn conflict_or_missing(&self, table: &str, item: &OrderedItem) -> Error {
        match self.exists(table, item.key.raw_id()) {
            Ok(true) => Error::ConcurrencyConflict {
                key: item.key,
                expected: item.revision,
            },
            Ok(false) => Error::not_found(Missing::Item(item.key)),
            Err(error) => error,
        }
    }

    fn update_stage(&self, id: StageId, item: &OrderedItem) -> Result<()> {
        let Partition::Board(board_id) = item.partition else {
            return Err(Error::invalid_target("stages live in board partitions"));
        };
        let changed = self.conn.execute(
            "UPDATE stages
             SET board_id = ?1, position = ?2, archived_at_us = ?3, updated_at_us = ?4,
                 revision = revision + 1
             WHERE id = ?5 AND revision = ?6",
            params![
                board_id,
                item.position,
                item.archived_at_us,
                item.updated_at_us,
                id,
                item.revision
            ],
        )?;
        if changed == 0 {
            return Err(self.conflict_or_missing("stages", item));
        }
        Ok(())
    }

    fn update_task(&self, id: TaskId, item: &OrderedItem) -> Result<()> {
        let missing_partition = || Error::not_found(Missing::Partition(item.partition));
        let (stage_id, parent_id, board_id) = match item.partition {
            Partition::Stage(stage) => {
                let board = self.stage(stage)?.ok_or_else(missing_partition)?.board_id;
                (Some(stage), None, board)
            }
            Partition::Subtasks(parent) => {
                let board = self.task(parent)?.ok_or_else(missing_partition)?.board_id;
                (None, Some(parent), board)
            }
            Partition::Board(_) => {
                return Err(Error::invalid_target("tasks cannot live in a board partition"));
            }
        };

        let changed = self.conn.execute(
            "UPDATE tasks
             SET group_id = CASE WHEN parent_id IS ?2 THEN group_id ELSE NULL END,
                 stage_id = ?1, parent_id = ?2, board_id = ?3, position = ?4,
                 archived_at_us = ?5, updated_at_us = ?6, revision = revision + 1
             WHERE id = ?7 AND revision = ?8",
            params![
                stage_id,
                parent_id,
                board_id,
                item.position,
                item.archived_at_us,
                item.updated_at_us,
                id,
                item.revision
            ],
        )?;
        if changed == 0 {
            return Err(self.conflict_or_missing("tasks", item));
        }
        self.conn.execute(
            "UPDATE tasks SET board_id = ?1 WHERE parent_id = ?2 AND board_id <> ?1",
            params![board_id, id],
        )?;
        Ok(())
    }
}

impl StoreTx for SqliteTx<'_> {
    fn find_item(&self, key: ItemKey) -> Result<Option<OrderedItem>> {
        Ok(match key {
            ItemKey::Stage(id) => self.stage(id)?.map(|stage| stage.ordered()),
            ItemKey::Task(id) => self.task(id)?.and_then(|task| task.ordered()),
        })
    }

    fn list_partition(
        &self,
        partition: Partition,
        include_archived: bool,
    ) -> Result<Vec<OrderedItem>> {
        Ok(match partition {
            Partition::Board(board) => self
                .stages(board, include_archived)?
                .iter()
                .map(Stage::ordered)
                .collect(),
            Partition::Stage(_) | Partition::Subtasks(_) => self
                .tasks(partition, include_archived)?
                .iter()
                .filter_map(Task::ordered)
                .collect(),
        })
    }

    fn update_item(&mut self, item: &OrderedItem) -> Result<OrderedItem> {
        match item.key {
            ItemKey::Stage(id) => self.update_stage(id, item)?,
            ItemKey::Task(id) => self.update_task(id, item)?,
        }
        Ok(OrderedItem {
            revision: item.revision + 1,
            ..item.clone()
        })
    }

    fn delete_item(&mut self, key: ItemKey) -> Result<()> {
        let changed = match key {
            ItemKey::Stage(id) => self.conn.execute("DELETE FROM stages WHERE id = ?1", [id])?,
            ItemKey::Task(id) => self.conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?,
        };
        if changed == 0 {
            return Err(Error::not_found(Missing::Item(key)));
        }
        Ok(())
    }

    fn board(&self, id: BoardId) -> Result<Option<Board>> {
        let sql = format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], row_to_board)
            .optional()
            .map_err(map_row_error)
    }

    fn boards(&self) -> Result<Vec<Board>> {
        let sql = format!("SELECT {BOARD_COLUMNS} FROM boards ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_board)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_row_error)
    }

    fn insert_board(&mut self, new: &NewBoard) -> Result<Board> {
        self.conn.execute(
            "INSERT INTO boards (title, description, created_by, created_at_us, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![new.title, new.description, new.created_by, new.created_at_us],
        )?;
        Ok(Board {
            id: BoardId::new(self.conn.last_insert_rowid()),
            title: new.title.clone(),
            description: new.description.clone(),
            created_by: new.created_by,
            created_at_us: new.created_at_us,
            updated_at_us: new.created_at_us,
        })
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>> {
        let sql = format!("SELECT {STAGE_COLUMNS} FROM stages WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], row_to_stage)
            .optional()
            .map_err(map_row_error)
    }

    fn stages(&self, board: BoardId, include_archived: bool) -> Result<Vec<Stage>> {
        let filter = if include_archived {
            ""
        } else {
            "AND archived_at_us IS NULL"
        };
        let sql = format!(
            "SELECT {STAGE_COLUMNS} FROM stages WHERE board_id = ?1 {filter} ORDER BY position, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([board], row_to_stage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_row_error)
    }

    fn insert_stage(&mut self, new: &NewStage) -> Result<Stage> {
        if !self.exists("boards", new.board_id.get())? {
            return Err(Error::not_found(Missing::Board(new.board_id)));
        }
        let settings_json = serde_json::to_string(&new.settings)
            .map_err(|error| Error::Corrupt(format!("stage settings: {error}")))?;
        self.conn.execute(
            "INSERT INTO stages (board_id, title, position, settings_json, created_at_us, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                new.board_id,
                new.title,
                new.position,
                settings_json,
                new.created_at_us
            ],
        )?;
        Ok(Stage {
            id: StageId::new(self.conn.last_insert_rowid()),
            board_id: new.board_id,
            title: new.title.clone(),
            position: new.position,
            settings: new.settings.clone(),
            archived_at_us: None,
            created_at_us: new.created_at_us,
            updated_at_us: new.created_at_us,
            revision: 0,
        })
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], row_to_task)
            .optional()
            .map_err(map_row_error)
    }

    fn tasks(&self, partition: Partition, include_archived: bool) -> Result<Vec<Task>> {
        let (container, id) = match partition {
            Partition::Board(_) => return Ok(Vec::new()),
            Partition::Stage(stage) => ("stage_id = ?1 AND parent_id IS NULL", stage.get()),
            Partition::Subtasks(parent) => ("parent_id = ?1", parent.get()),
        };
        let filter = if include_archived {
            ""
        } else {
            "AND archived_at_us IS NULL"
        };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {container} {filter} ORDER BY position, id"
        );
        self.collect_tasks(&sql, id)
    }

    fn insert_task(&mut self, new: &NewTask) -> Result<Task> {
        if new.stage_id.is_some() == new.parent_id.is_some() {
            return Err(Error::validation(
                "a task needs exactly one of stage or parent",
            ));
        }
        if !self.exists("boards", new.board_id.get())? {
            return Err(Error::not_found(Missing::Board(new.board_id)));
        }
        self.conn.execute(
            "INSERT INTO tasks (
                board_id, stage_id, parent_id, group_id, title, description, status,
                priority, is_template, position, created_by, created_at_us, updated_at_us
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                new.board_id,
                new.stage_id,
                new.parent_id,
                new.group_id,
                new.title,
                new.description,
                new.status.as_str(),
                new.priority.as_str(),
                new.is_template,
                new.position,
                new.created_by,
                new.created_at_us
            ],
        )?;
        Ok(Task {
            id: TaskId::new(self.conn.last_insert_rowid()),
            board_id: new.board_id,
            stage_id: new.stage_id,
            parent_id: new.parent_id,
            group_id: new.group_id,
            title: new.title.clone(),
            description: new.description.clone(),
            status: new.status,
            priority: new.priority,
            is_template: new.is_template,
            position: new.position,
            archived_at_us: None,
            created_by: new.created_by,
            created_at_us: new.created_at_us,
            updated_at_us: new.created_at_us,
            revision: 0,
        })
    }

    fn set_task_status(&mut self, id: TaskId, status: TaskStatus) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(id))));
        }
        Ok(())
    }

    fn assignees(&self, task: TaskId) -> Result<BTreeSet<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM task_assignees WHERE task_id = ?1")?;
        let rows = stmt.query_map([task], |row| row.get::<_, UserId>(0))?;
        Ok(rows.collect::<rusqlite::Result<BTreeSet<_>>>()?)
    }

    fn assign(&mut self, task: TaskId, user: UserId) -> Result<bool> {
        if !self.exists("tasks", task.get())? {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(task))));
        }
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?1, ?2)",
            params![task, user],
        )?;
        Ok(inserted > 0)
    }

    fn label(&self, id: LabelId) -> Result<Option<Label>> {
        self.conn
            .query_row(
                "SELECT id, board_id, title, color, created_at_us FROM labels WHERE id = ?1",
                [id],
                row_to_label,
            )
            .optional()
            .map_err(map_row_error)
    }

    fn labels(&self, board: BoardId) -> Result<Vec<Label>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, board_id, title, color, created_at_us
             FROM labels WHERE board_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([board], row_to_label)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_row_error)
    }

    fn insert_label(&mut self, new: &NewLabel) -> Result<Label> {
        if !self.exists("boards", new.board_id.get())? {
            return Err(Error::not_found(Missing::Board(new.board_id)));
        }
        self.conn.execute(
            "INSERT INTO labels (board_id, title, color, created_at_us) VALUES (?1, ?2, ?3, ?4)",
            params![new.board_id, new.title, new.color, new.created_at_us],
        )?;
        Ok(Label {
            id: LabelId::new(self.conn.last_insert_rowid()),
            board_id: new.board_id,
            title: new.title.clone(),
            color: new.color.clone(),
            created_at_us: new.created_at_us,
        })
    }

    fn task_labels(&self, task: TaskId) -> Result<Vec<LabelId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label_id FROM task_labels WHERE task_id = ?1 ORDER BY label_id")?;
        let rows = stmt.query_map([task], |row| row.get::<_, LabelId>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn attach_label(&mut self, task: TaskId, label: LabelId) -> Result<()> {
        if !self.exists("tasks", task.get())? {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(task))));
        }
        if !self.exists("labels", label.get())? {
            return Err(Error::not_found(Missing::Label(label)));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO task_labels (task_id, label_id) VALUES (?1, ?2)",
            params![task, label],
        )?;
        Ok(())
    }

    fn clear_labels(&mut self, task: TaskId) -> Result<()> {
        self.conn
            .execute("DELETE FROM task_labels WHERE task_id = ?1", [task])?;
        Ok(())
    }

    fn subtask_groups(&self, task: TaskId) -> Result<Vec<SubtaskGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, title, position, created_at_us
             FROM subtask_groups WHERE task_id = ?1 ORDER BY position, id",
        )?;
        let rows = stmt.query_map([task], |row| {
            Ok(SubtaskGroup {
                id: row.get(0)?,
                task_id: row.get(1)?,
                title: row.get(2)?,
                position: row.get(3)?,
                created_at_us: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_subtask_group(&mut self, new: &NewSubtaskGroup) -> Result<SubtaskGroup> {
        if !self.exists("tasks", new.task_id.get())? {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(new.task_id))));
        }
        self.conn.execute(
            "INSERT INTO subtask_groups (task_id, title, position, created_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![new.task_id, new.title, new.position, new.created_at_us],
        )?;
        Ok(SubtaskGroup {
            id: SubtaskGroupId::new(self.conn.last_insert_rowid()),
            task_id: new.task_id,
            title: new.title.clone(),
            position: new.position,
            created_at_us: new.created_at_us,
        })
    }

    fn commit(mut self) -> Result<()> {
        self.finish()
    }
}
