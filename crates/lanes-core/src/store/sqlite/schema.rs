//! Canonical SQLite schema for lanes.
//!
//! - `boards`, `stages`, `tasks` hold the ordered containers and items;
//!   `position` is the fixed-point rank inside the partition
//! - `tasks` rows are either top-level (`stage_id` set) or subtasks
//!   (`parent_id` set), never both
//! - edge tables (`task_labels`, `task_assignees`) model multi-valued links
//! - `store_meta` mirrors the schema version for external tooling

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS boards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT,
    created_by INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    position INTEGER NOT NULL CHECK (position >= 0),
    settings_json TEXT NOT NULL DEFAULT '{}',
    archived_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS subtask_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    stage_id INTEGER REFERENCES stages(id) ON DELETE CASCADE,
    parent_id INTEGER REFERENCES tasks(id) ON DELETE CASCADE,
    group_id INTEGER REFERENCES subtask_groups(id) ON DELETE SET NULL,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT,
    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
    priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high')),
    is_template INTEGER NOT NULL DEFAULT 0 CHECK (is_template IN (0, 1)),
    position INTEGER NOT NULL CHECK (position >= 0),
    archived_at_us INTEGER,
    created_by INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    CHECK ((stage_id IS NULL) <> (parent_id IS NULL))
);

CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    color TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS task_labels (
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
    PRIMARY KEY (task_id, label_id)
);

CREATE TABLE IF NOT EXISTS task_assignees (
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL CHECK (user_id > 0),
    PRIMARY KEY (task_id, user_id)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: partition read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_stages_board_position
    ON stages(board_id, position, id);

CREATE INDEX IF NOT EXISTS idx_tasks_stage_position
    ON tasks(stage_id, position, id);

CREATE INDEX IF NOT EXISTS idx_tasks_parent_position
    ON tasks(parent_id, position, id);

CREATE INDEX IF NOT EXISTS idx_tasks_board
    ON tasks(board_id);

CREATE INDEX IF NOT EXISTS idx_labels_board
    ON labels(board_id);

CREATE INDEX IF NOT EXISTS idx_task_labels_label
    ON task_labels(label_id, task_id);

CREATE INDEX IF NOT EXISTS idx_subtask_groups_task
    ON subtask_groups(task_id, position);
";

/// Indexes expected after all migrations are applied.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_stages_board_position",
    "idx_tasks_stage_position",
    "idx_tasks_parent_position",
    "idx_tasks_board",
    "idx_labels_board",
    "idx_task_labels_label",
    "idx_subtask_groups_task",
];
