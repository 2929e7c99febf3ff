//! `lanes task` — create tasks, subtasks and subtask groups, and clone
//! tasks.

use crate::output::{OutputMode, render};
use crate::project::Project;
use anyhow::Result;
use clap::{Args, Subcommand};
use lanes_core::model::{Priority, StageId, SubtaskGroupId, TaskId, UserId};
use lanes_core::service::{CloneTaskOptions, TaskDraft};
use std::io::Write;

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Append a task to a stage.
    Create(TaskCreateArgs),
    /// Append a subtask under a top-level task.
    Subtask(SubtaskArgs),
    /// Add a named subtask group to a task.
    Group(GroupArgs),
    /// Copy a task to the end of a stage.
    Clone(TaskCloneArgs),
}

#[derive(Args, Debug)]
pub struct DraftArgs {
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    /// `low`, `medium` or `high`.
    #[arg(long, default_value = "medium")]
    pub priority: Priority,
    /// Mark as a template task.
    #[arg(long)]
    pub template: bool,
}

impl DraftArgs {
    fn draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            is_template: self.template,
        }
    }
}

#[derive(Args, Debug)]
pub struct TaskCreateArgs {
    pub stage: StageId,
    #[command(flatten)]
    pub draft: DraftArgs,
}

#[derive(Args, Debug)]
pub struct SubtaskArgs {
    pub parent: TaskId,
    #[command(flatten)]
    pub draft: DraftArgs,
    /// Subtask group of the parent to file the subtask under.
    #[arg(long)]
    pub group: Option<SubtaskGroupId>,
}

#[derive(Args, Debug)]
pub struct GroupArgs {
    pub task: TaskId,
    pub title: String,
}

#[derive(Args, Debug)]
pub struct TaskCloneArgs {
    pub task: TaskId,
    /// Title of the copy; defaults to the source title.
    #[arg(long)]
    pub title: Option<String>,
    /// Destination stage; defaults to the source task's stage.
    #[arg(long = "to")]
    pub target_stage: Option<StageId>,
    #[arg(long)]
    pub subtasks: bool,
    #[arg(long)]
    pub labels: bool,
    #[arg(long)]
    pub assignees: bool,
}

pub fn run_task(
    command: &TaskCommand,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let boards = project.engine().boards();

    match command {
        TaskCommand::Create(args) => {
            let task = boards.create_task(actor, args.stage, &args.draft.draft())?;
            render(output, &task, |t, w| {
                writeln!(w, "created task {} at {}: {}", t.id, t.position, t.title)
            })
        }
        TaskCommand::Subtask(args) => {
            let task = boards.create_subtask(actor, args.parent, &args.draft.draft(), args.group)?;
            render(output, &task, |t, w| {
                writeln!(
                    w,
                    "created subtask {} under {} at {}: {}",
                    t.id, args.parent, t.position, t.title
                )
            })
        }
        TaskCommand::Group(args) => {
            let group = boards.create_subtask_group(actor, args.task, &args.title)?;
            render(output, &group, |g, w| {
                writeln!(w, "created group {} on task {}: {}", g.id, g.task_id, g.title)
            })
        }
        TaskCommand::Clone(args) => {
            let options = CloneTaskOptions {
                title: args.title.clone(),
                target_stage: args.target_stage,
                with_subtasks: args.subtasks,
                with_labels: args.labels,
                with_assignees: args.assignees,
            };
            let clone = project.engine().cloner().clone_task(actor, args.task, &options)?;
            render(output, &clone, |c, w| {
                writeln!(
                    w,
                    "cloned task {} into {} ({} subtasks)",
                    args.task,
                    c.task.id,
                    c.subtasks.len()
                )
            })
        }
    }
}
