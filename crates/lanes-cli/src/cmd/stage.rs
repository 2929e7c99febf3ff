//! `lanes stage` — append a stage to a board.

use crate::output::{OutputMode, render};
use crate::project::Project;
use anyhow::Result;
use clap::Args;
use lanes_core::model::{BoardId, StageSettings, TaskStatus, UserId};
use std::io::Write;

#[derive(Args, Debug)]
pub struct StageCreateArgs {
    pub board: BoardId,
    pub title: String,
    /// Status forced onto tasks moved into this stage (`open` or `closed`).
    #[arg(long)]
    pub status: Option<TaskStatus>,
    /// User assigned to tasks moved into this stage. Repeatable.
    #[arg(long = "assignee")]
    pub assignees: Vec<UserId>,
    /// Mark the stage as a template.
    #[arg(long)]
    pub template: bool,
    #[arg(long)]
    pub public: bool,
}

pub fn run_stage_create(
    args: &StageCreateArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;

    let settings = StageSettings {
        default_task_status: args.status,
        default_assignees: args.assignees.iter().copied().collect(),
        is_template: args.template,
        is_public: args.public,
    };
    let stage = project
        .engine()
        .boards()
        .create_stage(actor, args.board, &args.title, settings)?;

    render(output, &stage, |s, w| {
        writeln!(
            w,
            "created stage {} on board {} at {}: {}",
            s.id, s.board_id, s.position, s.title
        )
    })
}
