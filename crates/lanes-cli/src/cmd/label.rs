//! `lanes label` — board-scoped labels.

use crate::output::{OutputMode, render};
use crate::project::Project;
use anyhow::Result;
use clap::{Args, Subcommand};
use lanes_core::model::{BoardId, LabelId, TaskId, UserId};
use serde_json::json;
use std::io::Write;

#[derive(Subcommand, Debug)]
pub enum LabelCommand {
    /// Create a label on a board.
    Create(LabelCreateArgs),
    /// Attach a label to a task of the same board.
    Attach(AttachArgs),
}

#[derive(Args, Debug)]
pub struct LabelCreateArgs {
    pub board: BoardId,
    pub title: String,
    #[arg(long)]
    pub color: Option<String>,
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    pub task: TaskId,
    pub label: LabelId,
}

pub fn run_label(
    command: &LabelCommand,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let boards = project.engine().boards();

    match command {
        LabelCommand::Create(args) => {
            let label = boards.create_label(actor, args.board, &args.title, args.color.as_deref())?;
            render(output, &label, |l, w| {
                writeln!(w, "created label {} on board {}: {}", l.id, l.board_id, l.title)
            })
        }
        LabelCommand::Attach(args) => {
            boards.attach_label(actor, args.task, args.label)?;
            let value = json!({ "ok": true, "task": args.task, "label": args.label });
            render(output, &value, |_, w| {
                writeln!(w, "attached label {} to task {}", args.label, args.task)
            })
        }
    }
}
