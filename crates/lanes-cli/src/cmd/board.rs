//! `lanes board` — create, list, show and clone boards.

use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render, render_mode};
use crate::project::Project;
use anyhow::Result;
use clap::{Args, Subcommand};
use lanes_core::model::{BoardId, UserId};
use lanes_core::service::{BoardView, CloneBoardOptions};
use std::io::{self, Write};

#[derive(Subcommand, Debug)]
pub enum BoardCommand {
    /// Create a board (admins only when access rules are configured).
    Create(CreateArgs),
    /// List boards the acting user may access.
    List,
    /// Show a board with its stages and tasks in order.
    Show(ShowArgs),
    /// Deep-copy a board.
    Clone(CloneArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub board: BoardId,
    /// Include archived stages and tasks.
    #[arg(long)]
    pub archived: bool,
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    pub board: BoardId,
    /// Title of the new board.
    #[arg(long)]
    pub title: String,
    /// Copy labels.
    #[arg(long)]
    pub labels: bool,
    /// Copy tasks and their subtasks.
    #[arg(long)]
    pub tasks: bool,
    /// With `--tasks`, copy only template tasks.
    #[arg(long, requires = "tasks")]
    pub templates_only: bool,
}

pub fn run_board(
    command: &BoardCommand,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let boards = project.engine().boards();

    match command {
        BoardCommand::Create(args) => {
            let _lock = project.write_lock()?;
            let board = boards.create_board(actor, &args.title, args.description.as_deref())?;
            render(output, &board, |b, w| {
                writeln!(w, "created board {}: {}", b.id, b.title)
            })
        }
        BoardCommand::List => {
            let list = boards.list_boards(actor)?;
            render(output, &list, |list, w| {
                for board in list {
                    writeln!(w, "{}\t{}", board.id, board.title)?;
                }
                Ok(())
            })
        }
        BoardCommand::Show(args) => {
            let view = boards.board_view(actor, args.board, args.archived)?;
            render_mode(output, &view, write_board_text, write_board_pretty)
        }
        BoardCommand::Clone(args) => {
            let _lock = project.write_lock()?;
            let options = CloneBoardOptions {
                with_labels: args.labels,
                with_tasks: args.tasks,
                with_templates_only: args.templates_only,
                ..CloneBoardOptions::titled(args.title.clone())
            };
            let clone = project
                .engine()
                .cloner()
                .clone_board(actor, args.board, &options)?;
            render(output, &clone, |c, w| {
                writeln!(
                    w,
                    "cloned board {} into {}: {} stages, {} tasks",
                    args.board,
                    c.board.id,
                    c.stages.len(),
                    c.tasks.len()
                )
            })
        }
    }
}

fn write_board_text(view: &BoardView, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "board:{}\t{}", view.board.id, view.board.title)?;
    for stage in &view.stages {
        writeln!(w, "stage:{}\t{}\t{}", stage.stage.id, stage.stage.position, stage.stage.title)?;
        for task in &stage.tasks {
            writeln!(w, "  task:{}\t{}\t{}", task.task.id, task.task.position, task.task.title)?;
            for subtask in &task.subtasks {
                writeln!(w, "    task:{}\t{}\t{}", subtask.id, subtask.position, subtask.title)?;
            }
        }
    }
    Ok(())
}

fn write_board_pretty(view: &BoardView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("{} (board {})", view.board.title, view.board.id))?;
    if let Some(description) = &view.board.description {
        pretty_kv(w, "About", description)?;
    }
    if !view.labels.is_empty() {
        let labels: Vec<String> = view
            .labels
            .iter()
            .map(|label| format!("{}:{}", label.id, label.title))
            .collect();
        pretty_kv(w, "Labels", labels.join(", "))?;
    }
    for stage in &view.stages {
        writeln!(w)?;
        let archived = if stage.stage.archived_at_us.is_some() { " [archived]" } else { "" };
        writeln!(w, "{} (stage {}){archived}", stage.stage.title, stage.stage.id)?;
        for task in &stage.tasks {
            let marker = if task.task.archived_at_us.is_some() { "~" } else { "-" };
            writeln!(
                w,
                "  {marker} [{}] {} ({}, {})",
                task.task.id, task.task.title, task.task.status, task.task.priority
            )?;
            for subtask in &task.subtasks {
                writeln!(w, "      · [{}] {}", subtask.id, subtask.title)?;
            }
        }
    }
    pretty_rule(w)
}
