#![forbid(unsafe_code)]

mod cmd;
mod output;
mod project;

use clap::{Parser, Subcommand};
use lanes_core::config::{EffectiveConfig, resolve_config};
use lanes_core::model::UserId;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use project::Project;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lanes: ordered boards, stages and tasks",
    long_about = None
)]
struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Acting user id (falls back to LANES_USER, then `[cli] user`).
    #[arg(long, global = true)]
    user: Option<UserId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a lanes project",
        after_help = "EXAMPLES:\n    lanes init\n    lanes init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Boards", about = "Create, list, show and clone boards")]
    Board {
        #[command(subcommand)]
        command: cmd::board::BoardCommand,
    },

    #[command(
        next_help_heading = "Boards",
        about = "Append a stage to a board",
        after_help = "EXAMPLES:\n    lanes stage 1 \"Doing\"\n    lanes stage 1 \"Done\" --status closed --assignee 7"
    )]
    Stage(cmd::stage::StageCreateArgs),

    #[command(next_help_heading = "Boards", about = "Create and clone tasks")]
    Task {
        #[command(subcommand)]
        command: cmd::task::TaskCommand,
    },

    #[command(next_help_heading = "Boards", about = "Create and attach labels")]
    Label {
        #[command(subcommand)]
        command: cmd::label::LabelCommand,
    },

    #[command(
        next_help_heading = "Ordering",
        about = "List a partition in rank order",
        after_help = "EXAMPLES:\n    lanes list board:1\n    lanes list stage:2 --archived"
    )]
    List(cmd::lane::ListArgs),

    #[command(
        next_help_heading = "Ordering",
        about = "Move an item to a rank of a partition",
        after_help = "EXAMPLES:\n    # Put task 7 first in stage 2\n    lanes move task:7 stage:2 --index 1\n\n    # Reorder stages of board 1\n    lanes move stage:3 board:1 --index 2"
    )]
    Move(cmd::lane::MoveArgs),

    #[command(
        next_help_heading = "Ordering",
        about = "Apply a full order to a partition",
        after_help = "EXAMPLES:\n    lanes order stage:2 task:9 task:4"
    )]
    Order(cmd::lane::OrderArgs),

    #[command(next_help_heading = "Ordering", about = "Archive an item")]
    Archive(cmd::lane::KeyArgs),

    #[command(next_help_heading = "Ordering", about = "Restore an archived item at the end")]
    Restore(cmd::lane::KeyArgs),

    #[command(next_help_heading = "Ordering", about = "Delete an item and everything below it")]
    Delete(cmd::lane::KeyArgs),

    #[command(next_help_heading = "Ordering", about = "Renumber a partition to 1..N")]
    Reindex(cmd::lane::ReindexArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LANES_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "lanes=debug,lanes_core=debug,info"
        } else {
            "lanes=info,lanes_core=info,warn"
        })
    });

    let format = env::var("LANES_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(
    cli: &Cli,
    output: OutputMode,
    project_root: &Path,
    config: anyhow::Result<EffectiveConfig>,
) -> anyhow::Result<()> {
    let open = || Project::open(project_root, config?);
    let user = cli.user;

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, project_root),
        Commands::Board { command } => cmd::board::run_board(command, user, output, &open()?),
        Commands::Stage(args) => cmd::stage::run_stage_create(args, user, output, &open()?),
        Commands::Task { command } => cmd::task::run_task(command, user, output, &open()?),
        Commands::Label { command } => cmd::label::run_label(command, user, output, &open()?),
        Commands::List(args) => cmd::lane::run_list(args, user, output, &open()?),
        Commands::Move(args) => cmd::lane::run_move(args, user, output, &open()?),
        Commands::Order(args) => cmd::lane::run_order(args, user, output, &open()?),
        Commands::Archive(args) => cmd::lane::run_archive(args, user, output, &open()?),
        Commands::Restore(args) => cmd::lane::run_restore(args, user, output, &open()?),
        Commands::Delete(args) => cmd::lane::run_delete(args, user, output, &open()?),
        Commands::Reindex(args) => cmd::lane::run_reindex(args, user, output, &open()?),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;

    let config = resolve_config(&project_root, cli.json);
    let resolved = config.as_ref().ok().map(|config| config.resolved_output.as_str());
    let output = resolve_output_mode(cli.format, cli.json, resolved);
    debug!(?output, command = ?cli.command, "dispatching");

    match run(&cli, output, &project_root, config) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            Ok(ExitCode::FAILURE)
        }
    }
}
