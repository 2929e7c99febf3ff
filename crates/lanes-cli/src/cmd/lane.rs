//! Ordering commands addressed by item key (`stage:3`, `task:7`) and
//! partition (`board:1`, `stage:3`, `subtasks:7`).

use crate::output::{OutputMode, render};
use crate::project::Project;
use anyhow::Result;
use clap::Args;
use lanes_core::model::{ItemKey, OrderedItem, Partition, UserId};
use serde_json::json;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct ListArgs {
    pub partition: Partition,
    /// Include archived items (listed first, at position 0).
    #[arg(long)]
    pub archived: bool,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    pub key: ItemKey,
    /// Destination partition.
    pub to: Partition,
    /// 1-based rank; past the end appends.
    #[arg(long, default_value_t = usize::MAX)]
    pub index: usize,
}

#[derive(Args, Debug)]
pub struct OrderArgs {
    pub partition: Partition,
    /// Desired order; unlisted items keep their relative order after these.
    #[arg(required = true)]
    pub keys: Vec<ItemKey>,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    pub key: ItemKey,
}

#[derive(Args, Debug)]
pub struct ReindexArgs {
    pub partition: Partition,
}

fn write_items(items: &[OrderedItem], w: &mut dyn Write) -> io::Result<()> {
    for (rank, item) in items.iter().enumerate() {
        let archived = if item.archived_at_us.is_some() { "\tarchived" } else { "" };
        writeln!(w, "{}\t{}\t{}{archived}", rank + 1, item.key, item.position)?;
    }
    Ok(())
}

pub fn run_list(
    args: &ListArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let items = project
        .engine()
        .reorder()
        .list(actor, args.partition, args.archived)?;
    render(output, &items, |items, w| write_items(items, w))
}

pub fn run_move(
    args: &MoveArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let outcome = project
        .engine()
        .reorder()
        .move_item(actor, args.key, args.to, args.index)?;
    render(output, &outcome, |o, w| {
        writeln!(
            w,
            "moved {} from {} to {} at {}{}",
            o.item.key,
            o.from,
            o.item.partition,
            o.item.position,
            if o.renumbered { " (renumbered)" } else { "" }
        )
    })
}

pub fn run_order(
    args: &OrderArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let items = project
        .engine()
        .reorder()
        .apply_full_order(actor, args.partition, &args.keys)?;
    render(output, &items, |items, w| write_items(items, w))
}

pub fn run_archive(
    args: &KeyArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let item = project.engine().reorder().archive_item(actor, args.key)?;
    render(output, &item, |i, w| writeln!(w, "archived {}", i.key))
}

pub fn run_restore(
    args: &KeyArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let item = project.engine().reorder().restore_item(actor, args.key)?;
    render(output, &item, |i, w| {
        writeln!(w, "restored {} at {}", i.key, i.position)
    })
}

pub fn run_delete(
    args: &KeyArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    project.engine().reorder().delete_item(actor, args.key)?;
    let value = json!({ "ok": true, "deleted": args.key });
    render(output, &value, |_, w| writeln!(w, "deleted {}", args.key))
}

pub fn run_reindex(
    args: &ReindexArgs,
    user: Option<UserId>,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let actor = project.actor(user)?;
    let _lock = project.write_lock()?;
    let changed = project.engine().reorder().reindex(actor, args.partition)?;
    let value = json!({ "partition": args.partition, "changed": changed });
    render(output, &value, |_, w| {
        writeln!(w, "reindexed {}: {changed} positions changed", args.partition)
    })
}
