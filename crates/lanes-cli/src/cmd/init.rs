use crate::output::{OutputMode, pretty_kv, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use lanes_core::config::{CONFIG_FILE, DB_FILE, lanes_dir};
use lanes_core::store::SqliteStore;
use lanes_core::store::sqlite::DEFAULT_BUSY_TIMEOUT;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-initialize even if `.lanes/` already exists. Existing data is kept.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[positions]\n\
    min_gap = 1\n\
    \n\
    [store]\n\
    busy_timeout_ms = 5000\n\
    lock_timeout_ms = 5000\n\
    \n\
    [access]\n\
    admins = []\n\
    members = []\n\
    \n\
    [cli]\n\
    # user = 1\n";

const GITIGNORE: &str = "lanes.sqlite3\nlanes.sqlite3-*\nlanes.lock\n";

/// Execute `lanes init`. Creates the project skeleton:
///
/// ```text
/// .lanes/
///   lanes.sqlite3   (migrated to the latest schema)
///   config.toml     (default project config template)
///   .gitignore
/// ```
///
/// # Errors
///
/// Returns an error if `.lanes/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let dir = lanes_dir(project_root);
    if dir.exists() && !args.force {
        anyhow::bail!(".lanes/ already exists. Use `lanes init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
    }

    let gitignore_path = dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let db_path = dir.join(DB_FILE);
    SqliteStore::open(&db_path, DEFAULT_BUSY_TIMEOUT)
        .with_context(|| format!("Failed to create {}", db_path.display()))?;
    info!(path = %dir.display(), "project initialized");

    let value = json!({
        "ok": true,
        "path": dir.display().to_string(),
        "database": db_path.display().to_string(),
        "config": config_path.display().to_string(),
    });
    render_mode(
        output,
        &value,
        |_, w| writeln!(w, "initialized {}", dir.display()),
        |_, w| {
            writeln!(w, "✓ Initialized .lanes/ project structure.")?;
            writeln!(w)?;
            pretty_kv(w, "Database", format!(".lanes/{DB_FILE}"))?;
            pretty_kv(w, "Config", format!(".lanes/{CONFIG_FILE}"))?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  export LANES_USER=1")?;
            writeln!(w, "  lanes board create \"My board\"")
        },
    )
}
