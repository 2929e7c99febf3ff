use crate::model::{BoardId, UserId};
use crate::position::PositionPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-project state directory.
pub const LANES_DIR: &str = ".lanes";
/// SQLite database inside [`LANES_DIR`].
pub const DB_FILE: &str = "lanes.sqlite3";
/// Advisory lock file inside [`LANES_DIR`].
pub const LOCK_FILE: &str = "lanes.lock";
/// Project config inside [`LANES_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub positions: PositionPolicy,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub cli: CliConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_timeout_ms(),
            lock_timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Static access grants. An empty section means every user may touch
/// every board.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessConfig {
    /// Users allowed everywhere.
    #[serde(default)]
    pub admins: Vec<UserId>,
    /// Users allowed on every board.
    #[serde(default)]
    pub members: Vec<UserId>,
    /// Users allowed on one board each.
    #[serde(default)]
    pub grants: Vec<BoardGrant>,
}

impl AccessConfig {
    /// True when no rule is configured.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.admins.is_empty() && self.members.is_empty() && self.grants.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardGrant {
    pub board: BoardId,
    pub users: Vec<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Acting user when `--user` is not passed.
    #[serde(default)]
    pub user: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub user: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

impl EffectiveConfig {
    /// Acting user from project config, then user config.
    #[must_use]
    pub fn default_user(&self) -> Option<UserId> {
        self.project.cli.user.or(self.user.user)
    }
}

/// Directory holding the database, lock and config of a project.
#[must_use]
pub fn lanes_dir(project_root: &Path) -> PathBuf {
    project_root.join(LANES_DIR)
}

/// Load `.lanes/config.toml`, falling back to defaults when it is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed, or
/// carries an invalid position policy.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = lanes_dir(project_root).join(CONFIG_FILE);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .positions
        .validated()
        .with_context(|| format!("Invalid [positions] in {}", path.display()))?;
    Ok(config)
}

/// Load the per-user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("lanes/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, body: &str) {
        let dir = lanes_dir(root);
        std::fs::create_dir_all(&dir).expect("create .lanes");
        std::fs::write(dir.join(CONFIG_FILE), body).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.positions.min_gap, 1);
        assert_eq!(cfg.store.busy_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.store.lock_timeout_ms, 5_000);
        assert!(cfg.access.is_open());
        assert!(cfg.cli.user.is_none());
    }

    #[test]
    fn project_config_reads_every_section() {
        let root = tempfile::tempdir().expect("tempdir");
        write_config(
            root.path(),
            r"
[positions]
min_gap = 64

[store]
busy_timeout_ms = 250

[access]
admins = [1]
members = [2]

[[access.grants]]
board = 7
users = [3, 4]

[cli]
user = 2
",
        );

        let cfg = load_project_config(root.path()).expect("load");
        assert_eq!(cfg.positions.min_gap, 64);
        assert_eq!(cfg.store.busy_timeout_ms, 250);
        assert_eq!(cfg.store.lock_timeout_ms, 5_000);
        assert_eq!(cfg.access.admins, vec![UserId::new(1)]);
        assert_eq!(cfg.access.grants[0].board, BoardId::new(7));
        assert_eq!(cfg.cli.user, Some(UserId::new(2)));
        assert!(!cfg.access.is_open());
    }

    #[test]
    fn invalid_min_gap_is_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        write_config(root.path(), "[positions]\nmin_gap = 0\n");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("min_gap"));
    }

    #[test]
    fn malformed_config_reports_path() {
        let root = tempfile::tempdir().expect("tempdir");
        write_config(root.path(), "[positions\n");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        let output = resolve_output(true, Some("pretty".to_string()), Some("text".to_string()));
        assert_eq!(output, "json");
    }

    #[test]
    fn legacy_aliases_are_normalized() {
        let pretty = resolve_output(false, Some("table".to_string()), Some("human".to_string()));
        assert_eq!(pretty, "pretty");

        let text = resolve_output(false, Some("human".to_string()), Some("table".to_string()));
        assert_eq!(text, "text");
    }

    #[test]
    fn project_user_wins_over_user_config() {
        let effective = EffectiveConfig {
            project: ProjectConfig {
                cli: CliConfig {
                    user: Some(UserId::new(9)),
                },
                ..ProjectConfig::default()
            },
            user: UserConfig {
                output: None,
                user: Some(UserId::new(3)),
            },
            resolved_output: "text".to_string(),
        };
        assert_eq!(effective.default_user(), Some(UserId::new(9)));
    }
}
