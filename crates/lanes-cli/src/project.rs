//! Opening an initialized project: store, engine, acting user and the
//! advisory write lock.

use anyhow::{Context as _, Result, bail};
use lanes_core::Engine;
use lanes_core::access::policy_from_config;
use lanes_core::config::{DB_FILE, EffectiveConfig, LOCK_FILE, lanes_dir};
use lanes_core::events::{TracingQueue, TracingSink};
use lanes_core::lock::StoreLock;
use lanes_core::model::UserId;
use lanes_core::store::SqliteStore;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the acting user when `--user` is absent.
pub const USER_ENV: &str = "LANES_USER";

pub struct Project {
    root: PathBuf,
    config: EffectiveConfig,
    engine: Engine<SqliteStore>,
}

impl Project {
    /// Open the project rooted at `root`.
    ///
    /// # Errors
    ///
    /// Fails when `.lanes/` is missing or the database cannot be opened.
    pub fn open(root: &Path, config: EffectiveConfig) -> Result<Self> {
        let dir = lanes_dir(root);
        if !dir.is_dir() {
            bail!(
                "no lanes project at {}. Run `lanes init` first.",
                root.display()
            );
        }

        let db_path = dir.join(DB_FILE);
        let store = SqliteStore::open(&db_path, config.project.store.busy_timeout())
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        let engine = Engine::builder(store)
            .policy(config.project.positions)
            .boxed_access(policy_from_config(&config.project.access))
            .subscribe(TracingSink)
            .queue(TracingQueue)
            .build()?;
        debug!(db = %db_path.display(), "project opened");

        Ok(Self {
            root: root.to_path_buf(),
            config,
            engine,
        })
    }

    pub const fn engine(&self) -> &Engine<SqliteStore> {
        &self.engine
    }

    /// Take the project-wide write lock for the duration of a mutating
    /// command.
    ///
    /// # Errors
    ///
    /// Returns the core `LockTimeout` error when another process holds it.
    pub fn write_lock(&self) -> Result<StoreLock> {
        let path = lanes_dir(&self.root).join(LOCK_FILE);
        Ok(StoreLock::acquire(
            &path,
            self.config.project.store.lock_timeout(),
        )?)
    }

    /// Acting user: `--user`, then `LANES_USER`, then config.
    ///
    /// # Errors
    ///
    /// Fails when no source names a user or the value is not an id.
    pub fn actor(&self, flag: Option<UserId>) -> Result<UserId> {
        let from_env = env::var(USER_ENV).ok();
        resolve_actor(flag, from_env.as_deref(), self.config.default_user())
    }
}

fn resolve_actor(
    flag: Option<UserId>,
    from_env: Option<&str>,
    configured: Option<UserId>,
) -> Result<UserId> {
    if let Some(user) = flag {
        return Ok(user);
    }
    if let Some(raw) = from_env.map(str::trim).filter(|raw| !raw.is_empty()) {
        return raw
            .parse()
            .with_context(|| format!("{USER_ENV}='{raw}' is not a user id"));
    }
    configured.with_context(|| {
        format!("no acting user: pass --user, set {USER_ENV}, or set [cli] user in config")
    })
}

#[cfg(test)]
mod tests {
    use super::resolve_actor;
    use lanes_core::model::UserId;

    #[test]
    fn flag_beats_env_and_config() {
        let user = resolve_actor(Some(UserId::new(3)), Some("4"), Some(UserId::new(5))).unwrap();
        assert_eq!(user, UserId::new(3));
    }

    #[test]
    fn env_beats_config() {
        let user = resolve_actor(None, Some(" 4 "), Some(UserId::new(5))).unwrap();
        assert_eq!(user, UserId::new(4));
    }

    #[test]
    fn config_is_the_fallback() {
        let user = resolve_actor(None, Some(""), Some(UserId::new(5))).unwrap();
        assert_eq!(user, UserId::new(5));
    }

    #[test]
    fn missing_or_bad_user_fails() {
        assert!(resolve_actor(None, None, None).is_err());
        assert!(resolve_actor(None, Some("alice"), None).is_err());
    }
}
