//! Identity and authorization seam.
//!
//! Services never look up a "current user"; every operation takes the
//! acting [`UserId`] and asks an [`AccessPolicy`] before touching a board.

use crate::config::AccessConfig;
use crate::error::{Error, Result};
use crate::model::{BoardId, UserId};
use std::collections::{BTreeSet, HashMap};

pub trait AccessPolicy: Send + Sync {
    fn is_admin(&self, user: UserId) -> bool;
    fn has_board_access(&self, user: UserId, board: BoardId) -> bool;
}

/// Fail with [`Error::AccessDenied`] unless `user` may work on `board`.
///
/// # Errors
///
/// Returns [`Error::AccessDenied`] when the policy refuses.
pub fn ensure_board_access(policy: &dyn AccessPolicy, user: UserId, board: BoardId) -> Result<()> {
    if policy.is_admin(user) || policy.has_board_access(user, board) {
        Ok(())
    } else {
        tracing::debug!(%user, %board, "board access denied");
        Err(Error::AccessDenied { user, board })
    }
}

/// Grants everything. Used when no access rules are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn is_admin(&self, _user: UserId) -> bool {
        true
    }

    fn has_board_access(&self, _user: UserId, _board: BoardId) -> bool {
        true
    }
}

/// Fixed grants, usually read from `[access]` in the project config.
#[derive(Debug, Clone, Default)]
pub struct StaticAccess {
    admins: BTreeSet<UserId>,
    members: BTreeSet<UserId>,
    boards: HashMap<BoardId, BTreeSet<UserId>>,
}

impl StaticAccess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &AccessConfig) -> Self {
        let mut access = Self::new();
        access.admins.extend(config.admins.iter().copied());
        access.members.extend(config.members.iter().copied());
        for grant in &config.grants {
            access
                .boards
                .entry(grant.board)
                .or_default()
                .extend(grant.users.iter().copied());
        }
        access
    }

    #[must_use]
    pub fn with_admin(mut self, user: UserId) -> Self {
        self.admins.insert(user);
        self
    }

    #[must_use]
    pub fn with_member(mut self, user: UserId) -> Self {
        self.members.insert(user);
        self
    }

    #[must_use]
    pub fn with_grant(mut self, board: BoardId, user: UserId) -> Self {
        self.boards.entry(board).or_default().insert(user);
        self
    }
}

impl AccessPolicy for StaticAccess {
    fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    fn has_board_access(&self, user: UserId, board: BoardId) -> bool {
        self.members.contains(&user)
            || self
                .boards
                .get(&board)
                .is_some_and(|users| users.contains(&user))
    }
}

/// Policy described by `config`: [`AllowAll`] when no rule is set.
#[must_use]
pub fn policy_from_config(config: &AccessConfig) -> Box<dyn AccessPolicy> {
    if config.is_open() {
        Box::new(AllowAll)
    } else {
        Box::new(StaticAccess::from_config(config))
    }
}
