//! Identity-key filters applied to snapshots before diffing.

use std::collections::HashSet;

use crate::model::{group_key, user_key, SourceGroup, SourceUser, TargetGroup, TargetUser};

/// Ignore and include lists, normalized to correlation keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFilter {
    ignore_users: HashSet<String>,
    ignore_groups: HashSet<String>,
    include_groups: HashSet<String>,
}

impl IdentityFilter {
    pub fn new<I, S>(ignore_users: I, ignore_groups: I, include_groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignore_users: ignore_users
                .into_iter()
                .map(|u| user_key(u.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
            ignore_groups: ignore_groups
                .into_iter()
                .map(|g| group_key(g.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
            include_groups: include_groups
                .into_iter()
                .map(|g| group_key(g.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Whether a user with this key must never be touched.
    #[must_use]
    pub fn is_user_ignored(&self, key: &str) -> bool {
        self.ignore_users.contains(&user_key(key))
    }

    /// Whether a group with this key must never be touched.
    #[must_use]
    pub fn is_group_ignored(&self, key: &str) -> bool {
        self.ignore_groups.contains(&group_key(key))
    }

    /// Whether a source group passes the include list (empty list includes all).
    #[must_use]
    pub fn is_group_included(&self, key: &str) -> bool {
        self.include_groups.is_empty() || self.include_groups.contains(&group_key(key))
    }

    pub fn source_users(&self, users: Vec<SourceUser>) -> Vec<SourceUser> {
        users
            .into_iter()
            .filter(|u| !self.is_user_ignored(&u.key()))
            .collect()
    }

    pub fn target_users(&self, users: Vec<TargetUser>) -> Vec<TargetUser> {
        users
            .into_iter()
            .filter(|u| !self.is_user_ignored(&u.key()))
            .collect()
    }

    /// Drop ignored groups and groups outside the include list.
    pub fn source_groups(&self, groups: Vec<SourceGroup>) -> Vec<SourceGroup> {
        groups
            .into_iter()
            .filter(|g| !self.is_group_ignored(&g.key()) && self.is_group_included(&g.key()))
            .collect()
    }

    pub fn target_groups(&self, groups: Vec<TargetGroup>) -> Vec<TargetGroup> {
        groups
            .into_iter()
            .filter(|g| !self.is_group_ignored(&g.key()))
            .collect()
    }
}
