//! Sync run configuration.

use std::fmt;
use std::str::FromStr;

use idsync_core::{group_key, IdentityFilter, SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// How the source snapshot is assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Users and groups are listed independently.
    #[default]
    UsersGroups,
    /// Users are derived from the members of the selected groups.
    Groups,
}

impl SyncMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UsersGroups => "users_groups",
            Self::Groups => "groups",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "users_groups" => Ok(Self::UsersGroups),
            "groups" => Ok(Self::Groups),
            other => Err(format!(
                "unknown sync method '{other}' (expected users_groups or groups)"
            )),
        }
    }
}

/// What happens when a single mutation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run at the first failed mutation.
    #[default]
    Abort,
    /// Record the failure in the report and carry on.
    Continue,
}

/// Settings for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub method: SyncMethod,
    pub failure_policy: FailurePolicy,
    /// Simulate mutations instead of applying them.
    pub dry_run: bool,
    /// Source query narrowing the user listing.
    pub user_match: Option<String>,
    /// Source query narrowing the group listing.
    pub group_match: Option<String>,
    /// User keys (emails) never touched on either side.
    pub ignore_users: Vec<String>,
    /// Group names never touched on either side.
    pub ignore_groups: Vec<String>,
    /// When non-empty, only these source groups are synced.
    pub include_groups: Vec<String>,
}

impl SyncConfig {
    /// Reject contradictory settings before any request is made.
    pub fn validate(&self) -> SyncResult<()> {
        let ignored: Vec<String> = self.ignore_groups.iter().map(|g| group_key(g)).collect();
        if let Some(both) = self
            .include_groups
            .iter()
            .map(|g| group_key(g))
            .find(|g| ignored.contains(g))
        {
            return Err(SyncError::Config(format!(
                "group '{both}' is both included and ignored"
            )));
        }
        for (name, value) in [("user_match", &self.user_match), ("group_match", &self.group_match)]
        {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(SyncError::Config(format!("{name} must not be blank")));
            }
        }
        Ok(())
    }

    /// Identity-key filter built from the ignore and include lists.
    #[must_use]
    pub fn filter(&self) -> IdentityFilter {
        IdentityFilter::new(
            self.ignore_users.iter(),
            self.ignore_groups.iter(),
            self.include_groups.iter(),
        )
    }
}
