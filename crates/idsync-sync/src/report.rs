//! Run report.
//!
//! Counters per stage plus the failures that were skipped under
//! [`FailurePolicy::Continue`](crate::config::FailurePolicy::Continue).

use std::fmt;

use chrono::{DateTime, Utc};
use idsync_core::SyncError;
use serde::{Deserialize, Serialize};

use crate::config::SyncMethod;

/// Orchestrator stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Snapshot,
    DeleteUsers,
    UpdateUsers,
    CreateUsers,
    CreateGroups,
    ReconcileMembership,
    DeleteGroups,
}

impl SyncStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::DeleteUsers => "delete_users",
            Self::UpdateUsers => "update_users",
            Self::CreateUsers => "create_users",
            Self::CreateGroups => "create_groups",
            Self::ReconcileMembership => "reconcile_membership",
            Self::DeleteGroups => "delete_groups",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub stage: SyncStage,
    /// Correlation key of the entity (email, group name or `group/user` edge).
    pub entity: String,
    pub error: String,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub method: SyncMethod,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub users_deleted: u32,
    pub users_updated: u32,
    pub users_created: u32,
    pub groups_created: u32,
    pub groups_renamed: u32,
    pub groups_deleted: u32,
    pub members_added: u32,
    pub members_removed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// Start a report stamped with the current time.
    #[must_use]
    pub fn start(method: SyncMethod, dry_run: bool) -> Self {
        Self {
            method,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            users_deleted: 0,
            users_updated: 0,
            users_created: 0,
            groups_created: 0,
            groups_renamed: 0,
            groups_deleted: 0,
            members_added: 0,
            members_removed: 0,
            failures: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self, stage: SyncStage, entity: impl Into<String>, error: &SyncError) {
        self.failures.push(SyncFailure {
            stage,
            entity: entity.into(),
            error: error.to_string(),
        });
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Total number of applied (or, in a dry run, simulated) mutations.
    #[must_use]
    pub fn total_changes(&self) -> u32 {
        self.users_deleted
            + self.users_updated
            + self.users_created
            + self.groups_created
            + self.groups_renamed
            + self.groups_deleted
            + self.members_added
            + self.members_removed
    }

    /// Wall-clock duration once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_empty() {
        let report = SyncReport::start(SyncMethod::UsersGroups, false);
        assert_eq!(report.total_changes(), 0);
        assert!(!report.has_failures());
        assert!(report.duration_ms().is_none());
    }

    #[test]
    fn test_record_failure() {
        let mut report = SyncReport::start(SyncMethod::Groups, true);
        report.record_failure(
            SyncStage::CreateUsers,
            "bob@x.com",
            &SyncError::protocol("create_user", "invalid userName"),
        );
        assert!(report.has_failures());
        assert_eq!(report.failures[0].stage, SyncStage::CreateUsers);
        assert_eq!(report.failures[0].error, "create_user failed: invalid userName");
    }

    #[test]
    fn test_serializes_stage_names() {
        let mut report = SyncReport::start(SyncMethod::UsersGroups, false);
        report.users_created = 2;
        report.record_failure(
            SyncStage::DeleteGroups,
            "Eng",
            &SyncError::Config("x".into()),
        );
        report.finish();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["method"], "users_groups");
        assert_eq!(json["users_created"], 2);
        assert_eq!(json["failures"][0]["stage"], "delete_groups");
        assert!(report.duration_ms().unwrap() >= 0);
    }
}
