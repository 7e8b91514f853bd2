//! Collaborator traits for the source directory and the target directory.
//!
//! The orchestrator only talks to remote systems through these traits, which
//! keeps it testable against in-memory fakes and lets the dry-run overlay
//! wrap a real client transparently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::model::{SourceGroup, SourceMember, SourceUser, TargetGroup, TargetUser};
use crate::paginate::Page;

/// Read-only access to the source directory.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// List active and suspended users, optionally narrowed by a query.
    async fn list_users(&self, filter: Option<&str>) -> SyncResult<Vec<SourceUser>>;

    /// List users the source reports as hard-deleted.
    async fn list_deleted_users(&self) -> SyncResult<Vec<SourceUser>>;

    /// List groups, optionally narrowed by a query.
    async fn list_groups(&self, filter: Option<&str>) -> SyncResult<Vec<SourceGroup>>;

    /// List the user members of a group, expanding nested groups.
    ///
    /// Implementations must terminate on membership cycles and return each
    /// user at most once.
    async fn list_group_members(&self, group: &SourceGroup) -> SyncResult<Vec<SourceMember>>;
}

/// Direction of a bulk membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipOp {
    Add,
    Remove,
}

impl MembershipOp {
    /// SCIM PATCH operation name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for MembershipOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutating and lookup operations on the target directory (SCIM).
#[async_trait]
pub trait DirectoryTarget: Send + Sync {
    /// Exact-match lookup by user name / email.
    ///
    /// Zero matches yield `NotFound`, more than one yields `Ambiguous`.
    async fn find_user_by_email(&self, email: &str) -> SyncResult<TargetUser>;

    /// Exact-match lookup by display name, with the same match semantics.
    async fn find_group_by_display_name(&self, display_name: &str) -> SyncResult<TargetGroup>;

    async fn create_user(&self, user: &TargetUser) -> SyncResult<TargetUser>;

    /// Replace the user identified by `user.id`.
    async fn update_user(&self, user: &TargetUser) -> SyncResult<TargetUser>;

    async fn delete_user(&self, user: &TargetUser) -> SyncResult<()>;

    async fn create_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup>;

    /// Update the core attributes (display name, external id) of `group.id`.
    async fn update_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup>;

    async fn delete_group(&self, group: &TargetGroup) -> SyncResult<()>;

    /// Add or remove members in one request.
    ///
    /// Callers must not pass more than
    /// [`MAX_MEMBERS_PER_PATCH`](crate::batch::MAX_MEMBERS_PER_PATCH) ids.
    async fn patch_group_membership(
        &self,
        group_id: &str,
        op: MembershipOp,
        member_ids: &[String],
    ) -> SyncResult<()>;
}

/// A membership edge as stored by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub membership_id: String,
    pub group_id: String,
    pub user_id: String,
}

/// Result of a bulk membership existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipExistence {
    pub group_id: String,
    pub user_id: String,
    pub is_member: bool,
}

/// Paginated listing and membership graph access on the target.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn list_users(&self, next_token: Option<String>) -> SyncResult<Page<TargetUser>>;

    async fn list_groups(&self, next_token: Option<String>) -> SyncResult<Page<TargetGroup>>;

    async fn list_group_memberships(
        &self,
        group_id: &str,
        next_token: Option<String>,
    ) -> SyncResult<Page<GroupMembership>>;

    /// Resolve the membership id linking `user_id` to `group_id`.
    async fn get_group_membership_id(&self, group_id: &str, user_id: &str)
        -> SyncResult<String>;

    async fn delete_group_membership(&self, membership_id: &str) -> SyncResult<()>;

    /// Check `user_id` against several groups in one call.
    async fn is_member_in_groups(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> SyncResult<Vec<MembershipExistence>>;
}
