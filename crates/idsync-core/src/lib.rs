//! Core of idsync: canonical directory types, collaborator traits and the
//! reconciliation engine.
//!
//! This crate performs no I/O. Adapters for concrete APIs live in
//! `idsync-scim-client` (target) and `idsync-directory` (source); the
//! orchestrator that applies diffs lives in `idsync-sync`.

pub mod batch;
pub mod error;
pub mod filter;
pub mod mapping;
pub mod model;
pub mod paginate;
pub mod reconcile;
pub mod traits;

pub use batch::{chunk_members, patch_in_batches, MAX_MEMBERS_PER_PATCH};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use filter::IdentityFilter;
pub use mapping::{AttributeMapper, PassthroughMapper};
pub use model::{
    group_key, user_key, Address, Email, MemberKind, SourceGroup, SourceMember, SourceUser,
    TargetGroup, TargetUser,
};
pub use paginate::{collect_all, Page, MAX_PAGES};
pub use reconcile::{
    compute_group_diff, compute_group_membership_diff, compute_membership_additions,
    compute_user_diff, GroupDiff, MembershipDiff, MembershipEdge, UserDiff,
};
pub use traits::{
    DirectorySource, DirectoryTarget, GroupMembership, IdentityStore, MembershipExistence,
    MembershipOp,
};
