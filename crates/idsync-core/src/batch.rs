//! Chunked membership PATCH requests.

use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::traits::{DirectoryTarget, MembershipOp};

/// Hard limit of member ids the target accepts in one membership PATCH.
pub const MAX_MEMBERS_PER_PATCH: usize = 100;

/// Split `members` into ordered chunks of at most [`MAX_MEMBERS_PER_PATCH`].
pub fn chunk_members(members: &[String]) -> impl Iterator<Item = &[String]> {
    members.chunks(MAX_MEMBERS_PER_PATCH)
}

/// Apply one membership operation to `group_id` in chunks, in list order.
///
/// Stops at the first failing chunk and returns its error. Chunks sent before
/// the failure remain applied. Returns the number of members patched.
pub async fn patch_in_batches(
    target: &dyn DirectoryTarget,
    group_id: &str,
    op: MembershipOp,
    members: &[String],
) -> SyncResult<usize> {
    let mut applied = 0;
    for (index, chunk) in chunk_members(members).enumerate() {
        if let Err(e) = target.patch_group_membership(group_id, op, chunk).await {
            warn!(
                group_id = %group_id,
                op = %op,
                chunk = index,
                applied,
                remaining = members.len() - applied,
                error = %e,
                "Membership batch failed, stopping"
            );
            return Err(e);
        }
        applied += chunk.len();
        debug!(group_id = %group_id, op = %op, chunk = index, size = chunk.len(), "Membership batch applied");
    }
    Ok(applied)
}
