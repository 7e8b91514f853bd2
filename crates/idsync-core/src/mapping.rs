//! Attribute mapping contract.

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::model::{SourceUser, TargetUser};

/// Overrides how source attributes populate a target user before it is
/// created or updated.
#[async_trait]
pub trait AttributeMapper: Send + Sync {
    async fn map_attributes(&self, target: TargetUser, source: &SourceUser)
        -> SyncResult<TargetUser>;
}

/// Mapper that returns the target user unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughMapper;

#[async_trait]
impl AttributeMapper for PassthroughMapper {
    async fn map_attributes(
        &self,
        target: TargetUser,
        _source: &SourceUser,
    ) -> SyncResult<TargetUser> {
        Ok(target)
    }
}
