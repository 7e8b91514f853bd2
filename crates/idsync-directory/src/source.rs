//! [`DirectorySource`] implementation for [`DirectoryClient`].

use async_trait::async_trait;
use idsync_core::{DirectorySource, SourceGroup, SourceMember, SourceUser, SyncResult};

use crate::client::DirectoryClient;

#[async_trait]
impl DirectorySource for DirectoryClient {
    async fn list_users(&self, filter: Option<&str>) -> SyncResult<Vec<SourceUser>> {
        self.fetch_all_users(filter).await
    }

    async fn list_deleted_users(&self) -> SyncResult<Vec<SourceUser>> {
        self.fetch_deleted_users().await
    }

    async fn list_groups(&self, filter: Option<&str>) -> SyncResult<Vec<SourceGroup>> {
        self.fetch_all_groups(filter).await
    }

    async fn list_group_members(&self, group: &SourceGroup) -> SyncResult<Vec<SourceMember>> {
        self.fetch_expanded_members(group).await
    }
}
