//! Group and group-member listing, with nested-group expansion.

use std::collections::{HashSet, VecDeque};

use idsync_core::{MemberKind, SourceGroup, SourceMember, SyncResult};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::client::DirectoryClient;

/// Group resource as returned by the directory API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGroup {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<WireGroup> for SourceGroup {
    fn from(group: WireGroup) -> Self {
        Self {
            id: group.id,
            email: group.email,
            name: group.name,
            description: group.description.filter(|d| !d.is_empty()),
        }
    }
}

/// Member entry as returned by the directory API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMember {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "type")]
    pub kind: MemberKind,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<WireMember> for SourceMember {
    fn from(member: WireMember) -> Self {
        Self {
            id: member.id,
            email: member.email,
            kind: member.kind,
            status: member.status,
        }
    }
}

impl DirectoryClient {
    /// Fetch groups matching `query`.
    #[instrument(skip(self))]
    pub async fn fetch_all_groups(&self, query: Option<&str>) -> SyncResult<Vec<SourceGroup>> {
        let page_size = self.config().page_size.to_string();
        let mut params = vec![
            ("customer", self.config().customer_id.as_str()),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("query", query));
        }
        let url = self
            .endpoint("groups", &params)
            .map_err(|e| e.into_sync_error("list_groups"))?;

        let groups: Vec<WireGroup> = self.get_all("list_groups", &url).await?;
        info!(count = groups.len(), "Fetched source groups");
        Ok(groups.into_iter().map(SourceGroup::from).collect())
    }

    /// Fetch the direct members of one group (users and nested groups).
    #[instrument(skip(self))]
    pub async fn fetch_direct_members(&self, group_key: &str) -> SyncResult<Vec<SourceMember>> {
        let page_size = self.config().page_size.to_string();
        let path = format!("groups/{}/members", urlencoding::encode(group_key));
        let url = self
            .endpoint(&path, &[("maxResults", page_size.as_str())])
            .map_err(|e| e.into_sync_error("list_group_members"))?;

        let members: Vec<WireMember> = self.get_all("list_group_members", &url).await?;
        Ok(members.into_iter().map(SourceMember::from).collect())
    }

    /// Fetch the user members of `group`, expanding nested groups.
    ///
    /// Each nested group is visited once, so membership cycles terminate, and
    /// each user appears at most once. Inactive members and non-user members
    /// (customers, service accounts) are dropped.
    #[instrument(skip(self, group), fields(group = %group.name))]
    pub async fn fetch_expanded_members(&self, group: &SourceGroup) -> SyncResult<Vec<SourceMember>> {
        let mut visited: HashSet<String> = HashSet::from([group.id.clone()]);
        let mut queue: VecDeque<String> = VecDeque::from([group.id.clone()]);
        let mut seen_users: HashSet<String> = HashSet::new();
        let mut users = Vec::new();

        while let Some(group_key) = queue.pop_front() {
            for member in self.fetch_direct_members(&group_key).await? {
                match member.kind {
                    MemberKind::Group => {
                        if visited.insert(member.id.clone()) {
                            debug!(nested = %member.email, "Expanding nested group");
                            queue.push_back(member.id);
                        }
                    }
                    _ if member.is_active_user() => {
                        if seen_users.insert(member.key()) {
                            users.push(member);
                        }
                    }
                    _ => {}
                }
            }
        }

        debug!(
            members = users.len(),
            groups_visited = visited.len(),
            "Expanded group membership"
        );
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_member_kinds() {
        let member: WireMember = serde_json::from_str(
            r#"{"id":"1","email":"u@x.com","type":"USER","status":"ACTIVE","role":"MEMBER"}"#,
        )
        .unwrap();
        assert_eq!(member.kind, MemberKind::User);

        let member: WireMember =
            serde_json::from_str(r#"{"id":"2","email":"g@x.com","type":"GROUP"}"#).unwrap();
        assert_eq!(member.kind, MemberKind::Group);

        let member: WireMember =
            serde_json::from_str(r#"{"id":"3","type":"CUSTOMER"}"#).unwrap();
        assert_eq!(member.kind, MemberKind::Customer);
    }

    #[test]
    fn test_wire_group_drops_empty_description() {
        let group: SourceGroup = serde_json::from_str::<WireGroup>(
            r#"{"id":"g1","email":"eng@x.com","name":"Engineering","description":""}"#,
        )
        .unwrap()
        .into();
        assert_eq!(group.key(), "Engineering");
        assert!(group.description.is_none());
    }
}
