//! Dry-run overlay for the target directory.
//!
//! [`DryRunTarget`] wraps the real SCIM target and identity store. Reads go
//! to the wrapped clients; mutations are only logged and recorded in a
//! run-scoped overlay so that later stages of the same run observe them
//! (created entities get deterministic placeholder ids, deleted ones
//! disappear from lookups).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use idsync_core::{
    group_key, user_key, DirectoryTarget, GroupMembership, IdentityStore, MembershipExistence,
    MembershipOp, Page, SyncError, SyncResult, TargetGroup, TargetUser,
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Deterministic placeholder id for an entity synthesized by a dry run.
#[must_use]
pub fn placeholder_id(kind: &str, key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("idsync:{kind}:{key}").as_bytes()).to_string()
}

type Edge = (String, String);

#[derive(Debug, Default)]
struct Overlay {
    /// `Some` = created or updated in this run, `None` = deleted.
    users: HashMap<String, Option<TargetUser>>,
    created_users: Vec<String>,
    groups: HashMap<String, Option<TargetGroup>>,
    created_groups: Vec<String>,
    deleted_group_ids: HashSet<String>,
    synthesized_group_ids: HashSet<String>,
    /// `(group_id, user_id)` edges.
    added_edges: BTreeSet<Edge>,
    removed_edges: HashSet<Edge>,
    /// Membership ids resolved through the wrapped store.
    membership_edges: HashMap<String, Edge>,
}

impl Overlay {
    fn add_edge(&mut self, edge: Edge) {
        self.removed_edges.remove(&edge);
        self.added_edges.insert(edge);
    }

    fn remove_edge(&mut self, edge: Edge) {
        self.added_edges.remove(&edge);
        self.removed_edges.insert(edge);
    }

    fn overlay_user(&self, user: TargetUser) -> Option<TargetUser> {
        match self.users.get(&user.key()) {
            Some(Some(current)) => Some(current.clone()),
            Some(None) => None,
            None => Some(user),
        }
    }

    fn overlay_group(&self, group: TargetGroup) -> Option<TargetGroup> {
        if group
            .id
            .as_ref()
            .is_some_and(|id| self.deleted_group_ids.contains(id))
        {
            return None;
        }
        match self.groups.get(&group.key()) {
            Some(Some(current)) => Some(current.clone()),
            Some(None) => None,
            None => Some(group),
        }
    }

    fn added_memberships(&self, group_id: &str) -> Vec<GroupMembership> {
        self.added_edges
            .iter()
            .filter(|(g, _)| g == group_id)
            .map(|(g, u)| GroupMembership {
                membership_id: placeholder_id("membership", &format!("{g}/{u}")),
                group_id: g.clone(),
                user_id: u.clone(),
            })
            .collect()
    }
}

/// Target decorator that simulates every mutation.
pub struct DryRunTarget {
    target: Arc<dyn DirectoryTarget>,
    store: Arc<dyn IdentityStore>,
    overlay: RwLock<Overlay>,
}

impl DryRunTarget {
    pub fn new(target: Arc<dyn DirectoryTarget>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            target,
            store,
            overlay: RwLock::new(Overlay::default()),
        }
    }

    async fn record_user(&self, key: String, user: Option<TargetUser>) {
        self.overlay.write().await.users.insert(key, user);
    }

    async fn record_group(&self, key: String, group: Option<TargetGroup>) {
        self.overlay.write().await.groups.insert(key, group);
    }
}

#[async_trait]
impl DirectoryTarget for DryRunTarget {
    async fn find_user_by_email(&self, email: &str) -> SyncResult<TargetUser> {
        let key = user_key(email);
        match self.overlay.read().await.users.get(&key) {
            Some(Some(user)) => return Ok(user.clone()),
            Some(None) => return Err(SyncError::NotFound { entity: "user", key }),
            None => {}
        }
        self.target.find_user_by_email(email).await
    }

    async fn find_group_by_display_name(&self, display_name: &str) -> SyncResult<TargetGroup> {
        let key = group_key(display_name);
        match self.overlay.read().await.groups.get(&key) {
            Some(Some(group)) => return Ok(group.clone()),
            Some(None) => return Err(SyncError::NotFound { entity: "group", key }),
            None => {}
        }
        let found = self.target.find_group_by_display_name(display_name).await?;
        let overlay = self.overlay.read().await;
        overlay
            .overlay_group(found)
            .ok_or(SyncError::NotFound { entity: "group", key })
    }

    async fn create_user(&self, user: &TargetUser) -> SyncResult<TargetUser> {
        let key = user.key();
        let created = user.clone().with_id(placeholder_id("user", &key));
        info!(user = %key, id = ?created.id, active = created.active, "dry run: would create user");

        let mut overlay = self.overlay.write().await;
        if !overlay.created_users.contains(&key) {
            overlay.created_users.push(key.clone());
        }
        overlay.users.insert(key, Some(created.clone()));
        Ok(created)
    }

    async fn update_user(&self, user: &TargetUser) -> SyncResult<TargetUser> {
        let key = user.key();
        info!(user = %key, id = ?user.id, active = user.active, "dry run: would update user");
        self.record_user(key, Some(user.clone())).await;
        Ok(user.clone())
    }

    async fn delete_user(&self, user: &TargetUser) -> SyncResult<()> {
        let key = user.key();
        info!(user = %key, id = ?user.id, "dry run: would delete user");
        self.record_user(key, None).await;
        Ok(())
    }

    async fn create_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup> {
        let key = group.key();
        let id = placeholder_id("group", &key);
        let created = group.clone().with_id(id.clone());
        info!(group = %key, id = %id, "dry run: would create group");

        let mut overlay = self.overlay.write().await;
        if !overlay.created_groups.contains(&key) {
            overlay.created_groups.push(key.clone());
        }
        overlay.synthesized_group_ids.insert(id);
        overlay.groups.insert(key, Some(created.clone()));
        Ok(created)
    }

    async fn update_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup> {
        let key = group.key();
        info!(group = %key, id = ?group.id, "dry run: would update group");
        self.record_group(key, Some(group.clone())).await;
        Ok(group.clone())
    }

    async fn delete_group(&self, group: &TargetGroup) -> SyncResult<()> {
        let key = group.key();
        info!(group = %key, id = ?group.id, "dry run: would delete group");
        let mut overlay = self.overlay.write().await;
        if let Some(id) = &group.id {
            overlay.deleted_group_ids.insert(id.clone());
        }
        overlay.groups.insert(key, None);
        Ok(())
    }

    async fn patch_group_membership(
        &self,
        group_id: &str,
        op: MembershipOp,
        member_ids: &[String],
    ) -> SyncResult<()> {
        if member_ids.is_empty() {
            return Ok(());
        }
        info!(group_id = %group_id, op = %op, count = member_ids.len(), "dry run: would patch group membership");

        let mut overlay = self.overlay.write().await;
        for user_id in member_ids {
            let edge = (group_id.to_string(), user_id.clone());
            match op {
                MembershipOp::Add => overlay.add_edge(edge),
                MembershipOp::Remove => overlay.remove_edge(edge),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for DryRunTarget {
    async fn list_users(&self, next_token: Option<String>) -> SyncResult<Page<TargetUser>> {
        let page = self.store.list_users(next_token).await?;
        let overlay = self.overlay.read().await;

        let mut items: Vec<TargetUser> = page
            .items
            .into_iter()
            .filter_map(|u| overlay.overlay_user(u))
            .collect();
        if page.next_token.is_none() {
            let listed: HashSet<String> = items.iter().map(TargetUser::key).collect();
            items.extend(
                overlay
                    .created_users
                    .iter()
                    .filter(|key| !listed.contains(*key))
                    .filter_map(|key| overlay.users.get(key).cloned().flatten()),
            );
        }
        Ok(Page {
            items,
            next_token: page.next_token,
        })
    }

    async fn list_groups(&self, next_token: Option<String>) -> SyncResult<Page<TargetGroup>> {
        let page = self.store.list_groups(next_token).await?;
        let overlay = self.overlay.read().await;

        let mut items: Vec<TargetGroup> = page
            .items
            .into_iter()
            .filter_map(|g| overlay.overlay_group(g))
            .collect();
        if page.next_token.is_none() {
            let listed: HashSet<String> = items.iter().map(TargetGroup::key).collect();
            items.extend(
                overlay
                    .created_groups
                    .iter()
                    .filter(|key| !listed.contains(*key))
                    .filter_map(|key| overlay.groups.get(key).cloned().flatten()),
            );
        }
        Ok(Page {
            items,
            next_token: page.next_token,
        })
    }

    async fn list_group_memberships(
        &self,
        group_id: &str,
        next_token: Option<String>,
    ) -> SyncResult<Page<GroupMembership>> {
        {
            let overlay = self.overlay.read().await;
            if overlay.synthesized_group_ids.contains(group_id) {
                return Ok(Page::last(overlay.added_memberships(group_id)));
            }
        }

        let page = self.store.list_group_memberships(group_id, next_token).await?;
        let overlay = self.overlay.read().await;

        let mut items: Vec<GroupMembership> = page
            .items
            .into_iter()
            .filter(|m| {
                !overlay
                    .removed_edges
                    .contains(&(m.group_id.clone(), m.user_id.clone()))
            })
            .collect();
        if page.next_token.is_none() {
            let listed: HashSet<String> = items.iter().map(|m| m.user_id.clone()).collect();
            items.extend(
                overlay
                    .added_memberships(group_id)
                    .into_iter()
                    .filter(|m| !listed.contains(&m.user_id)),
            );
        }
        Ok(Page {
            items,
            next_token: page.next_token,
        })
    }

    async fn get_group_membership_id(&self, group_id: &str, user_id: &str) -> SyncResult<String> {
        let edge = (group_id.to_string(), user_id.to_string());
        let not_found = || SyncError::NotFound {
            entity: "group membership",
            key: format!("{group_id}/{user_id}"),
        };
        {
            let overlay = self.overlay.read().await;
            if overlay.removed_edges.contains(&edge) {
                return Err(not_found());
            }
            if overlay.added_edges.contains(&edge) {
                return Ok(placeholder_id("membership", &format!("{group_id}/{user_id}")));
            }
            if overlay.synthesized_group_ids.contains(group_id) {
                return Err(not_found());
            }
        }

        let membership_id = self.store.get_group_membership_id(group_id, user_id).await?;
        self.overlay
            .write()
            .await
            .membership_edges
            .insert(membership_id.clone(), edge);
        Ok(membership_id)
    }

    async fn delete_group_membership(&self, membership_id: &str) -> SyncResult<()> {
        info!(membership_id = %membership_id, "dry run: would delete group membership");
        let mut overlay = self.overlay.write().await;
        let edge = overlay
            .membership_edges
            .get(membership_id)
            .cloned()
            .or_else(|| {
                overlay
                    .added_edges
                    .iter()
                    .find(|(g, u)| {
                        placeholder_id("membership", &format!("{g}/{u}")) == membership_id
                    })
                    .cloned()
            });
        if let Some(edge) = edge {
            overlay.remove_edge(edge);
        }
        Ok(())
    }

    async fn is_member_in_groups(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> SyncResult<Vec<MembershipExistence>> {
        let real: Vec<String> = {
            let overlay = self.overlay.read().await;
            group_ids
                .iter()
                .filter(|g| !overlay.synthesized_group_ids.contains(*g))
                .cloned()
                .collect()
        };
        let known: HashMap<String, bool> = if real.is_empty() {
            HashMap::new()
        } else {
            self.store
                .is_member_in_groups(user_id, &real)
                .await?
                .into_iter()
                .map(|m| (m.group_id, m.is_member))
                .collect()
        };

        let overlay = self.overlay.read().await;
        Ok(group_ids
            .iter()
            .map(|group_id| {
                let edge = (group_id.clone(), user_id.to_string());
                let is_member = if overlay.added_edges.contains(&edge) {
                    true
                } else if overlay.removed_edges.contains(&edge) {
                    false
                } else {
                    known.get(group_id).copied().unwrap_or(false)
                };
                MembershipExistence {
                    group_id: group_id.clone(),
                    user_id: user_id.to_string(),
                    is_member,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_id_is_deterministic() {
        let a = placeholder_id("user", "bob@x.com");
        assert_eq!(a, placeholder_id("user", "bob@x.com"));
        assert_ne!(a, placeholder_id("group", "bob@x.com"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_overlay_edge_toggle() {
        let mut overlay = Overlay::default();
        let edge = ("g1".to_string(), "u1".to_string());
        overlay.add_edge(edge.clone());
        assert_eq!(overlay.added_memberships("g1").len(), 1);
        overlay.remove_edge(edge.clone());
        assert!(overlay.added_memberships("g1").is_empty());
        assert!(overlay.removed_edges.contains(&edge));
    }
}
