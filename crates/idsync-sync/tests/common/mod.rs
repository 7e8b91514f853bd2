//! In-memory source and target used by the orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use idsync_core::{
    user_key, DirectorySource, DirectoryTarget, GroupMembership, IdentityStore, MemberKind,
    MembershipExistence, MembershipOp, Page, SourceGroup, SourceMember, SourceUser, SyncError,
    SyncResult, TargetGroup, TargetUser, MAX_MEMBERS_PER_PATCH,
};

pub fn source_user(email: &str, suspended: bool) -> SourceUser {
    SourceUser {
        id: format!("src-{email}"),
        primary_email: email.to_string(),
        given_name: "Given".into(),
        family_name: "Family".into(),
        display_name: "Given Family".into(),
        suspended,
        emails: vec![],
        addresses: vec![],
    }
}

/// Target user in sync with `source_user(email, !active)`.
pub fn target_user(id: &str, email: &str, active: bool) -> TargetUser {
    TargetUser::from_source(&source_user(email, !active)).with_id(id)
}

pub fn source_group(id: &str, name: &str) -> SourceGroup {
    SourceGroup {
        id: id.to_string(),
        email: format!("{}@x.com", name.to_lowercase()),
        name: name.to_string(),
        description: None,
    }
}

pub fn target_group(id: &str, name: &str) -> TargetGroup {
    TargetGroup {
        id: Some(id.to_string()),
        external_id: None,
        display_name: name.to_string(),
        members: vec![],
    }
}

pub fn user_member(email: &str) -> SourceMember {
    SourceMember {
        id: format!("src-{email}"),
        email: email.to_string(),
        kind: MemberKind::User,
        status: Some("ACTIVE".into()),
    }
}

/// Source directory with already-expanded memberships.
#[derive(Default)]
pub struct InMemorySource {
    pub users: Vec<SourceUser>,
    pub deleted: Vec<SourceUser>,
    pub groups: Vec<SourceGroup>,
    /// Source group id to members.
    pub members: HashMap<String, Vec<SourceMember>>,
    pub user_queries: Mutex<Vec<Option<String>>>,
}

impl InMemorySource {
    pub fn with_users(users: Vec<SourceUser>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn add_group(&mut self, group: SourceGroup, members: &[&str]) {
        self.members.insert(
            group.id.clone(),
            members.iter().map(|m| user_member(m)).collect(),
        );
        self.groups.push(group);
    }
}

#[async_trait]
impl DirectorySource for InMemorySource {
    async fn list_users(&self, filter: Option<&str>) -> SyncResult<Vec<SourceUser>> {
        self.user_queries
            .lock()
            .unwrap()
            .push(filter.map(str::to_string));
        Ok(match filter.and_then(|f| f.strip_prefix("email:")) {
            Some(email) => self
                .users
                .iter()
                .filter(|u| u.key() == user_key(email))
                .cloned()
                .collect(),
            None => self.users.clone(),
        })
    }

    async fn list_deleted_users(&self) -> SyncResult<Vec<SourceUser>> {
        Ok(self.deleted.clone())
    }

    async fn list_groups(&self, _filter: Option<&str>) -> SyncResult<Vec<SourceGroup>> {
        Ok(self.groups.clone())
    }

    async fn list_group_members(&self, group: &SourceGroup) -> SyncResult<Vec<SourceMember>> {
        Ok(self.members.get(&group.id).cloned().unwrap_or_default())
    }
}

/// Injected failure for one operation on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    NotFound,
    Protocol,
    /// The call succeeds but the returned resource carries no id.
    MissingId,
}

#[derive(Debug, Default)]
pub struct TargetState {
    pub users: Vec<TargetUser>,
    /// Exists in the target but is missing from listings.
    pub hidden_users: Vec<TargetUser>,
    pub groups: Vec<TargetGroup>,
    pub hidden_groups: Vec<TargetGroup>,
    pub memberships: Vec<GroupMembership>,
    pub patches: Vec<(String, MembershipOp, Vec<String>)>,
    /// Log of mutating calls, e.g. `create_user bob@x.com`.
    pub mutations: Vec<String>,
    next_id: usize,
}

impl TargetState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// SCIM target and identity store backed by the same in-memory state.
pub struct InMemoryTarget {
    pub state: Mutex<TargetState>,
    pub failures: Mutex<HashMap<String, Fail>>,
    pub page_size: usize,
}

impl Default for InMemoryTarget {
    fn default() -> Self {
        Self {
            state: Mutex::new(TargetState::default()),
            failures: Mutex::new(HashMap::new()),
            page_size: 2,
        }
    }
}

fn not_found(entity: &'static str, key: &str) -> SyncError {
    SyncError::NotFound {
        entity,
        key: key.to_string(),
    }
}

fn paginate<T: Clone>(items: &[T], token: Option<String>, page_size: usize) -> Page<T> {
    let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    let slice = items.get(start..end).unwrap_or_default().to_vec();
    if end < items.len() {
        Page::more(slice, end.to_string())
    } else {
        Page::last(slice)
    }
}

impl InMemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<TargetUser>) -> Self {
        let target = Self::default();
        target.state.lock().unwrap().users = users;
        target
    }

    pub fn add_group(&self, group: TargetGroup, member_ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let group_id = group.id.clone().unwrap();
        for user_id in member_ids {
            state.memberships.push(GroupMembership {
                membership_id: format!("m-{group_id}-{user_id}"),
                group_id: group_id.clone(),
                user_id: (*user_id).to_string(),
            });
        }
        state.groups.push(group);
    }

    pub fn fail(&self, op: &str, key: &str, mode: Fail) {
        self.failures
            .lock()
            .unwrap()
            .insert(format!("{op}:{key}"), mode);
    }

    fn injected(&self, op: &str, entity: &'static str, key: &str) -> SyncResult<()> {
        match self.failures.lock().unwrap().get(&format!("{op}:{key}")) {
            Some(Fail::NotFound) => Err(not_found(entity, key)),
            Some(Fail::Protocol) => Err(SyncError::Protocol {
                operation: op.to_string(),
                status: Some(400),
                message: "injected".into(),
            }),
            Some(Fail::MissingId) | None => Ok(()),
        }
    }

    fn omits_id(&self, op: &str, key: &str) -> bool {
        self.failures.lock().unwrap().get(&format!("{op}:{key}")) == Some(&Fail::MissingId)
    }

    pub fn user(&self, email: &str) -> Option<TargetUser> {
        let key = user_key(email);
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.key() == key)
            .cloned()
    }

    pub fn user_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .map(TargetUser::key)
            .collect();
        keys.sort();
        keys
    }

    pub fn group(&self, name: &str) -> Option<TargetGroup> {
        self.state
            .lock()
            .unwrap()
            .groups
            .iter()
            .find(|g| g.display_name == name)
            .cloned()
    }

    /// Member emails of a group, sorted.
    pub fn member_emails(&self, group_name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let Some(group_id) = state
            .groups
            .iter()
            .find(|g| g.display_name == group_name)
            .and_then(|g| g.id.clone())
        else {
            return vec![];
        };
        let mut emails: Vec<String> = state
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .filter_map(|m| {
                state
                    .users
                    .iter()
                    .chain(&state.hidden_users)
                    .find(|u| u.id.as_deref() == Some(m.user_id.as_str()))
                    .map(TargetUser::key)
            })
            .collect();
        emails.sort();
        emails
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn patches(&self) -> Vec<(String, MembershipOp, Vec<String>)> {
        self.state.lock().unwrap().patches.clone()
    }
}

#[async_trait]
impl DirectoryTarget for InMemoryTarget {
    async fn find_user_by_email(&self, email: &str) -> SyncResult<TargetUser> {
        let key = user_key(email);
        let state = self.state.lock().unwrap();
        let matches: Vec<&TargetUser> = state
            .users
            .iter()
            .chain(&state.hidden_users)
            .filter(|u| u.key() == key)
            .collect();
        match matches.as_slice() {
            [] => Err(not_found("user", email)),
            [one] => Ok((*one).clone()),
            many => Err(SyncError::Ambiguous {
                entity: "user",
                key: email.to_string(),
                matches: many.len(),
            }),
        }
    }

    async fn find_group_by_display_name(&self, display_name: &str) -> SyncResult<TargetGroup> {
        let state = self.state.lock().unwrap();
        let matches: Vec<&TargetGroup> = state
            .groups
            .iter()
            .chain(&state.hidden_groups)
            .filter(|g| g.display_name == display_name)
            .collect();
        match matches.as_slice() {
            [] => Err(not_found("group", display_name)),
            [one] => Ok((*one).clone()),
            many => Err(SyncError::Ambiguous {
                entity: "group",
                key: display_name.to_string(),
                matches: many.len(),
            }),
        }
    }

    async fn create_user(&self, user: &TargetUser) -> SyncResult<TargetUser> {
        let key = user.key();
        self.injected("create_user", "user", &key)?;
        if self.omits_id("create_user", &key) {
            return Ok(user.clone());
        }
        let mut state = self.state.lock().unwrap();
        if state
            .users
            .iter()
            .chain(&state.hidden_users)
            .any(|u| u.key() == key)
        {
            return Err(SyncError::Conflict { entity: "user", key });
        }
        let created = user.clone().with_id(state.next_id("u"));
        state.mutations.push(format!("create_user {key}"));
        state.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: &TargetUser) -> SyncResult<TargetUser> {
        let key = user.key();
        self.injected("update_user", "user", &key)?;
        let mut state = self.state.lock().unwrap();
        let Some(slot) = state.users.iter_mut().find(|u| u.id == user.id && user.id.is_some()) else {
            return Err(not_found("user", &key));
        };
        *slot = user.clone();
        state.mutations.push(format!("update_user {key}"));
        Ok(user.clone())
    }

    async fn delete_user(&self, user: &TargetUser) -> SyncResult<()> {
        let key = user.key();
        self.injected("delete_user", "user", &key)?;
        let mut state = self.state.lock().unwrap();
        let before = state.users.len();
        state.users.retain(|u| u.id != user.id);
        if state.users.len() == before {
            return Err(not_found("user", &key));
        }
        let id = user.id.clone().unwrap_or_default();
        state.memberships.retain(|m| m.user_id != id);
        state.mutations.push(format!("delete_user {key}"));
        Ok(())
    }

    async fn create_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup> {
        let key = group.key();
        self.injected("create_group", "group", &key)?;
        if self.omits_id("create_group", &key) {
            return Ok(group.clone());
        }
        let mut state = self.state.lock().unwrap();
        if state
            .groups
            .iter()
            .chain(&state.hidden_groups)
            .any(|g| g.key() == key)
        {
            return Err(SyncError::Conflict {
                entity: "group",
                key,
            });
        }
        let created = group.clone().with_id(state.next_id("g"));
        state.mutations.push(format!("create_group {key}"));
        state.groups.push(created.clone());
        Ok(created)
    }

    async fn update_group(&self, group: &TargetGroup) -> SyncResult<TargetGroup> {
        let key = group.key();
        self.injected("update_group", "group", &key)?;
        let mut state = self.state.lock().unwrap();
        if state
            .groups
            .iter()
            .chain(&state.hidden_groups)
            .any(|g| g.id != group.id && g.key() == key)
        {
            return Err(SyncError::Conflict {
                entity: "group",
                key,
            });
        }
        let Some(slot) = state.groups.iter_mut().find(|g| g.id == group.id) else {
            return Err(not_found("group", &key));
        };
        slot.display_name = group.display_name.clone();
        slot.external_id = group.external_id.clone();
        let updated = slot.clone();
        state.mutations.push(format!("update_group {key}"));
        Ok(updated)
    }

    async fn delete_group(&self, group: &TargetGroup) -> SyncResult<()> {
        let key = group.key();
        self.injected("delete_group", "group", &key)?;
        let mut state = self.state.lock().unwrap();
        let before = state.groups.len();
        state.groups.retain(|g| g.id != group.id);
        if state.groups.len() == before {
            return Err(not_found("group", &key));
        }
        let id = group.id.clone().unwrap_or_default();
        state.memberships.retain(|m| m.group_id != id);
        state.mutations.push(format!("delete_group {key}"));
        Ok(())
    }

    async fn patch_group_membership(
        &self,
        group_id: &str,
        op: MembershipOp,
        member_ids: &[String],
    ) -> SyncResult<()> {
        self.injected("patch_group_membership", "group", group_id)?;
        if member_ids.len() > MAX_MEMBERS_PER_PATCH {
            return Err(SyncError::protocol("patch_group_membership", "too many members"));
        }
        let mut state = self.state.lock().unwrap();
        if !state
            .groups
            .iter()
            .chain(&state.hidden_groups)
            .any(|g| g.id.as_deref() == Some(group_id))
        {
            return Err(not_found("group", group_id));
        }
        for user_id in member_ids {
            match op {
                MembershipOp::Add => {
                    if !state
                        .memberships
                        .iter()
                        .any(|m| m.group_id == group_id && &m.user_id == user_id)
                    {
                        state.memberships.push(GroupMembership {
                            membership_id: format!("m-{group_id}-{user_id}"),
                            group_id: group_id.to_string(),
                            user_id: user_id.clone(),
                        });
                    }
                }
                MembershipOp::Remove => state
                    .memberships
                    .retain(|m| !(m.group_id == group_id && &m.user_id == user_id)),
            }
        }
        state
            .patches
            .push((group_id.to_string(), op, member_ids.to_vec()));
        state
            .mutations
            .push(format!("patch_group_membership {group_id} {op}"));
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryTarget {
    async fn list_users(&self, next_token: Option<String>) -> SyncResult<Page<TargetUser>> {
        Ok(paginate(&self.state.lock().unwrap().users, next_token, self.page_size))
    }

    async fn list_groups(&self, next_token: Option<String>) -> SyncResult<Page<TargetGroup>> {
        Ok(paginate(&self.state.lock().unwrap().groups, next_token, self.page_size))
    }

    async fn list_group_memberships(
        &self,
        group_id: &str,
        next_token: Option<String>,
    ) -> SyncResult<Page<GroupMembership>> {
        let memberships: Vec<GroupMembership> = self
            .state
            .lock()
            .unwrap()
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        Ok(paginate(&memberships, next_token, self.page_size))
    }

    async fn get_group_membership_id(&self, group_id: &str, user_id: &str) -> SyncResult<String> {
        self.state
            .lock()
            .unwrap()
            .memberships
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .map(|m| m.membership_id.clone())
            .ok_or_else(|| not_found("group membership", &format!("{group_id}/{user_id}")))
    }

    async fn delete_group_membership(&self, membership_id: &str) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.memberships.len();
        state.memberships.retain(|m| m.membership_id != membership_id);
        if state.memberships.len() == before {
            return Err(not_found("group membership", membership_id));
        }
        state
            .mutations
            .push(format!("delete_group_membership {membership_id}"));
        Ok(())
    }

    async fn is_member_in_groups(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> SyncResult<Vec<MembershipExistence>> {
        let state = self.state.lock().unwrap();
        Ok(group_ids
            .iter()
            .map(|group_id| MembershipExistence {
                group_id: group_id.clone(),
                user_id: user_id.to_string(),
                is_member: state
                    .memberships
                    .iter()
                    .any(|m| &m.group_id == group_id && m.user_id == user_id),
            })
            .collect())
    }
}
