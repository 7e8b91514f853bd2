//! Sync orchestrator.
//!
//! One run takes a snapshot of both directories, computes the user, group
//! and membership diffs and applies them in a fixed order:
//!
//! 1. delete users
//! 2. update users
//! 3. create users
//! 4. create groups (with their initial members)
//! 5. reconcile membership of existing groups (renames first, after
//!    deleting any group that still holds a name being taken)
//! 6. delete groups
//!
//! There is no rollback. A run that stops half-way is repaired by the next
//! run, which sees the partially applied state as its starting point.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use idsync_core::{
    collect_all, compute_group_diff, compute_group_membership_diff, compute_membership_additions,
    compute_user_diff, patch_in_batches, AttributeMapper, DirectorySource, DirectoryTarget,
    GroupDiff, IdentityFilter, IdentityStore, MembershipEdge, MembershipOp, PassthroughMapper,
    SourceGroup, SourceUser, SyncError, SyncResult, TargetGroup, TargetUser,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{FailurePolicy, SyncConfig, SyncMethod};
use crate::dry_run::DryRunTarget;
use crate::report::{SyncReport, SyncStage};

/// Source side of a run, after filters.
#[derive(Debug, Default)]
struct SourceSnapshot {
    users: Vec<SourceUser>,
    groups: Vec<SourceGroup>,
    /// Group key to member user keys, restricted to synced users.
    members: BTreeMap<String, Vec<String>>,
}

/// Target side of a run, after filters.
#[derive(Debug, Default)]
struct TargetSnapshot {
    users: Vec<TargetUser>,
    groups: Vec<TargetGroup>,
}

/// Resolved target ids, updated as stages create and delete entities.
#[derive(Debug, Default)]
struct IdMap {
    users: HashMap<String, String>,
    groups: HashMap<String, String>,
}

/// Drives a single reconciliation run from source to target.
pub struct SyncOrchestrator {
    source: Arc<dyn DirectorySource>,
    target: Arc<dyn DirectoryTarget>,
    store: Arc<dyn IdentityStore>,
    mapper: Arc<dyn AttributeMapper>,
    filter: IdentityFilter,
    config: SyncConfig,
}

impl SyncOrchestrator {
    /// Create an orchestrator.
    ///
    /// With `config.dry_run` set, `target` and `store` are wrapped in a
    /// [`DryRunTarget`] so no mutation reaches the remote directory.
    pub fn new(
        source: Arc<dyn DirectorySource>,
        target: Arc<dyn DirectoryTarget>,
        store: Arc<dyn IdentityStore>,
        config: SyncConfig,
    ) -> Self {
        let (target, store): (Arc<dyn DirectoryTarget>, Arc<dyn IdentityStore>) =
            if config.dry_run {
                let overlay = Arc::new(DryRunTarget::new(target, store));
                (overlay.clone(), overlay)
            } else {
                (target, store)
            };

        Self {
            source,
            target,
            store,
            mapper: Arc::new(PassthroughMapper),
            filter: config.filter(),
            config,
        }
    }

    /// Replace the attribute mapper applied before user creates and updates.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Arc<dyn AttributeMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Execute one full run.
    ///
    /// Returns the report when every stage completed. Failures skipped under
    /// [`FailurePolicy::Continue`] are listed in the report; any other
    /// failure ends the run with the error.
    #[instrument(skip(self), fields(method = %self.config.method, dry_run = self.config.dry_run))]
    pub async fn run(&self) -> SyncResult<SyncReport> {
        self.config.validate()?;
        let mut report = SyncReport::start(self.config.method, self.config.dry_run);
        info!("Starting sync run");

        let source = match self.config.method {
            SyncMethod::UsersGroups => self.snapshot_users_groups().await?,
            SyncMethod::Groups => self.snapshot_groups().await?,
        };
        let target = self.snapshot_target().await?;

        let user_diff = compute_user_diff(&target.users, &source.users);
        let group_diff = compute_group_diff(&target.groups, &source.groups);
        info!(
            users_add = user_diff.add.len(),
            users_update = user_diff.update.len(),
            users_delete = user_diff.delete.len(),
            users_equal = user_diff.equal.len(),
            groups_add = group_diff.add.len(),
            groups_rename = group_diff.rename.len(),
            groups_delete = group_diff.delete.len(),
            groups_equal = group_diff.equal.len(),
            "Computed diff"
        );

        let target_members = self.target_memberships(&group_diff, &target.users).await?;

        let mut ids = IdMap::default();
        for user in &target.users {
            if let Some(id) = &user.id {
                ids.users.insert(user.key(), id.clone());
            }
        }
        for group in group_diff.equal.iter().chain(&group_diff.rename) {
            if let Some(id) = &group.id {
                ids.groups.insert(group.key(), id.clone());
            }
        }
        let source_by_key: HashMap<String, &SourceUser> =
            source.users.iter().map(|u| (u.key(), u)).collect();

        self.delete_users(&user_diff.delete, &mut ids, &mut report)
            .await?;
        self.update_users(&user_diff.update, &source_by_key, &mut ids, &mut report)
            .await?;
        self.create_users(&user_diff.add, &source_by_key, &mut ids, &mut report)
            .await?;
        self.create_groups(&group_diff.add, &source.members, &mut ids, &mut report)
            .await?;
        // A group holding a name that a rename takes must go before the rename.
        let renamed: HashSet<String> = group_diff.rename.iter().map(TargetGroup::key).collect();
        let (name_holders, stale_groups): (Vec<TargetGroup>, Vec<TargetGroup>) = group_diff
            .delete
            .iter()
            .cloned()
            .partition(|g| renamed.contains(&g.key()));
        self.delete_groups(&name_holders, &mut report).await?;
        self.reconcile_membership(&group_diff, &source.members, &target_members, &ids, &mut report)
            .await?;
        self.delete_groups(&stale_groups, &mut report).await?;

        report.finish();
        info!(
            changes = report.total_changes(),
            failures = report.failures.len(),
            duration_ms = report.duration_ms().unwrap_or_default(),
            "Sync run finished"
        );
        Ok(report)
    }

    // --- snapshots ---

    async fn deleted_user_keys(&self) -> SyncResult<HashSet<String>> {
        Ok(self
            .source
            .list_deleted_users()
            .await?
            .iter()
            .map(SourceUser::key)
            .collect())
    }

    async fn snapshot_users_groups(&self) -> SyncResult<SourceSnapshot> {
        let deleted = self.deleted_user_keys().await?;
        let users: Vec<SourceUser> = self
            .filter
            .source_users(self.source.list_users(self.config.user_match.as_deref()).await?)
            .into_iter()
            .filter(|u| !deleted.contains(&u.key()))
            .collect();
        let groups = self
            .filter
            .source_groups(self.source.list_groups(self.config.group_match.as_deref()).await?);

        let synced: HashSet<String> = users.iter().map(SourceUser::key).collect();
        let mut members = BTreeMap::new();
        for group in &groups {
            let keys: Vec<String> = self
                .source
                .list_group_members(group)
                .await?
                .iter()
                .filter(|m| m.is_active_user())
                .map(|m| m.key())
                .filter(|key| synced.contains(key))
                .collect();
            members.insert(group.key(), keys);
        }

        info!(
            users = users.len(),
            deleted = deleted.len(),
            groups = groups.len(),
            "Source snapshot taken"
        );
        Ok(SourceSnapshot {
            users,
            groups,
            members,
        })
    }

    /// Group-driven snapshot: users are the members of the selected groups.
    async fn snapshot_groups(&self) -> SyncResult<SourceSnapshot> {
        let deleted = self.deleted_user_keys().await?;
        let groups = self
            .filter
            .source_groups(self.source.list_groups(self.config.group_match.as_deref()).await?);

        let mut member_keys: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut wanted: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for group in &groups {
            let keys: Vec<String> = self
                .source
                .list_group_members(group)
                .await?
                .iter()
                .filter(|m| m.is_active_user())
                .map(|m| m.key())
                .filter(|key| !self.filter.is_user_ignored(key) && !deleted.contains(key))
                .collect();
            for key in &keys {
                if seen.insert(key.clone()) {
                    wanted.push(key.clone());
                }
            }
            member_keys.insert(group.key(), keys);
        }

        let mut users = Vec::with_capacity(wanted.len());
        for key in &wanted {
            let found = self
                .source
                .list_users(Some(&format!("email:{key}")))
                .await?
                .into_iter()
                .find(|u| &u.key() == key);
            match found {
                Some(user) => users.push(user),
                None => warn!(user = %key, "Group member missing from source user listing, skipping"),
            }
        }

        let synced: HashSet<String> = users.iter().map(SourceUser::key).collect();
        let members = member_keys
            .into_iter()
            .map(|(group, keys)| {
                let keys: Vec<String> = keys.into_iter().filter(|k| synced.contains(k)).collect();
                (group, keys)
            })
            .collect();

        info!(
            users = users.len(),
            groups = groups.len(),
            "Source snapshot taken from group members"
        );
        Ok(SourceSnapshot {
            users,
            groups,
            members,
        })
    }

    async fn snapshot_target(&self) -> SyncResult<TargetSnapshot> {
        let users = collect_all("list_users", |token| self.store.list_users(token)).await?;
        let groups = collect_all("list_groups", |token| self.store.list_groups(token)).await?;
        let snapshot = TargetSnapshot {
            users: self.filter.target_users(users),
            groups: self.filter.target_groups(groups),
        };
        info!(
            users = snapshot.users.len(),
            groups = snapshot.groups.len(),
            "Target snapshot taken"
        );
        Ok(snapshot)
    }

    /// Current members (user keys) of every correlated target group, keyed
    /// by the source-side group key.
    async fn target_memberships(
        &self,
        groups: &GroupDiff,
        users: &[TargetUser],
    ) -> SyncResult<BTreeMap<String, Vec<String>>> {
        let keys_by_id: HashMap<&str, String> = users
            .iter()
            .filter_map(|u| u.id.as_deref().map(|id| (id, u.key())))
            .collect();

        let mut memberships = BTreeMap::new();
        for group in groups.equal.iter().chain(&groups.rename) {
            let Some(group_id) = group.id.as_deref() else {
                continue;
            };
            let edges = collect_all("list_group_memberships", |token| {
                self.store.list_group_memberships(group_id, token)
            })
            .await?;
            // Members outside the filtered user snapshot are left alone.
            let keys: Vec<String> = edges
                .iter()
                .filter_map(|m| keys_by_id.get(m.user_id.as_str()).cloned())
                .collect();
            debug!(group = %group.display_name, members = keys.len(), "Target memberships loaded");
            memberships.insert(group.key(), keys);
        }
        Ok(memberships)
    }

    // --- stages ---

    /// Apply the failure policy to a failed mutation.
    fn absorb(
        &self,
        report: &mut SyncReport,
        stage: SyncStage,
        entity: &str,
        err: SyncError,
    ) -> SyncResult<()> {
        if err.is_fatal() || self.config.failure_policy == FailurePolicy::Abort {
            error!(stage = %stage, entity = %entity, error = %err, "Sync operation failed, aborting run");
            return Err(err);
        }
        warn!(stage = %stage, entity = %entity, error = %err, "Sync operation failed, continuing");
        report.record_failure(stage, entity, &err);
        Ok(())
    }

    async fn delete_users(
        &self,
        users: &[TargetUser],
        ids: &mut IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        info!(stage = %SyncStage::DeleteUsers, count = users.len(), "Running stage");
        for user in users {
            let key = user.key();
            match self.target.delete_user(user).await {
                Ok(()) => report.users_deleted += 1,
                Err(e) if e.is_not_found() => {
                    debug!(user = %key, "User already gone from target");
                }
                Err(e) => {
                    self.absorb(report, SyncStage::DeleteUsers, &key, e)?;
                    continue;
                }
            }
            ids.users.remove(&key);
        }
        Ok(())
    }

    async fn update_users(
        &self,
        users: &[TargetUser],
        sources: &HashMap<String, &SourceUser>,
        ids: &mut IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        info!(stage = %SyncStage::UpdateUsers, count = users.len(), "Running stage");
        for user in users {
            let key = user.key();
            match self.update_or_create_user(user, sources, report).await {
                Ok(updated) => {
                    if let Some(id) = updated.id.or_else(|| user.id.clone()) {
                        ids.users.insert(key, id);
                    }
                }
                Err(e) => self.absorb(report, SyncStage::UpdateUsers, &key, e)?,
            }
        }
        Ok(())
    }

    /// Update a user; one the target no longer knows is created again.
    async fn update_or_create_user(
        &self,
        user: &TargetUser,
        sources: &HashMap<String, &SourceUser>,
        report: &mut SyncReport,
    ) -> SyncResult<TargetUser> {
        let mapped = self.map_user(user, sources).await?;
        let outcome = self.target.update_user(&mapped).await;
        match outcome {
            Ok(updated) => {
                report.users_updated += 1;
                Ok(updated)
            }
            Err(e) if e.is_not_found() => {
                warn!(user = %user.key(), "User vanished from target, creating it instead");
                let mut fresh = mapped;
                fresh.id = None;
                self.create_or_resolve_user(&fresh, report).await
            }
            Err(e) => Err(e),
        }
    }

    async fn create_users(
        &self,
        users: &[TargetUser],
        sources: &HashMap<String, &SourceUser>,
        ids: &mut IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        info!(stage = %SyncStage::CreateUsers, count = users.len(), "Running stage");
        for user in users {
            let key = user.key();
            let result = match self.map_user(user, sources).await {
                Ok(mapped) => self.create_or_resolve_user(&mapped, report).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(TargetUser { id: Some(id), .. }) => {
                    ids.users.insert(key, id);
                }
                Ok(_) => self.absorb(
                    report,
                    SyncStage::CreateUsers,
                    &key,
                    SyncError::protocol("create_user", "user resource has no id"),
                )?,
                Err(e) => self.absorb(report, SyncStage::CreateUsers, &key, e)?,
            }
        }
        Ok(())
    }

    async fn map_user(
        &self,
        user: &TargetUser,
        sources: &HashMap<String, &SourceUser>,
    ) -> SyncResult<TargetUser> {
        match sources.get(&user.key()) {
            Some(source) => self.mapper.map_attributes(user.clone(), source).await,
            None => Ok(user.clone()),
        }
    }

    /// Create a user; an existing user with the same name is resolved by lookup.
    async fn create_or_resolve_user(
        &self,
        user: &TargetUser,
        report: &mut SyncReport,
    ) -> SyncResult<TargetUser> {
        match self.target.create_user(user).await {
            Ok(created) => {
                report.users_created += 1;
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                warn!(user = %user.key(), "User already exists in target, resolving by email");
                self.target.find_user_by_email(&user.user_name).await
            }
            Err(e) => Err(e),
        }
    }

    async fn create_groups(
        &self,
        groups: &[TargetGroup],
        source_members: &BTreeMap<String, Vec<String>>,
        ids: &mut IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        info!(stage = %SyncStage::CreateGroups, count = groups.len(), "Running stage");
        for group in groups {
            let key = group.key();
            let created = match self.target.create_group(group).await {
                Ok(created) => {
                    report.groups_created += 1;
                    Ok(created)
                }
                Err(e) if e.is_conflict() => {
                    warn!(group = %key, "Group already exists in target, resolving by name");
                    self.target
                        .find_group_by_display_name(&group.display_name)
                        .await
                }
                Err(e) => Err(e),
            };
            let group_id = match created.and_then(|group| {
                group
                    .id
                    .ok_or_else(|| SyncError::protocol("create_group", "group resource has no id"))
            }) {
                Ok(id) => id,
                Err(e) => {
                    self.absorb(report, SyncStage::CreateGroups, &key, e)?;
                    continue;
                }
            };
            ids.groups.insert(key.clone(), group_id.clone());

            let members = resolve_user_ids(
                source_members.get(&key).map(Vec::as_slice).unwrap_or_default(),
                &ids.users,
            );
            if members.is_empty() {
                continue;
            }
            match patch_in_batches(self.target.as_ref(), &group_id, MembershipOp::Add, &members)
                .await
            {
                Ok(applied) => report.members_added += count(applied),
                Err(e) => self.absorb(report, SyncStage::CreateGroups, &key, e)?,
            }
        }
        Ok(())
    }

    async fn reconcile_membership(
        &self,
        groups: &GroupDiff,
        source_members: &BTreeMap<String, Vec<String>>,
        target_members: &BTreeMap<String, Vec<String>>,
        ids: &IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        info!(
            stage = %SyncStage::ReconcileMembership,
            renames = groups.rename.len(),
            groups = groups.equal.len() + groups.rename.len(),
            "Running stage"
        );

        for group in &groups.rename {
            match self.target.update_group(group).await {
                Ok(_) => {
                    info!(group = %group.display_name, id = ?group.id, "Group renamed");
                    report.groups_renamed += 1;
                }
                Err(e) => self.absorb(
                    report,
                    SyncStage::ReconcileMembership,
                    &group.display_name,
                    e,
                )?,
            }
        }

        let existing: BTreeMap<String, Vec<String>> = source_members
            .iter()
            .filter(|(key, _)| target_members.contains_key(*key))
            .map(|(key, users)| (key.clone(), users.clone()))
            .collect();
        let additions = compute_membership_additions(&existing, target_members);
        let removals = compute_group_membership_diff(&existing, target_members).delete;

        let mut adds = group_edges(&additions, ids);
        if self.config.method == SyncMethod::Groups {
            adds = self.drop_existing_members(adds, report).await?;
        }
        for (group_id, members) in &adds {
            match patch_in_batches(self.target.as_ref(), group_id, MembershipOp::Add, members)
                .await
            {
                Ok(applied) => report.members_added += count(applied),
                Err(e) => self.absorb(report, SyncStage::ReconcileMembership, group_id, e)?,
            }
        }

        match self.config.method {
            SyncMethod::UsersGroups => {
                for (group_id, members) in &group_edges(&removals, ids) {
                    match patch_in_batches(
                        self.target.as_ref(),
                        group_id,
                        MembershipOp::Remove,
                        members,
                    )
                    .await
                    {
                        Ok(applied) => report.members_removed += count(applied),
                        Err(e) => {
                            self.absorb(report, SyncStage::ReconcileMembership, group_id, e)?;
                        }
                    }
                }
            }
            SyncMethod::Groups => {
                for (group_id, members) in &group_edges(&removals, ids) {
                    for user_id in members {
                        match self.remove_membership(group_id, user_id).await {
                            Ok(true) => report.members_removed += 1,
                            Ok(false) => {}
                            Err(e) => self.absorb(
                                report,
                                SyncStage::ReconcileMembership,
                                &format!("{group_id}/{user_id}"),
                                e,
                            )?,
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove one edge through the identity store. `Ok(false)` when the edge
    /// was already gone.
    async fn remove_membership(&self, group_id: &str, user_id: &str) -> SyncResult<bool> {
        let membership_id = match self.store.get_group_membership_id(group_id, user_id).await {
            Ok(id) => id,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        match self.store.delete_group_membership(&membership_id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop pending additions the identity store already reports as members.
    async fn drop_existing_members(
        &self,
        adds: BTreeMap<String, Vec<String>>,
        report: &mut SyncReport,
    ) -> SyncResult<BTreeMap<String, Vec<String>>> {
        let mut by_user: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (group_id, users) in &adds {
            for user_id in users {
                by_user
                    .entry(user_id.as_str())
                    .or_default()
                    .push(group_id.clone());
            }
        }

        let mut present: HashSet<(String, String)> = HashSet::new();
        for (user_id, group_ids) in &by_user {
            match self.store.is_member_in_groups(user_id, group_ids).await {
                Ok(existence) => present.extend(
                    existence
                        .into_iter()
                        .filter(|m| m.is_member)
                        .map(|m| (m.group_id, m.user_id)),
                ),
                Err(e) => self.absorb(report, SyncStage::ReconcileMembership, user_id, e)?,
            }
        }

        Ok(adds
            .iter()
            .map(|(group_id, users)| {
                let kept: Vec<String> = users
                    .iter()
                    .filter(|u| !present.contains(&(group_id.clone(), (*u).clone())))
                    .cloned()
                    .collect();
                (group_id.clone(), kept)
            })
            .filter(|(_, users)| !users.is_empty())
            .collect())
    }

    async fn delete_groups(&self, groups: &[TargetGroup], report: &mut SyncReport) -> SyncResult<()> {
        info!(stage = %SyncStage::DeleteGroups, count = groups.len(), "Running stage");
        for group in groups {
            match self.target.delete_group(group).await {
                Ok(()) => report.groups_deleted += 1,
                Err(e) if e.is_not_found() => {
                    debug!(group = %group.display_name, "Group already gone from target");
                }
                Err(e) => {
                    self.absorb(report, SyncStage::DeleteGroups, &group.display_name, e)?;
                }
            }
        }
        Ok(())
    }
}

/// Map user keys to target ids, skipping users without one.
fn resolve_user_ids(keys: &[String], user_ids: &HashMap<String, String>) -> Vec<String> {
    keys.iter()
        .filter_map(|key| {
            let id = user_ids.get(key).cloned();
            if id.is_none() {
                debug!(user = %key, "No target id for member, skipping");
            }
            id
        })
        .collect()
}

/// Group membership edges by target group id, resolving user keys to ids.
fn group_edges(edges: &[MembershipEdge], ids: &IdMap) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for edge in edges {
        let (Some(group_id), Some(user_id)) = (ids.groups.get(&edge.group), ids.users.get(&edge.user))
        else {
            debug!(group = %edge.group, user = %edge.user, "Unresolved membership edge, skipping");
            continue;
        };
        grouped
            .entry(group_id.clone())
            .or_default()
            .push(user_id.clone());
    }
    grouped
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
