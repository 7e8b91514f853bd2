//! Reconciliation engine.
//!
//! Pure functions partitioning a source snapshot and a target snapshot into
//! the operations needed to make the target match the source. Nothing here
//! performs I/O; the orchestrator applies the resulting partitions.
//!
//! Outputs follow input order (source order for `add`/`update`/`equal`,
//! target order for `delete`), so identical snapshots always produce
//! identical partitions. Duplicate keys within one input are last-write-wins.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{group_key, user_key, SourceGroup, SourceUser, TargetGroup, TargetUser};

/// User partitions, disjoint by correlation key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDiff {
    /// Source users missing from the target.
    pub add: Vec<TargetUser>,
    /// Target users missing from the source.
    pub delete: Vec<TargetUser>,
    /// Users whose names or active state changed. Carries the target id.
    pub update: Vec<TargetUser>,
    /// Target users already in sync.
    pub equal: Vec<TargetUser>,
}

impl UserDiff {
    /// Whether applying this diff would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty() && self.update.is_empty()
    }
}

/// Group partitions, disjoint by correlation key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    pub add: Vec<TargetGroup>,
    pub delete: Vec<TargetGroup>,
    pub equal: Vec<TargetGroup>,
    /// Groups correlated by stored external id whose display name changed.
    /// Carries the target id and the new display name.
    pub rename: Vec<TargetGroup>,
}

/// A (group, user) pair, both expressed as correlation keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MembershipEdge {
    pub group: String,
    pub user: String,
}

/// Membership partitions over the target's existing edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub delete: Vec<MembershipEdge>,
    pub equal: Vec<MembershipEdge>,
}

fn user_needs_update(target: &TargetUser, source: &SourceUser) -> bool {
    // `active` and `suspended` are logical opposites: equal values mean drift.
    target.active == source.suspended
        || target.given_name != source.given_name
        || target.family_name != source.family_name
}

/// Partition users into add / delete / update / equal by email key.
#[must_use]
pub fn compute_user_diff(target_users: &[TargetUser], source_users: &[SourceUser]) -> UserDiff {
    let target_by_key: HashMap<String, &TargetUser> =
        target_users.iter().map(|u| (u.key(), u)).collect();
    let source_by_key: HashMap<String, &SourceUser> =
        source_users.iter().map(|u| (u.key(), u)).collect();

    let mut diff = UserDiff::default();

    let mut seen = HashSet::new();
    for key in source_users.iter().map(SourceUser::key) {
        if !seen.insert(key.clone()) {
            continue;
        }
        let Some(source) = source_by_key.get(&key) else {
            continue;
        };

        match target_by_key.get(&key) {
            Some(target) if user_needs_update(target, source) => {
                let mut updated = TargetUser::from_source(source);
                updated.id.clone_from(&target.id);
                diff.update.push(updated);
            }
            Some(target) => diff.equal.push((*target).clone()),
            None => diff.add.push(TargetUser::from_source(source)),
        }
    }

    let mut seen = HashSet::new();
    for key in target_users.iter().map(TargetUser::key) {
        if source_by_key.contains_key(&key) || !seen.insert(key.clone()) {
            continue;
        }
        if let Some(target) = target_by_key.get(&key) {
            diff.delete.push((*target).clone());
        }
    }

    diff
}

/// Partition groups into add / delete / equal / rename.
///
/// A target group whose `external_id` matches a source group id correlates
/// by that id first; remaining groups correlate by display name. Every target
/// group left unclaimed lands in `delete`.
#[must_use]
pub fn compute_group_diff(
    target_groups: &[TargetGroup],
    source_groups: &[SourceGroup],
) -> GroupDiff {
    let source_by_key: HashMap<String, &SourceGroup> =
        source_groups.iter().map(|g| (g.key(), g)).collect();

    let mut unique_sources: Vec<&SourceGroup> = Vec::new();
    let mut seen = HashSet::new();
    for key in source_groups.iter().map(SourceGroup::key) {
        if seen.insert(key.clone()) {
            if let Some(group) = source_by_key.get(&key) {
                unique_sources.push(group);
            }
        }
    }

    let target_by_external_id: HashMap<&str, usize> = target_groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| g.external_id.as_deref().map(|ext| (ext, i)))
        .collect();
    let target_by_key: HashMap<String, usize> = target_groups
        .iter()
        .enumerate()
        .map(|(i, g)| (g.key(), i))
        .collect();

    // Stored external ids win over display names, so they are claimed first.
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut resolved: Vec<Option<(usize, bool)>> = unique_sources
        .iter()
        .map(|source| {
            target_by_external_id
                .get(source.id.as_str())
                .copied()
                .filter(|i| claimed.insert(*i))
                .map(|i| (i, true))
        })
        .collect();

    for (slot, source) in resolved.iter_mut().zip(&unique_sources) {
        if slot.is_none() {
            *slot = target_by_key
                .get(&source.key())
                .copied()
                .filter(|i| claimed.insert(*i))
                .map(|i| (i, false));
        }
    }

    let mut diff = GroupDiff::default();
    for (source, slot) in unique_sources.iter().zip(resolved) {
        match slot {
            Some((i, by_external_id)) => {
                let target = &target_groups[i];
                if by_external_id && target.key() != source.key() {
                    diff.rename.push(TargetGroup {
                        id: target.id.clone(),
                        external_id: Some(source.id.clone()),
                        display_name: source.name.clone(),
                        members: target.members.clone(),
                    });
                } else {
                    diff.equal.push(target.clone());
                }
            }
            None => diff.add.push(TargetGroup::from_source(source)),
        }
    }

    // Unclaimed groups go, including one still holding a name a rename takes.
    diff.delete = target_groups
        .iter()
        .enumerate()
        .filter(|(i, _)| !claimed.contains(i))
        .map(|(_, target)| target.clone())
        .collect();

    diff
}

/// Classify every existing target membership edge as `equal` (present in the
/// source) or `delete` (absent from the source).
///
/// Both maps are keyed by group key and hold user keys.
#[must_use]
pub fn compute_group_membership_diff(
    source_members: &BTreeMap<String, Vec<String>>,
    target_members: &BTreeMap<String, Vec<String>>,
) -> MembershipDiff {
    let source_sets: HashMap<String, HashSet<String>> = source_members
        .iter()
        .map(|(group, users)| {
            (
                group_key(group),
                users.iter().map(|u| user_key(u)).collect(),
            )
        })
        .collect();

    let mut diff = MembershipDiff::default();
    for (group, users) in target_members {
        let group = group_key(group);
        let source_set = source_sets.get(&group);
        let mut seen = HashSet::new();
        for user in users.iter().map(|u| user_key(u)) {
            if !seen.insert(user.clone()) {
                continue;
            }
            let edge = MembershipEdge {
                group: group.clone(),
                user: user.clone(),
            };
            if source_set.is_some_and(|set| set.contains(&user)) {
                diff.equal.push(edge);
            } else {
                diff.delete.push(edge);
            }
        }
    }
    diff
}

/// Source edges missing from the target, for the given groups only.
#[must_use]
pub fn compute_membership_additions(
    source_members: &BTreeMap<String, Vec<String>>,
    target_members: &BTreeMap<String, Vec<String>>,
) -> Vec<MembershipEdge> {
    let mut additions = Vec::new();
    for (group, users) in source_members {
        let group = group_key(group);
        let existing: HashSet<String> = target_members
            .get(&group)
            .map(|users| users.iter().map(|u| user_key(u)).collect())
            .unwrap_or_default();
        let mut seen = HashSet::new();
        for user in users.iter().map(|u| user_key(u)) {
            if existing.contains(&user) || !seen.insert(user.clone()) {
                continue;
            }
            additions.push(MembershipEdge {
                group: group.clone(),
                user,
            });
        }
    }
    additions
}
