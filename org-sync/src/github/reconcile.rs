//! The differences between the local configuration and the remote state,
//! one stage at a time.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use team_config::{CodeReviewAssignment, Config, RepoPermission, TeamPrivacy, User};

/// What has to be added to and removed from a remote set so that it matches
/// the local one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetChange<T> {
    pub add: Vec<T>,
    pub remove: Vec<T>,
}

impl<T> Default for SetChange<T> {
    fn default() -> Self {
        SetChange {
            add: Vec::new(),
            remove: Vec::new(),
        }
    }
}

impl<T> SetChange<T> {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub fn set_difference<T: Ord + Clone>(local: &BTreeSet<T>, remote: &BTreeSet<T>) -> SetChange<T> {
    SetChange {
        add: local.difference(remote).cloned().collect(),
        remove: remote.difference(local).cloned().collect(),
    }
}

/// Repositories known on only one side. Repositories are never created or
/// deleted remotely, the local list follows the remote one instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepositoryCheck {
    pub local_only: Vec<String>,
    pub remote_only: Vec<String>,
}

pub fn check_repositories(local: &Config, remote: &Config) -> RepositoryCheck {
    let local_names: BTreeSet<String> = local.repositories.keys().cloned().collect();
    let remote_names: BTreeSet<String> = remote.repositories.keys().cloned().collect();
    let change = set_difference(&local_names, &remote_names);
    RepositoryCheck {
        local_only: change.add,
        remote_only: change.remove,
    }
}

impl RepositoryCheck {
    pub fn is_empty(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty()
    }

    /// Aligns the local repository list with the remote one.
    pub fn apply(&self, local: &mut Config, remote: &Config) {
        for name in &self.remote_only {
            if let Some(repo) = remote.repositories.get(name) {
                local.repositories.insert(name.clone(), repo.clone());
            }
        }
        for name in &self.local_only {
            local.repositories.remove(name);
        }
    }

    pub fn log(&self) {
        if self.is_empty() {
            debug!("✅ Repository list is in sync");
            return;
        }
        info!("📦 Local repository list is out of sync:");
        if !self.remote_only.is_empty() {
            info!("  Adding to the local configuration: {}", self.remote_only.join(", "));
        }
        if !self.local_only.is_empty() {
            info!("  Removing from the local configuration: {}", self.local_only.join(", "));
        }
    }
}

pub fn diff_members(local: &Config, remote: &Config) -> SetChange<String> {
    let local_members: BTreeSet<String> = local.members.keys().cloned().collect();
    let remote_members: BTreeSet<String> = remote.members.keys().cloned().collect();
    set_difference(&local_members, &remote_members)
}

/// Teams to create, parents first, and teams to delete, without the ones
/// deleted along with an ancestor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeamsChange {
    pub create: Vec<String>,
    pub delete: Vec<String>,
}

impl TeamsChange {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }

    pub fn log(&self) {
        for name in &self.create {
            info!("➕ Creating team '{name}'");
        }
        for name in &self.delete {
            info!("❌ Deleting team '{name}'");
        }
    }
}

pub fn diff_teams(local: &Config, remote: &Config) -> TeamsChange {
    let local_teams: BTreeSet<String> = local.teams.keys().cloned().collect();
    let remote_teams: BTreeSet<String> = remote.teams.keys().cloned().collect();
    let change = set_difference(&local_teams, &remote_teams);

    let to_create: BTreeSet<&str> = change.add.iter().map(String::as_str).collect();
    let mut create = Vec::new();
    let mut placed = BTreeSet::new();
    for name in &change.add {
        place_parent_first(local, &to_create, name, &mut placed, &mut create);
    }

    let delete = change
        .remove
        .iter()
        .filter(|name| {
            !change
                .remove
                .iter()
                .any(|other| other != *name && remote.is_ancestor_of(other, name))
        })
        .cloned()
        .collect();

    TeamsChange { create, delete }
}

fn place_parent_first<'a>(
    local: &'a Config,
    to_create: &BTreeSet<&'a str>,
    name: &'a str,
    placed: &mut BTreeSet<&'a str>,
    order: &mut Vec<String>,
) {
    if !placed.insert(name) {
        return;
    }
    if let Some(parent) = local.teams.get(name).and_then(|t| t.parent.as_deref()) {
        if to_create.contains(parent) {
            place_parent_first(local, to_create, parent, placed, order);
        }
    }
    order.push(name.to_string());
}

/// The privacy a team ends up with when none is configured.
pub fn effective_privacy(privacy: Option<TeamPrivacy>, parent: Option<&str>) -> TeamPrivacy {
    match (privacy, parent) {
        (Some(privacy), _) => privacy,
        (None, Some(_)) => TeamPrivacy::Visible,
        (None, None) => TeamPrivacy::Secret,
    }
}

/// Settings of a team existing on both sides, as `(remote, local)` pairs of
/// the fields that differ.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamSettingsChange {
    pub team: String,
    pub description_diff: Option<(String, String)>,
    pub privacy_diff: Option<(TeamPrivacy, TeamPrivacy)>,
    pub parent_diff: Option<(Option<String>, Option<String>)>,
}

impl TeamSettingsChange {
    pub fn log(&self) {
        info!("📝 Editing team '{}':", self.team);
        if let Some((old, new)) = &self.description_diff {
            info!("  New description: '{old}' => '{new}'");
        }
        if let Some((old, new)) = &self.privacy_diff {
            info!("  New privacy: '{old}' => '{new}'");
        }
        if let Some((old, new)) = &self.parent_diff {
            let display = |parent: &Option<String>| parent.clone().unwrap_or_else(|| "<none>".to_string());
            info!("  New parent: '{}' => '{}'", display(old), display(new));
        }
    }
}

pub fn diff_team_settings(local: &Config, remote: &Config) -> Vec<TeamSettingsChange> {
    let mut changes = Vec::new();
    for (name, team) in &local.teams {
        let Some(remote_team) = remote.teams.get(name) else {
            continue;
        };
        let local_privacy = effective_privacy(team.privacy, team.parent.as_deref());
        let remote_privacy =
            effective_privacy(remote_team.privacy, remote_team.parent.as_deref());
        let change = TeamSettingsChange {
            team: name.clone(),
            description_diff: (team.description != remote_team.description)
                .then(|| (remote_team.description.clone(), team.description.clone())),
            privacy_diff: (local_privacy != remote_privacy).then_some((remote_privacy, local_privacy)),
            parent_diff: (team.parent != remote_team.parent)
                .then(|| (remote_team.parent.clone(), team.parent.clone())),
        };
        if change.description_diff.is_some()
            || change.privacy_diff.is_some()
            || change.parent_diff.is_some()
        {
            changes.push(change);
        }
    }
    changes
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamMembershipChange {
    pub team: String,
    /// The team was just created and is seeded with all its members.
    pub new_team: bool,
    pub members: SetChange<String>,
}

impl TeamMembershipChange {
    pub fn log(&self) {
        info!("👥 Team '{}' membership:", self.team);
        for login in &self.members.add {
            info!("  Adding member '{login}'");
        }
        for login in &self.members.remove {
            info!("  Removing member '{login}'");
        }
    }
}

/// Membership changes of every local team. Creating a team makes its
/// creator, `authenticated_user`, a member, so new teams drop it again
/// unless it belongs there.
pub fn diff_team_membership(
    local: &Config,
    remote: &Config,
    authenticated_user: &str,
) -> Vec<TeamMembershipChange> {
    let mut changes = Vec::new();
    for (name, team) in &local.teams {
        let local_members: BTreeSet<String> = team.members.iter().cloned().collect();
        let change = match remote.teams.get(name) {
            Some(remote_team) => {
                let remote_members: BTreeSet<String> =
                    remote_team.members.iter().cloned().collect();
                TeamMembershipChange {
                    team: name.clone(),
                    new_team: false,
                    members: set_difference(&local_members, &remote_members),
                }
            }
            None => {
                let mut remove = Vec::new();
                if !authenticated_user.is_empty() && !local_members.contains(authenticated_user) {
                    remove.push(authenticated_user.to_string());
                }
                TeamMembershipChange {
                    team: name.clone(),
                    new_team: true,
                    members: SetChange {
                        add: local_members.into_iter().collect(),
                        remove,
                    },
                }
            }
        };
        if !change.members.is_empty() {
            changes.push(change);
        }
    }
    changes
}

/// The review assignment settings of a team, recomputed from scratch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewAssignmentChange {
    pub team: String,
    pub settings: CodeReviewAssignment,
    /// Mentors and members excluded from this team.
    pub excluded: Vec<String>,
    /// Members excluded from every team.
    pub globally_excluded: Vec<String>,
}

pub fn plan_review_assignments(local: &Config) -> Vec<ReviewAssignmentChange> {
    local
        .teams
        .iter()
        .map(|(name, team)| {
            let mut settings = team.code_review_assignment.clone();
            let excluded: BTreeSet<String> = settings
                .excluded_members
                .drain(..)
                .map(|m| m.login)
                .chain(team.mentors.iter().cloned())
                .collect();
            ReviewAssignmentChange {
                team: name.clone(),
                settings,
                excluded: excluded.into_iter().collect(),
                globally_excluded: local.exclude_cra_from_all_teams.clone(),
            }
        })
        .collect()
}

impl ReviewAssignmentChange {
    /// The ids of every excluded member. Members missing from `members` are
    /// skipped; only the team specific ones deserve a warning.
    pub fn excluded_ids(&self, members: &BTreeMap<String, User>) -> Vec<String> {
        let mut ids = BTreeSet::new();
        for login in &self.excluded {
            match members.get(login) {
                Some(user) if !user.id.is_empty() => {
                    ids.insert(user.id.clone());
                }
                _ => warn!(
                    "member {login} excluded from the review assignment of team {} is not a known organization member",
                    self.team
                ),
            }
        }
        for login in &self.globally_excluded {
            if let Some(user) = members.get(login).filter(|u| !u.id.is_empty()) {
                ids.insert(user.id.clone());
            }
        }
        ids.into_iter().collect()
    }

    pub fn log(&self) {
        info!(
            "🔀 Review assignment of team '{}': enabled: {}, excluded: {}",
            self.team,
            self.settings.enabled,
            self.excluded
                .iter()
                .chain(&self.globally_excluded)
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}

/// Grant changes of one repository, as `(name, permission)` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryPermissionChange {
    pub repository: String,
    pub teams: SetChange<(String, RepoPermission)>,
    pub users: SetChange<(String, RepoPermission)>,
}

impl RepositoryPermissionChange {
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.users.is_empty()
    }

    pub fn log(&self) {
        info!("🔐 Repository '{}' permissions:", self.repository);
        for (kind, change) in [("team", &self.teams), ("user", &self.users)] {
            for (name, permission) in &change.remove {
                info!("  Removing {permission} from {kind} '{name}'");
            }
            for (name, permission) in &change.add {
                info!("  Granting {permission} to {kind} '{name}'");
            }
        }
    }
}

pub fn diff_repository_permissions(
    local: &Config,
    remote: &Config,
) -> Vec<RepositoryPermissionChange> {
    let mut changes = Vec::new();
    for (name, repo) in &local.repositories {
        let remote_repo = remote.repositories.get(name);
        let local_teams = grant_set(repo.team_grants());
        let local_users = grant_set(repo.user_grants());
        let remote_teams = remote_repo
            .map(|r| grant_set(r.team_grants()))
            .unwrap_or_default();
        let remote_users = remote_repo
            .map(|r| grant_set(r.user_grants()))
            .unwrap_or_default();
        let change = RepositoryPermissionChange {
            repository: name.clone(),
            teams: set_difference(&local_teams, &remote_teams),
            users: set_difference(&local_users, &remote_users),
        };
        if !change.is_empty() {
            changes.push(change);
        }
    }
    changes
}

fn grant_set<'a>(
    grants: impl Iterator<Item = (RepoPermission, &'a str)>,
) -> BTreeSet<(String, RepoPermission)> {
    grants
        .map(|(permission, name)| (name.to_string(), permission))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_difference_is_disjoint() {
        let local: BTreeSet<u32> = [1, 2, 3].into();
        let remote: BTreeSet<u32> = [3, 4].into();
        let change = set_difference(&local, &remote);
        assert_eq!(change.add, vec![1, 2]);
        assert_eq!(change.remove, vec![4]);
        assert!(change.add.iter().all(|x| !change.remove.contains(x)));
    }

    #[test]
    fn privacy_defaults() {
        assert_eq!(effective_privacy(None, None), TeamPrivacy::Secret);
        assert_eq!(effective_privacy(None, Some("eng")), TeamPrivacy::Visible);
        assert_eq!(
            effective_privacy(Some(TeamPrivacy::Visible), None),
            TeamPrivacy::Visible
        );
    }
}
