//! Applies the differences between the local configuration and the remote
//! state, stage by stage.
//!
//! Stages run in a fixed order: repository list check, organization
//! members, team existence, team settings, team membership, review
//! assignment and repository permissions. A failing mutation is logged and
//! the stage moves on to the next entity; only a cancellation aborts the
//! whole push.

use crate::github::api::{
    GithubRead, GithubWrite, NewTeam, ParentChange, ReviewAssignmentUpdate, TeamEdit, is_cancelled,
    slug,
};
use crate::github::pull::pull_configuration;
use crate::github::reconcile::{
    SetChange, check_repositories, diff_members, diff_repository_permissions, diff_team_membership,
    diff_team_settings, diff_teams, effective_privacy, plan_review_assignments,
};
use anyhow::{Context as _, anyhow};
use log::{error, info, warn};
use std::collections::BTreeSet;
use team_config::{Config, RepoPermission, sort_config};

/// Asks the operator before a stage mutates anything.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool>;
}

/// The parts of the configuration a push reconciles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stages {
    pub repositories: bool,
    pub members: bool,
    pub teams: bool,
}

impl Default for Stages {
    fn default() -> Self {
        Stages {
            repositories: true,
            members: true,
            teams: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Report every stage without applying any of them.
    pub dry_run: bool,
    /// Apply every stage without asking.
    pub force: bool,
    pub stages: Stages,
}

pub struct PushExecutor<'a> {
    read: &'a dyn GithubRead,
    write: &'a dyn GithubWrite,
    confirm: &'a dyn Confirm,
    options: PushOptions,
}

impl<'a> PushExecutor<'a> {
    pub fn new(
        read: &'a dyn GithubRead,
        write: &'a dyn GithubWrite,
        confirm: &'a dyn Confirm,
        options: PushOptions,
    ) -> Self {
        Self {
            read,
            write,
            confirm,
            options,
        }
    }

    /// Fetches the remote state of the organization and pushes `local` onto
    /// it. `local` picks up the identifiers and removals along the way.
    pub fn run(&self, local: &mut Config) -> anyhow::Result<()> {
        let remote = pull_configuration(self.read, &local.organization)
            .context("failed to fetch the remote configuration")?;
        self.push(local, &remote)?;
        sort_config(local);
        Ok(())
    }

    pub fn push(&self, local: &mut Config, remote: &Config) -> anyhow::Result<()> {
        let stages = self.options.stages;
        if stages.repositories {
            self.check_repositories(local, remote);
        }
        if stages.members {
            self.push_members(local, remote)?;
        }
        let mut deleted = BTreeSet::new();
        if stages.teams {
            deleted = self.push_teams(local, remote)?;
            self.push_team_settings(local, remote)?;
            self.push_team_membership(local, remote)?;
            self.push_review_assignments(local)?;
        }
        if stages.repositories {
            if deleted.is_empty() {
                self.push_repository_permissions(local, remote)?;
            } else {
                // Grants of deleted teams went away with the teams.
                let mut remote = remote.clone();
                for name in &deleted {
                    remote.revoke_team_grants(name);
                }
                self.push_repository_permissions(local, &remote)?;
            }
        }
        Ok(())
    }

    fn check_repositories(&self, local: &mut Config, remote: &Config) {
        let check = check_repositories(local, remote);
        check.log();
        check.apply(local, remote);
    }

    fn push_members(&self, local: &mut Config, remote: &Config) -> anyhow::Result<()> {
        for (login, user) in &mut local.members {
            if let Some(remote_user) = remote.members.get(login) {
                user.id.clone_from(&remote_user.id);
            }
        }

        let change = diff_members(local, remote);
        if change.is_empty() {
            return Ok(());
        }
        for login in &change.add {
            info!("➕ Inviting member '{login}'");
        }
        for login in &change.remove {
            info!("❌ Removing member '{login}'");
        }
        if !self.approved("Do you want to update the organization members?")? {
            return Ok(());
        }

        let org = local.organization.clone();
        let pending = self
            .read
            .pending_invitations(&org)
            .with_context(|| format!("failed to fetch the pending invitations of {org}"))?;
        for login in &change.add {
            if pending.contains(login) {
                info!("Skipping '{login}': an invitation is already pending");
                continue;
            }
            let invited = self.attempt(&format!("inviting '{login}'"), || {
                let user = self
                    .read
                    .user(login)?
                    .ok_or_else(|| anyhow!("user '{login}' does not exist"))?;
                self.write.invite_member(&org, user.rest_id)?;
                Ok(user)
            })?;
            if let (Some(user), Some(member)) = (invited, local.members.get_mut(login)) {
                if member.id.is_empty() {
                    member.id = user.id;
                    member.name = user.name;
                }
            }
        }
        for login in &change.remove {
            let removed = self.attempt(&format!("removing member '{login}'"), || {
                self.write.remove_member(&org, login)
            })?;
            if removed.is_some() {
                local.scrub_member(login);
            }
        }
        Ok(())
    }

    /// Creates and deletes teams, returning the deleted teams and the
    /// cascaded descendants that are no longer configured.
    fn push_teams(
        &self,
        local: &mut Config,
        remote: &Config,
    ) -> anyhow::Result<BTreeSet<String>> {
        for (name, team) in &mut local.teams {
            if let Some(remote_team) = remote.teams.get(name) {
                team.id.clone_from(&remote_team.id);
                team.rest_id = remote_team.rest_id;
            }
        }

        let mut removed = BTreeSet::new();
        let change = diff_teams(local, remote);
        if change.is_empty() {
            return Ok(removed);
        }
        change.log();
        if !self.approved("Do you want to create and delete teams?")? {
            return Ok(removed);
        }

        let org = local.organization.clone();
        for name in &change.delete {
            let deleted = self.attempt(&format!("deleting team '{name}'"), || {
                self.write.delete_team(&org, &slug(name))
            })?;
            if deleted.is_none() {
                continue;
            }
            local.revoke_team_grants(name);
            removed.insert(name.clone());
            for descendant in remote.descendants(name) {
                if local.teams.contains_key(&descendant) {
                    warn!("Team '{descendant}' was deleted along with '{name}' but is still configured");
                } else {
                    local.revoke_team_grants(&descendant);
                    removed.insert(descendant);
                }
            }
        }

        // Parents come first, so their ids are known once children get created.
        for name in &change.create {
            let Some(team) = local.teams.get(name) else {
                continue;
            };
            let parent_rest_id = match team.parent.as_deref() {
                None => None,
                Some(parent) => match local.teams.get(parent).map(|p| p.rest_id) {
                    Some(id) if id != 0 => Some(id),
                    _ => {
                        error!("Cannot create team '{name}': parent team '{parent}' does not exist");
                        continue;
                    }
                },
            };
            let new_team = NewTeam {
                name: name.clone(),
                description: team.description.clone(),
                privacy: effective_privacy(team.privacy, team.parent.as_deref()),
                parent_rest_id,
            };
            let created = self.attempt(&format!("creating team '{name}'"), || {
                self.write.create_team(&org, &new_team)
            })?;
            if let (Some(created), Some(team)) = (created, local.teams.get_mut(name)) {
                team.id = created.id;
                team.rest_id = created.rest_id;
            }
        }
        Ok(removed)
    }

    fn push_team_settings(&self, local: &Config, remote: &Config) -> anyhow::Result<()> {
        let changes = diff_team_settings(local, remote);
        if changes.is_empty() {
            return Ok(());
        }
        for change in &changes {
            change.log();
        }
        if !self.approved("Do you want to update the team settings?")? {
            return Ok(());
        }

        for change in changes {
            let parent = match &change.parent_diff {
                None => None,
                Some((_, None)) => Some(ParentChange::Remove),
                Some((_, Some(parent))) => match local.teams.get(parent).map(|p| p.rest_id) {
                    Some(id) if id != 0 => Some(ParentChange::Set(id)),
                    _ => {
                        error!(
                            "Cannot move team '{}' under '{parent}': the parent team does not exist",
                            change.team
                        );
                        continue;
                    }
                },
            };
            let edit = TeamEdit {
                description: change.description_diff.map(|(_, new)| new),
                privacy: change.privacy_diff.map(|(_, new)| new),
                parent,
            };
            self.attempt(&format!("editing team '{}'", change.team), || {
                self.write
                    .edit_team(&local.organization, &slug(&change.team), &edit)
            })?;
        }
        Ok(())
    }

    fn push_team_membership(&self, local: &Config, remote: &Config) -> anyhow::Result<()> {
        let has_new_teams = local.teams.keys().any(|name| !remote.teams.contains_key(name));
        let authenticated_user = if has_new_teams {
            self.read
                .authenticated_user()
                .context("failed to fetch the authenticated user")?
        } else {
            String::new()
        };

        let changes = diff_team_membership(local, remote, &authenticated_user);
        if changes.is_empty() {
            return Ok(());
        }
        for change in &changes {
            change.log();
        }
        if !self.approved("Do you want to update the team memberships?")? {
            return Ok(());
        }

        let org = &local.organization;
        for change in &changes {
            let team_slug = slug(&change.team);
            for login in &change.members.add {
                self.attempt(&format!("adding '{login}' to team '{}'", change.team), || {
                    self.write.add_team_member(org, &team_slug, login)
                })?;
            }
            for login in &change.members.remove {
                self.attempt(
                    &format!("removing '{login}' from team '{}'", change.team),
                    || self.write.remove_team_member(org, &team_slug, login),
                )?;
            }
        }
        Ok(())
    }

    fn push_review_assignments(&self, local: &Config) -> anyhow::Result<()> {
        let plans = plan_review_assignments(local);
        if plans.is_empty() {
            return Ok(());
        }
        for plan in &plans {
            plan.log();
        }
        if !self.approved("Do you want to update CodeReviewAssignments?")? {
            return Ok(());
        }

        for plan in &plans {
            let team_id = local
                .teams
                .get(&plan.team)
                .map(|t| t.id.as_str())
                .unwrap_or_default();
            if team_id.is_empty() {
                warn!("Skipping the review assignment of team '{}': unknown team id", plan.team);
                continue;
            }
            let settings = &plan.settings;
            let update = ReviewAssignmentUpdate {
                enabled: settings.enabled,
                algorithm: settings.algorithm,
                excluded_member_ids: plan.excluded_ids(&local.members),
                notify_team: settings.notify_team,
                team_member_count: settings.team_member_count,
                include_child_team_members: settings.include_child_team_members,
            };
            self.attempt(
                &format!("updating the review assignment of team '{}'", plan.team),
                || self.write.update_review_assignment(team_id, &update),
            )?;
        }
        Ok(())
    }

    fn push_repository_permissions(&self, local: &Config, remote: &Config) -> anyhow::Result<()> {
        let org = &local.organization;
        for change in diff_repository_permissions(local, remote) {
            change.log();
            let prompt = format!(
                "Do you want to update the permissions of repository '{}'?",
                change.repository
            );
            if !self.approved(&prompt)? {
                continue;
            }
            let repo = change.repository.as_str();

            for team in removed_grantees(&change.teams) {
                self.attempt(&format!("removing team '{team}' from '{repo}'"), || {
                    self.write.remove_team_repo(org, &slug(team), repo)
                })?;
            }
            for (team, permission) in &change.teams.add {
                self.attempt(
                    &format!("granting {permission} on '{repo}' to team '{team}'"),
                    || {
                        self.write
                            .set_team_repo_permission(org, &slug(team), repo, *permission)
                    },
                )?;
            }
            for login in removed_grantees(&change.users) {
                self.attempt(&format!("removing '{login}' from '{repo}'"), || {
                    self.write.remove_collaborator(org, repo, login)
                })?;
            }
            for (login, permission) in &change.users.add {
                self.attempt(
                    &format!("granting {permission} on '{repo}' to '{login}'"),
                    || {
                        self.write
                            .set_collaborator_permission(org, repo, login, *permission)
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Whether a stage may apply its changes.
    fn approved(&self, prompt: &str) -> anyhow::Result<bool> {
        if self.options.dry_run {
            info!("Dry run: not applying these changes");
            return Ok(false);
        }
        if self.options.force {
            return Ok(true);
        }
        let approved = self.confirm.confirm(prompt)?;
        if !approved {
            info!("Skipping");
        }
        Ok(approved)
    }

    /// Runs one mutation. Failures are logged and swallowed so the stage can
    /// carry on, except for cancellation.
    fn attempt<T>(
        &self,
        what: &str,
        op: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<Option<T>> {
        match op() {
            Ok(value) => Ok(Some(value)),
            Err(err) if is_cancelled(&err) => Err(err),
            Err(err) => {
                error!("{what} failed: {err:#}");
                Ok(None)
            }
        }
    }
}

/// Grantees losing their grant. A grantee whose permission merely changes is
/// left alone, setting the new permission replaces the old one.
fn removed_grantees(change: &SetChange<(String, RepoPermission)>) -> Vec<&str> {
    change
        .remove
        .iter()
        .filter(|(name, _)| !change.add.iter().any(|(added, _)| added == name))
        .map(|(name, _)| name.as_str())
        .collect()
}
