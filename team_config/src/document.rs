//! The persisted shape of a [`Config`].
//!
//! On disk teams are nested under their parent through `children`, and the
//! grants of a repository are split between `teams` and `users`, each keyed
//! by permission name.

use crate::model::{
    CodeReviewAssignment, Config, Grantee, OutsideCollaborator, RepoPermission, Repository, Team,
    TeamPrivacy, User,
};
use anyhow::{Context as _, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDocument {
    #[serde(default)]
    organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slack_workspace: Option<String>,
    #[serde(
        default,
        rename = "excludeCodeReviewAssignmentFromAllTeams",
        skip_serializing_if = "Vec::is_empty"
    )]
    exclude_cra_from_all_teams: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    repositories: BTreeMap<String, RepositoryDocument>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    members: BTreeMap<String, User>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    outside_collaborators: BTreeMap<String, OutsideCollaborator>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    teams: BTreeMap<String, TeamDocument>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepositoryDocument {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    teams: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    users: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamDocument {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "restID")]
    rest_id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    mentors: Vec<String>,
    #[serde(default, skip_serializing_if = "CodeReviewAssignment::is_default")]
    code_review_assignment: CodeReviewAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    privacy: Option<TeamPrivacy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, TeamDocument>,
}

impl ConfigDocument {
    pub(crate) fn into_config(self) -> anyhow::Result<Config> {
        let mut teams = BTreeMap::new();
        for (name, doc) in self.teams {
            flatten_team(&mut teams, name, doc, None)?;
        }

        let mut repositories = BTreeMap::new();
        for (name, doc) in self.repositories {
            let repo = doc
                .into_repository()
                .with_context(|| format!("invalid permissions of repository {name}"))?;
            repositories.insert(name, repo);
        }

        Ok(Config {
            organization: self.organization,
            slack_workspace: self.slack_workspace,
            members: self.members,
            outside_collaborators: self.outside_collaborators,
            teams,
            repositories,
            exclude_cra_from_all_teams: self.exclude_cra_from_all_teams,
        })
    }

    pub(crate) fn from_config(cfg: &Config) -> ConfigDocument {
        let children = cfg.children_map();
        let mut placed = BTreeSet::new();
        let mut teams = BTreeMap::new();
        for root in cfg.roots() {
            teams.insert(
                root.to_string(),
                nest_team(cfg, &children, root, &mut placed),
            );
        }
        // Teams caught in a parent cycle are unreachable from any root.
        for name in cfg.teams.keys() {
            if !placed.contains(name.as_str()) {
                teams.insert(name.clone(), nest_team(cfg, &children, name, &mut placed));
            }
        }

        ConfigDocument {
            organization: cfg.organization.clone(),
            slack_workspace: cfg.slack_workspace.clone(),
            exclude_cra_from_all_teams: cfg.exclude_cra_from_all_teams.clone(),
            repositories: cfg
                .repositories
                .iter()
                .map(|(name, repo)| (name.clone(), RepositoryDocument::from_repository(repo)))
                .collect(),
            members: cfg.members.clone(),
            outside_collaborators: cfg.outside_collaborators.clone(),
            teams,
        }
    }
}

fn flatten_team(
    teams: &mut BTreeMap<String, Team>,
    name: String,
    doc: TeamDocument,
    parent: Option<String>,
) -> anyhow::Result<()> {
    if teams.contains_key(&name) {
        bail!("team {name} is declared more than once");
    }
    let team = Team {
        id: doc.id,
        rest_id: doc.rest_id,
        description: doc.description,
        members: doc.members,
        mentors: doc.mentors,
        code_review_assignment: doc.code_review_assignment,
        privacy: doc.privacy,
        parent,
    };
    teams.insert(name.clone(), team);
    for (child, child_doc) in doc.children {
        flatten_team(teams, child, child_doc, Some(name.clone()))?;
    }
    Ok(())
}

fn nest_team<'a>(
    cfg: &'a Config,
    children: &BTreeMap<&'a str, Vec<&'a str>>,
    name: &'a str,
    placed: &mut BTreeSet<&'a str>,
) -> TeamDocument {
    placed.insert(name);
    let mut doc = match cfg.teams.get(name) {
        Some(team) => TeamDocument {
            id: team.id.clone(),
            rest_id: team.rest_id,
            description: team.description.clone(),
            members: team.members.clone(),
            mentors: team.mentors.clone(),
            code_review_assignment: team.code_review_assignment.clone(),
            privacy: team.privacy,
            children: BTreeMap::new(),
        },
        None => TeamDocument::default(),
    };
    for child in children.get(name).into_iter().flatten() {
        if placed.contains(child) {
            continue;
        }
        let child_doc = nest_team(cfg, children, child, placed);
        doc.children.insert(child.to_string(), child_doc);
    }
    doc
}

impl RepositoryDocument {
    fn into_repository(self) -> anyhow::Result<Repository> {
        let mut repo = Repository::default();
        for (perm, names) in self.teams {
            let perm: RepoPermission = perm.parse()?;
            for name in names {
                repo.grant(perm, Grantee::Team(name));
            }
        }
        for (perm, logins) in self.users {
            let perm: RepoPermission = perm.parse()?;
            for login in logins {
                repo.grant(perm, Grantee::User(login));
            }
        }
        Ok(repo)
    }

    fn from_repository(repo: &Repository) -> RepositoryDocument {
        let mut doc = RepositoryDocument::default();
        for (perm, name) in repo.team_grants() {
            doc.teams
                .entry(perm.graphql_name().to_string())
                .or_default()
                .push(name.to_string());
        }
        for (perm, login) in repo.user_grants() {
            doc.users
                .entry(perm.graphql_name().to_string())
                .or_default()
                .push(login.to_string());
        }
        doc
    }
}
