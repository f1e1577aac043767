//! Builds a [`Config`] out of the live state of an organization.

use crate::github::api::{
    Collaborator, GithubRead, Page, RepositoryNode, TeamMembersNode, TeamRepositoriesNode,
    TeamRepository,
};
use crate::github::paginate::{Nested, walk_flat, walk_nested};
use anyhow::Context as _;
use log::{debug, warn};
use std::mem;
use team_config::{CodeReviewAssignment, Config, Grantee, Team, User, sort_config};

impl Nested for TeamMembersNode {
    type Item = String;

    fn node_id(&self) -> &str {
        &self.id
    }

    fn take_inner(&mut self) -> Page<String> {
        mem::take(&mut self.members)
    }
}

impl Nested for TeamRepositoriesNode {
    type Item = TeamRepository;

    fn node_id(&self) -> &str {
        &self.id
    }

    fn take_inner(&mut self) -> Page<TeamRepository> {
        mem::take(&mut self.repositories)
    }
}

impl Nested for RepositoryNode {
    type Item = Collaborator;

    fn node_id(&self) -> &str {
        &self.id
    }

    fn take_inner(&mut self) -> Page<Collaborator> {
        mem::take(&mut self.collaborators)
    }
}

/// Fetches members, teams, team memberships and repository permissions of
/// `org`.
///
/// Mentors and review assignment exclusions are not exposed by the platform
/// and are always left empty.
pub fn pull_configuration(github: &dyn GithubRead, org: &str) -> anyhow::Result<Config> {
    let mut config = Config {
        organization: org.to_string(),
        ..Config::default()
    };

    let members = walk_flat(|cursor| github.org_members(org, cursor))
        .with_context(|| format!("failed to fetch the members of {org}"))?;
    debug!("Fetched {} members of {org}", members.len());
    for member in members {
        config.members.insert(
            member.login,
            User {
                id: member.id,
                name: member.name,
                ..User::default()
            },
        );
    }

    walk_nested(
        |cursor, inner| github.org_team_members(org, cursor, inner),
        |node: &TeamMembersNode, logins| {
            let team = config
                .teams
                .entry(node.name.clone())
                .or_insert_with(|| team_from_node(node));
            team.members.extend(logins);
            Ok(())
        },
    )
    .with_context(|| format!("failed to fetch the teams of {org}"))?;
    debug!("Fetched {} teams of {org}", config.teams.len());

    walk_nested(
        |cursor, inner| github.org_repositories(org, cursor, inner),
        |node: &RepositoryNode, collaborators| {
            let repo = config.repositories.entry(node.name.clone()).or_default();
            for collaborator in collaborators {
                match collaborator.permission {
                    Some(permission) => repo.grant(permission, Grantee::User(collaborator.login)),
                    None => warn!(
                        "Skipping collaborator {} of {}: unknown permission",
                        collaborator.login, node.name
                    ),
                }
            }
            Ok(())
        },
    )
    .with_context(|| format!("failed to fetch the repositories of {org}"))?;

    walk_nested(
        |cursor, inner| github.org_team_repositories(org, cursor, inner),
        |node: &TeamRepositoriesNode, repositories| {
            for repository in repositories {
                let Some(permission) = repository.permission else {
                    warn!(
                        "Skipping the grant of team {} on {}: unknown permission",
                        node.name, repository.name
                    );
                    continue;
                };
                config
                    .repositories
                    .entry(repository.name)
                    .or_default()
                    .grant(permission, Grantee::Team(node.name.clone()));
            }
            Ok(())
        },
    )
    .with_context(|| format!("failed to fetch the team permissions of {org}"))?;
    debug!("Fetched {} repositories of {org}", config.repositories.len());

    sort_config(&mut config);
    Ok(config)
}

fn team_from_node(node: &TeamMembersNode) -> Team {
    let review = &node.review;
    let code_review_assignment = if review.enabled {
        CodeReviewAssignment {
            algorithm: review.algorithm,
            enabled: true,
            notify_team: review.notify_team,
            team_member_count: review.member_count,
            ..CodeReviewAssignment::default()
        }
    } else {
        CodeReviewAssignment::default()
    };
    Team {
        id: node.id.clone(),
        rest_id: node.rest_id,
        description: node.description.clone(),
        privacy: Some(node.privacy),
        parent: node.parent.clone(),
        code_review_assignment,
        ..Team::default()
    }
}
