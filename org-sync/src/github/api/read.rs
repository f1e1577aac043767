use crate::github::api::{
    Collaborator, GitHubUrl, GraphEdges, GraphNodes, HttpClient, OrgMember, Page, RemoteTeam,
    RemoteUser, RepositoryNode, ReviewSettings, TeamMembersNode, TeamRepositoriesNode,
    TeamRepository,
};
use anyhow::Context as _;
use reqwest::Method;
use std::collections::BTreeSet;
use team_config::{RepoPermission, ReviewAlgorithm, TeamPrivacy};

pub trait GithubRead {
    /// The login the mutations are performed as.
    fn authenticated_user(&self) -> anyhow::Result<String>;

    /// One page of the organization members
    fn org_members(&self, org: &str, cursor: Option<&str>) -> anyhow::Result<Page<OrgMember>>;

    /// One page of the organization repositories, with the page of direct
    /// collaborators starting at `collaborators_cursor` for each of them
    fn org_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        collaborators_cursor: Option<&str>,
    ) -> anyhow::Result<Page<RepositoryNode>>;

    /// One page of the organization teams, with the page of repositories
    /// starting at `repositories_cursor` for each of them
    fn org_team_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        repositories_cursor: Option<&str>,
    ) -> anyhow::Result<Page<TeamRepositoriesNode>>;

    /// One page of the organization teams, with the page of immediate
    /// members starting at `members_cursor` for each of them
    fn org_team_members(
        &self,
        org: &str,
        cursor: Option<&str>,
        members_cursor: Option<&str>,
    ) -> anyhow::Result<Page<TeamMembersNode>>;

    /// Logins holding a pending invitation to the organization
    fn pending_invitations(&self, org: &str) -> anyhow::Result<BTreeSet<String>>;

    /// Whether the user marked themselves as having limited availability
    fn limited_availability(&self, login: &str) -> anyhow::Result<bool>;

    fn user(&self, login: &str) -> anyhow::Result<Option<RemoteUser>>;

    fn team(&self, org: &str, slug: &str) -> anyhow::Result<Option<RemoteTeam>>;
}

pub struct GitHubApiRead {
    client: HttpClient,
    app_slug: Option<String>,
}

impl GitHubApiRead {
    /// `app_slug` is the identity of the GitHub App owning the token, if any.
    pub fn from_client(client: HttpClient, app_slug: Option<String>) -> anyhow::Result<Self> {
        Ok(Self { client, app_slug })
    }
}

#[derive(serde::Serialize)]
struct NestedParams<'a> {
    org: &'a str,
    cursor: Option<&'a str>,
    inner: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct Organization<T> {
    organization: T,
}

impl GithubRead for GitHubApiRead {
    fn authenticated_user(&self) -> anyhow::Result<String> {
        if let Some(slug) = &self.app_slug {
            return Ok(slug.clone());
        }
        #[derive(serde::Deserialize)]
        struct Data {
            viewer: Viewer,
        }
        #[derive(serde::Deserialize)]
        struct Viewer {
            login: String,
        }
        let data: Data = self
            .client
            .graphql("query { viewer { login } }", serde_json::json!({}))?;
        Ok(data.viewer.login)
    }

    fn org_members(&self, org: &str, cursor: Option<&str>) -> anyhow::Result<Page<OrgMember>> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Members {
            members_with_role: GraphNodes<Member>,
        }
        #[derive(serde::Deserialize)]
        struct Member {
            id: String,
            login: String,
            name: Option<String>,
        }
        #[derive(serde::Serialize)]
        struct Params<'a> {
            org: &'a str,
            cursor: Option<&'a str>,
        }
        static QUERY: &str = "
            query($org: String!, $cursor: String) {
                organization(login: $org) {
                    membersWithRole(first: 100, after: $cursor) {
                        pageInfo {
                            endCursor
                            hasNextPage
                        }
                        nodes {
                            id
                            login
                            name
                        }
                    }
                }
            }
        ";

        let res: Organization<Members> = self.client.graphql(QUERY, Params { org, cursor })?;
        Ok(res
            .organization
            .members_with_role
            .into_page(|member| OrgMember {
                id: member.id,
                login: member.login,
                name: member.name.unwrap_or_default(),
            }))
    }

    fn org_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        collaborators_cursor: Option<&str>,
    ) -> anyhow::Result<Page<RepositoryNode>> {
        #[derive(serde::Deserialize)]
        struct Repositories {
            repositories: GraphNodes<Repository>,
        }
        #[derive(serde::Deserialize)]
        struct Repository {
            id: String,
            name: String,
            collaborators: Option<GraphEdges<CollaboratorEdge>>,
        }
        #[derive(serde::Deserialize)]
        struct CollaboratorEdge {
            permission: Option<RepoPermission>,
            node: Login,
        }
        static QUERY: &str = "
            query($org: String!, $cursor: String, $inner: String) {
                organization(login: $org) {
                    repositories(first: 100, after: $cursor) {
                        pageInfo {
                            endCursor
                            hasNextPage
                        }
                        nodes {
                            id
                            name
                            collaborators(first: 100, after: $inner, affiliation: DIRECT) {
                                pageInfo {
                                    endCursor
                                    hasNextPage
                                }
                                edges {
                                    permission
                                    node {
                                        login
                                    }
                                }
                            }
                        }
                    }
                }
            }
        ";

        let res: Organization<Repositories> = self.client.graphql(
            QUERY,
            NestedParams {
                org,
                cursor,
                inner: collaborators_cursor,
            },
        )?;
        Ok(res.organization.repositories.into_page(|repo| RepositoryNode {
            id: repo.id,
            name: repo.name,
            collaborators: repo
                .collaborators
                .map(|c| {
                    c.into_page(|edge| Collaborator {
                        login: edge.node.login,
                        permission: edge.permission,
                    })
                })
                .unwrap_or_default(),
        }))
    }

    fn org_team_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        repositories_cursor: Option<&str>,
    ) -> anyhow::Result<Page<TeamRepositoriesNode>> {
        #[derive(serde::Deserialize)]
        struct Teams {
            teams: GraphNodes<Team>,
        }
        #[derive(serde::Deserialize)]
        struct Team {
            id: String,
            name: String,
            repositories: GraphEdges<RepositoryEdge>,
        }
        #[derive(serde::Deserialize)]
        struct RepositoryEdge {
            permission: Option<RepoPermission>,
            node: Name,
        }
        #[derive(serde::Deserialize)]
        struct Name {
            name: String,
        }
        static QUERY: &str = "
            query($org: String!, $cursor: String, $inner: String) {
                organization(login: $org) {
                    teams(first: 2, after: $cursor) {
                        pageInfo {
                            endCursor
                            hasNextPage
                        }
                        nodes {
                            id
                            name
                            repositories(first: 100, after: $inner) {
                                pageInfo {
                                    endCursor
                                    hasNextPage
                                }
                                edges {
                                    permission
                                    node {
                                        name
                                    }
                                }
                            }
                        }
                    }
                }
            }
        ";

        let res: Organization<Teams> = self.client.graphql(
            QUERY,
            NestedParams {
                org,
                cursor,
                inner: repositories_cursor,
            },
        )?;
        Ok(res.organization.teams.into_page(|team| TeamRepositoriesNode {
            id: team.id,
            name: team.name,
            repositories: team.repositories.into_page(|edge| TeamRepository {
                name: edge.node.name,
                permission: edge.permission,
            }),
        }))
    }

    fn org_team_members(
        &self,
        org: &str,
        cursor: Option<&str>,
        members_cursor: Option<&str>,
    ) -> anyhow::Result<Page<TeamMembersNode>> {
        #[derive(serde::Deserialize)]
        struct Teams {
            teams: GraphNodes<Team>,
        }
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Team {
            id: String,
            database_id: u64,
            name: String,
            description: Option<String>,
            privacy: TeamPrivacy,
            parent_team: Option<Name>,
            review_request_delegation_enabled: bool,
            review_request_delegation_algorithm: Option<ReviewAlgorithm>,
            review_request_delegation_member_count: Option<u32>,
            review_request_delegation_notify_team: bool,
            members: GraphNodes<Login>,
        }
        #[derive(serde::Deserialize)]
        struct Name {
            name: String,
        }
        static QUERY: &str = "
            query($org: String!, $cursor: String, $inner: String) {
                organization(login: $org) {
                    teams(first: 30, after: $cursor) {
                        pageInfo {
                            endCursor
                            hasNextPage
                        }
                        nodes {
                            id
                            databaseId
                            name
                            description
                            privacy
                            parentTeam {
                                name
                            }
                            reviewRequestDelegationEnabled
                            reviewRequestDelegationAlgorithm
                            reviewRequestDelegationMemberCount
                            reviewRequestDelegationNotifyTeam
                            members(first: 50, after: $inner, membership: IMMEDIATE) {
                                pageInfo {
                                    endCursor
                                    hasNextPage
                                }
                                nodes {
                                    login
                                }
                            }
                        }
                    }
                }
            }
        ";

        let res: Organization<Teams> = self.client.graphql(
            QUERY,
            NestedParams {
                org,
                cursor,
                inner: members_cursor,
            },
        )?;
        Ok(res.organization.teams.into_page(|team| TeamMembersNode {
            id: team.id,
            rest_id: team.database_id,
            name: team.name,
            description: team.description.unwrap_or_default(),
            privacy: team.privacy,
            parent: team.parent_team.map(|p| p.name),
            review: ReviewSettings {
                enabled: team.review_request_delegation_enabled,
                algorithm: team.review_request_delegation_algorithm,
                member_count: team.review_request_delegation_member_count.unwrap_or(0),
                notify_team: team.review_request_delegation_notify_team,
            },
            members: team.members.into_page(|member| member.login),
        }))
    }

    fn pending_invitations(&self, org: &str) -> anyhow::Result<BTreeSet<String>> {
        #[derive(serde::Deserialize)]
        struct Invitation {
            login: Option<String>,
        }
        let mut invites = BTreeSet::new();
        self.client.rest_paginated(
            &Method::GET,
            &GitHubUrl::orgs(org, "invitations")?,
            |resp: Vec<Invitation>| {
                invites.extend(resp.into_iter().filter_map(|i| i.login));
                Ok(())
            },
        )?;
        Ok(invites)
    }

    fn limited_availability(&self, login: &str) -> anyhow::Result<bool> {
        #[derive(serde::Deserialize)]
        struct Data {
            user: Option<User>,
        }
        #[derive(serde::Deserialize)]
        struct User {
            status: Option<Status>,
        }
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Status {
            indicates_limited_availability: bool,
        }
        #[derive(serde::Serialize)]
        struct Params<'a> {
            login: &'a str,
        }
        static QUERY: &str = "
            query($login: String!) {
                user(login: $login) {
                    status {
                        indicatesLimitedAvailability
                    }
                }
            }
        ";

        let data: Data = self
            .client
            .graphql(QUERY, Params { login })
            .with_context(|| format!("failed to get the status of {login}"))?;
        Ok(data
            .user
            .and_then(|u| u.status)
            .is_some_and(|s| s.indicates_limited_availability))
    }

    fn user(&self, login: &str) -> anyhow::Result<Option<RemoteUser>> {
        #[derive(serde::Deserialize)]
        struct User {
            node_id: String,
            id: u64,
            login: String,
            name: Option<String>,
        }
        let user: Option<User> = self
            .client
            .send_option(Method::GET, &GitHubUrl::new(format!("users/{login}")))?;
        Ok(user.map(|u| RemoteUser {
            id: u.node_id,
            rest_id: u.id,
            login: u.login,
            name: u.name.unwrap_or_default(),
        }))
    }

    fn team(&self, org: &str, slug: &str) -> anyhow::Result<Option<RemoteTeam>> {
        #[derive(serde::Deserialize)]
        struct Team {
            node_id: String,
            id: u64,
            name: String,
            slug: String,
        }
        let team: Option<Team> = self
            .client
            .send_option(Method::GET, &GitHubUrl::orgs(org, &format!("teams/{slug}"))?)?;
        Ok(team.map(|t| RemoteTeam {
            id: t.node_id,
            rest_id: t.id,
            name: t.name,
            slug: t.slug,
        }))
    }
}

/// An object with a `login` field
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
struct Login {
    login: String,
}
