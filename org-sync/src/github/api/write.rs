use crate::github::api::{
    CreatedTeam, GitHubUrl, HttpClient, NewTeam, ParentChange, ReviewAssignmentUpdate, TeamEdit,
};
use crate::utils::ResponseExt;
use log::debug;
use reqwest::Method;
use team_config::RepoPermission;

pub trait GithubWrite {
    /// Invite a user, by REST id, to join the organization
    fn invite_member(&self, org: &str, user_rest_id: u64) -> anyhow::Result<()>;

    /// Remove a member from an org
    fn remove_member(&self, org: &str, login: &str) -> anyhow::Result<()>;

    fn create_team(&self, org: &str, team: &NewTeam) -> anyhow::Result<CreatedTeam>;

    fn edit_team(&self, org: &str, slug: &str, edit: &TeamEdit) -> anyhow::Result<()>;

    /// Delete a team; its child teams go with it
    fn delete_team(&self, org: &str, slug: &str) -> anyhow::Result<()>;

    fn add_team_member(&self, org: &str, slug: &str, login: &str) -> anyhow::Result<()>;

    fn remove_team_member(&self, org: &str, slug: &str, login: &str) -> anyhow::Result<()>;

    /// Replace the review assignment settings of a team, by GraphQL id
    fn update_review_assignment(
        &self,
        team_id: &str,
        update: &ReviewAssignmentUpdate,
    ) -> anyhow::Result<()>;

    fn set_team_repo_permission(
        &self,
        org: &str,
        slug: &str,
        repo: &str,
        permission: RepoPermission,
    ) -> anyhow::Result<()>;

    fn remove_team_repo(&self, org: &str, slug: &str, repo: &str) -> anyhow::Result<()>;

    fn set_collaborator_permission(
        &self,
        org: &str,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) -> anyhow::Result<()>;

    fn remove_collaborator(&self, org: &str, repo: &str, login: &str) -> anyhow::Result<()>;
}

pub struct GitHubApiWrite {
    client: HttpClient,
}

impl GitHubApiWrite {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl GithubWrite for GitHubApiWrite {
    fn invite_member(&self, org: &str, user_rest_id: u64) -> anyhow::Result<()> {
        #[derive(serde::Serialize, Debug)]
        struct Req {
            invitee_id: u64,
        }
        debug!("Inviting user {user_rest_id} to '{org}'");
        self.client.send(
            Method::POST,
            &GitHubUrl::orgs(org, "invitations")?,
            &Req {
                invitee_id: user_rest_id,
            },
        )?;
        Ok(())
    }

    fn remove_member(&self, org: &str, login: &str) -> anyhow::Result<()> {
        debug!("Removing user {login} from org {org}");
        self.client
            .delete(&GitHubUrl::orgs(org, &format!("members/{login}"))?)
    }

    fn create_team(&self, org: &str, team: &NewTeam) -> anyhow::Result<CreatedTeam> {
        #[derive(serde::Serialize, Debug)]
        struct Req<'a> {
            name: &'a str,
            description: &'a str,
            privacy: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            parent_team_id: Option<u64>,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            node_id: String,
            id: u64,
            slug: String,
        }
        let req = Req {
            name: &team.name,
            description: &team.description,
            privacy: team.privacy.rest_name(),
            parent_team_id: team.parent_rest_id,
        };
        debug!("Creating team '{}' in '{org}' with {req:?}", team.name);
        let resp: Resp = self
            .client
            .send(Method::POST, &GitHubUrl::orgs(org, "teams")?, &req)?
            .json_annotated()?;
        Ok(CreatedTeam {
            id: resp.node_id,
            rest_id: resp.id,
            slug: resp.slug,
        })
    }

    fn edit_team(&self, org: &str, slug: &str, edit: &TeamEdit) -> anyhow::Result<()> {
        let mut req = serde_json::Map::new();
        if let Some(description) = &edit.description {
            req.insert("description".into(), description.clone().into());
        }
        if let Some(privacy) = edit.privacy {
            req.insert("privacy".into(), privacy.rest_name().into());
        }
        match edit.parent {
            Some(ParentChange::Set(id)) => {
                req.insert("parent_team_id".into(), id.into());
            }
            Some(ParentChange::Remove) => {
                req.insert("parent_team_id".into(), serde_json::Value::Null);
            }
            None => {}
        }
        let req = serde_json::Value::Object(req);
        debug!("Editing team '{slug}' in '{org}' with request: {req}");
        self.client.send(
            Method::PATCH,
            &GitHubUrl::orgs(org, &format!("teams/{slug}"))?,
            &req,
        )?;
        Ok(())
    }

    fn delete_team(&self, org: &str, slug: &str) -> anyhow::Result<()> {
        debug!("Deleting team with slug '{slug}' in '{org}'");
        self.client
            .delete(&GitHubUrl::orgs(org, &format!("teams/{slug}"))?)
    }

    fn add_team_member(&self, org: &str, slug: &str, login: &str) -> anyhow::Result<()> {
        #[derive(serde::Serialize, Debug)]
        struct Req {
            role: &'static str,
        }
        debug!("Adding '{login}' to team '{slug}' in org '{org}'");
        self.client.send(
            Method::PUT,
            &GitHubUrl::orgs(org, &format!("teams/{slug}/memberships/{login}"))?,
            &Req { role: "member" },
        )?;
        Ok(())
    }

    fn remove_team_member(&self, org: &str, slug: &str, login: &str) -> anyhow::Result<()> {
        debug!("Removing membership of '{login}' from team '{slug}' in org '{org}'");
        self.client.delete(&GitHubUrl::orgs(
            org,
            &format!("teams/{slug}/memberships/{login}"),
        )?)
    }

    fn update_review_assignment(
        &self,
        team_id: &str,
        update: &ReviewAssignmentUpdate,
    ) -> anyhow::Result<()> {
        #[derive(serde::Serialize, Debug)]
        #[serde(rename_all = "camelCase")]
        struct Params<'a> {
            id: &'a str,
            enabled: bool,
            algorithm: Option<&'static str>,
            excluded_team_member_ids: &'a [String],
            notify_team: bool,
            team_member_count: u32,
            include_child_team_members: Option<bool>,
        }
        static QUERY: &str = "
            mutation($id: ID!, $enabled: Boolean!, $algorithm: TeamReviewAssignmentAlgorithm, $excludedTeamMemberIds: [ID!], $notifyTeam: Boolean, $teamMemberCount: Int, $includeChildTeamMembers: Boolean) {
                updateTeamReviewAssignment(input: {
                    id: $id,
                    enabled: $enabled,
                    algorithm: $algorithm,
                    excludedTeamMemberIds: $excludedTeamMemberIds,
                    notifyTeam: $notifyTeam,
                    teamMemberCount: $teamMemberCount,
                    includeChildTeamMembers: $includeChildTeamMembers
                }) {
                    team {
                        id
                    }
                }
            }
        ";
        let params = Params {
            id: team_id,
            enabled: update.enabled,
            algorithm: update.algorithm.map(|a| a.graphql_name()),
            excluded_team_member_ids: &update.excluded_member_ids,
            notify_team: update.notify_team,
            team_member_count: update.team_member_count,
            include_child_team_members: update.include_child_team_members,
        };
        debug!("Updating review assignment of team {team_id} with {params:?}");
        let _: serde_json::Value = self.client.graphql(QUERY, params)?;
        Ok(())
    }

    fn set_team_repo_permission(
        &self,
        org: &str,
        slug: &str,
        repo: &str,
        permission: RepoPermission,
    ) -> anyhow::Result<()> {
        #[derive(serde::Serialize, Debug)]
        struct Req {
            permission: &'static str,
        }
        debug!("Updating permission for team {slug} on {org}/{repo} to {permission}");
        self.client.send(
            Method::PUT,
            &GitHubUrl::orgs(org, &format!("teams/{slug}/repos/{org}/{repo}"))?,
            &Req {
                permission: permission.rest_name(),
            },
        )?;
        Ok(())
    }

    fn remove_team_repo(&self, org: &str, slug: &str, repo: &str) -> anyhow::Result<()> {
        debug!("Removing team {slug} from repo {org}/{repo}");
        self.client.delete(&GitHubUrl::orgs(
            org,
            &format!("teams/{slug}/repos/{org}/{repo}"),
        )?)
    }

    fn set_collaborator_permission(
        &self,
        org: &str,
        repo: &str,
        login: &str,
        permission: RepoPermission,
    ) -> anyhow::Result<()> {
        #[derive(serde::Serialize, Debug)]
        struct Req {
            permission: &'static str,
        }
        debug!("Updating permission for user {login} on {org}/{repo} to {permission}");
        self.client.send(
            Method::PUT,
            &GitHubUrl::repos(org, repo, &format!("collaborators/{login}"))?,
            &Req {
                permission: permission.rest_name(),
            },
        )?;
        Ok(())
    }

    fn remove_collaborator(&self, org: &str, repo: &str, login: &str) -> anyhow::Result<()> {
        debug!("Removing collaborator {login} from repo {org}/{repo}");
        self.client.delete(&GitHubUrl::repos(
            org,
            repo,
            &format!("collaborators/{login}"),
        )?)
    }
}
