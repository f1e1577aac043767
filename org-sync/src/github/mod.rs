mod api;
mod paginate;
mod pull;
mod push;
mod reconcile;
#[cfg(test)]
mod tests;

pub use self::api::{
    Collaborator, CreatedTeam, GitHubApiRead, GitHubApiWrite, GithubRead, GithubWrite, HttpClient, NewTeam,
    OrgMember, Page, ParentChange, RemoteError, RemoteTeam, RemoteUser, RepositoryNode,
    ReviewAssignmentUpdate, ReviewSettings, TeamEdit, TeamMembersNode, TeamRepositoriesNode,
    TeamRepository, is_cancelled, slug,
};
pub use self::pull::pull_configuration;
pub use self::push::{Confirm, PushExecutor, PushOptions, Stages};
pub use self::reconcile::{
    RepositoryCheck, RepositoryPermissionChange, ReviewAssignmentChange, SetChange,
    TeamMembershipChange, TeamSettingsChange, TeamsChange, check_repositories, diff_members,
    diff_repository_permissions, diff_team_membership, diff_team_settings, diff_teams,
    effective_privacy, plan_review_assignments, set_difference,
};
