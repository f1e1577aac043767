use crate::model::Config;

/// Carries over, from `local` into a freshly pulled `remote`, everything the
/// platform cannot report back.
pub fn merge(local: &Config, mut remote: Config) -> Config {
    remote.exclude_cra_from_all_teams = local
        .exclude_cra_from_all_teams
        .iter()
        .filter(|login| remote.members.contains_key(*login))
        .cloned()
        .collect();

    for (name, team) in remote.teams.iter_mut() {
        let Some(local_team) = local.teams.get(name) else {
            continue;
        };
        team.mentors = local_team
            .mentors
            .iter()
            .filter(|login| team.members.contains(*login))
            .cloned()
            .collect();
        let cra = &mut team.code_review_assignment;
        cra.excluded_members = local_team
            .code_review_assignment
            .excluded_members
            .iter()
            .filter(|excluded| team.members.contains(&excluded.login))
            .cloned()
            .collect();
        cra.include_child_team_members = local_team
            .code_review_assignment
            .include_child_team_members;
    }

    for (login, collaborator) in remote.outside_collaborators.iter_mut() {
        if let Some(local_collaborator) = local.outside_collaborators.get(login) {
            collaborator.reason = local_collaborator.reason.clone();
        }
    }

    for (login, user) in remote.members.iter_mut() {
        let Some(local_user) = local.members.get(login) else {
            continue;
        };
        if user.name.is_empty() {
            user.name = local_user.name.clone();
        }
        if user.slack_id.is_empty() {
            user.slack_id = local_user.slack_id.clone();
        }
    }

    if remote.slack_workspace.is_none() {
        remote.slack_workspace = local.slack_workspace.clone();
    }
    remote
}
