use crate::model::{Config, Grantee, RepoPermission, TeamPrivacy};
use log::warn;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("member {login:?} of team {team:?} does not belong to the organization")]
    UnknownTeamMember { team: String, login: String },
    #[error("mentor {login:?} of team {team:?} does not belong to the organization")]
    UnknownMentor { team: String, login: String },
    #[error(
        "member {login:?} excluded from review assignment of team {team:?} does not belong to the organization"
    )]
    UnknownExcludedMember { team: String, login: String },
    #[error("member {login:?} excluded from all review assignments does not belong to the organization")]
    UnknownGloballyExcluded { login: String },
    #[error("team {team:?} has a parent team and cannot be secret")]
    SecretChildTeam { team: String },
    #[error("{grantee} is granted both {first} and {second} on repository {repository:?}")]
    ConflictingGrants {
        repository: String,
        grantee: String,
        first: RepoPermission,
        second: RepoPermission,
    },
}

/// Checks every cross reference of the configuration, stopping at the first
/// violation.
pub fn sanity_check(cfg: &Config) -> Result<(), ValidationError> {
    for (name, team) in &cfg.teams {
        if let Some(login) = team.members.iter().find(|m| !cfg.members.contains_key(*m)) {
            return Err(ValidationError::UnknownTeamMember {
                team: name.clone(),
                login: login.clone(),
            });
        }
        if let Some(login) = team.mentors.iter().find(|m| !cfg.members.contains_key(*m)) {
            return Err(ValidationError::UnknownMentor {
                team: name.clone(),
                login: login.clone(),
            });
        }
        if let Some(excluded) = team
            .code_review_assignment
            .excluded_members
            .iter()
            .find(|m| !cfg.members.contains_key(&m.login))
        {
            return Err(ValidationError::UnknownExcludedMember {
                team: name.clone(),
                login: excluded.login.clone(),
            });
        }
        if team.parent.is_some() && team.privacy == Some(TeamPrivacy::Secret) {
            return Err(ValidationError::SecretChildTeam { team: name.clone() });
        }
    }
    // A grantee holds a single permission level on a repository.
    for (name, repo) in &cfg.repositories {
        let mut seen: BTreeMap<&Grantee, RepoPermission> = BTreeMap::new();
        for (permission, grantee) in repo.permissions() {
            if let Some(first) = seen.insert(grantee, permission) {
                return Err(ValidationError::ConflictingGrants {
                    repository: name.clone(),
                    grantee: grantee.to_string(),
                    first,
                    second: permission,
                });
            }
        }
    }
    if let Some(login) = cfg
        .exclude_cra_from_all_teams
        .iter()
        .find(|m| !cfg.members.contains_key(*m))
    {
        return Err(ValidationError::UnknownGloballyExcluded {
            login: login.clone(),
        });
    }
    Ok(())
}

/// Puts the configuration in its canonical form. Running it twice is the
/// same as running it once.
pub fn sort_config(cfg: &mut Config) {
    for team in cfg.teams.values_mut() {
        sort_dedup(&mut team.members);
        sort_dedup(&mut team.mentors);
        let excluded = &mut team.code_review_assignment.excluded_members;
        excluded.sort_by(|a, b| a.login.cmp(&b.login));
        excluded.dedup_by(|a, b| a.login == b.login);
        if team.privacy.is_none() {
            team.privacy = Some(match team.parent {
                Some(_) => TeamPrivacy::Visible,
                None => TeamPrivacy::Secret,
            });
        }
    }
    sort_dedup(&mut cfg.exclude_cra_from_all_teams);
    prune_inherited_team_grants(cfg);
    refresh_outside_collaborators(cfg);
}

fn sort_dedup(list: &mut Vec<String>) {
    list.sort();
    list.dedup();
}

/// Drops a team grant when an ancestor of that team already holds the same
/// permission on the repository.
fn prune_inherited_team_grants(cfg: &mut Config) {
    let mut descendants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (repo_name, repo) in &cfg.repositories {
        for (_, team) in repo.team_grants() {
            if !cfg.teams.contains_key(team) {
                warn!("repository {repo_name} grants a permission to unknown team {team}");
                continue;
            }
            if !descendants.contains_key(team) {
                descendants.insert(team.to_string(), cfg.descendants(team));
            }
        }
    }

    for repo in cfg.repositories.values_mut() {
        for grantees in repo.grants.values_mut() {
            let redundant: BTreeSet<Grantee> = grantees
                .iter()
                .filter_map(|grantee| match grantee {
                    Grantee::Team(name) => descendants.get(name),
                    Grantee::User(_) => None,
                })
                .flatten()
                .map(|name| Grantee::Team(name.clone()))
                .collect();
            grantees.retain(|grantee| !redundant.contains(grantee));
        }
        repo.grants.retain(|_, grantees| !grantees.is_empty());
    }
}

fn refresh_outside_collaborators(cfg: &mut Config) {
    let outside: BTreeSet<String> = cfg
        .repositories
        .values()
        .flat_map(|repo| repo.user_grants().map(|(_, login)| login.to_string()))
        .filter(|login| !cfg.members.contains_key(login))
        .collect();
    cfg.outside_collaborators
        .retain(|login, _| outside.contains(login));
    for login in outside {
        cfg.outside_collaborators.entry(login).or_default();
    }
}

/// Which sections of the configuration take part in a comparison.
#[derive(Clone, Copy, Debug)]
pub struct NormalizeOptions {
    pub repositories: bool,
    pub members: bool,
    pub teams: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            repositories: true,
            members: true,
            teams: true,
        }
    }
}

/// Removes everything the remote platform cannot report, so that a local
/// and a pulled configuration can be compared structurally.
pub fn normalize(cfg: &mut Config, options: NormalizeOptions) {
    if options.repositories {
        for collaborator in cfg.outside_collaborators.values_mut() {
            collaborator.reason.clear();
        }
    } else {
        cfg.repositories.clear();
        cfg.outside_collaborators.clear();
    }

    if options.members {
        for user in cfg.members.values_mut() {
            user.name.clear();
            user.slack_id.clear();
        }
    } else {
        cfg.members.clear();
    }

    if options.teams {
        for team in cfg.teams.values_mut() {
            sort_dedup(&mut team.members);
            team.mentors.clear();
            team.code_review_assignment.excluded_members.clear();
            team.code_review_assignment.include_child_team_members = None;
        }
    } else {
        cfg.teams.clear();
    }

    cfg.slack_workspace = None;
    cfg.exclude_cra_from_all_teams.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExcludedMember, RepoPermission, Repository, Team, User};
    use crate::storage::{Format, render};

    fn member_config(logins: &[&str]) -> Config {
        let mut cfg = Config::default();
        for login in logins {
            cfg.members.insert(login.to_string(), User::default());
        }
        cfg
    }

    fn team(members: &[&str], parent: Option<&str>) -> Team {
        Team {
            members: members.iter().map(|m| m.to_string()).collect(),
            parent: parent.map(str::to_string),
            ..Team::default()
        }
    }

    #[test]
    fn sanity_check_accepts_resolved_references() {
        let mut cfg = member_config(&["alice", "bob"]);
        let mut eng = team(&["alice", "bob"], None);
        eng.mentors = vec!["bob".into()];
        eng.code_review_assignment.excluded_members = vec![ExcludedMember {
            login: "alice".into(),
            reason: String::new(),
        }];
        cfg.teams.insert("eng".into(), eng);
        cfg.exclude_cra_from_all_teams = vec!["bob".into()];
        assert!(sanity_check(&cfg).is_ok());
    }

    #[test]
    fn sanity_check_rejects_dangling_references() {
        let base = {
            let mut cfg = member_config(&["alice"]);
            cfg.teams.insert("eng".into(), team(&["alice"], None));
            cfg
        };

        let mut cfg = base.clone();
        cfg.teams.get_mut("eng").unwrap().members.push("ghost".into());
        assert!(matches!(
            sanity_check(&cfg),
            Err(ValidationError::UnknownTeamMember { .. })
        ));

        let mut cfg = base.clone();
        cfg.teams.get_mut("eng").unwrap().mentors.push("ghost".into());
        assert!(matches!(
            sanity_check(&cfg),
            Err(ValidationError::UnknownMentor { .. })
        ));

        let mut cfg = base.clone();
        cfg.teams
            .get_mut("eng")
            .unwrap()
            .code_review_assignment
            .excluded_members
            .push(ExcludedMember {
                login: "ghost".into(),
                reason: String::new(),
            });
        assert!(matches!(
            sanity_check(&cfg),
            Err(ValidationError::UnknownExcludedMember { .. })
        ));

        let mut cfg = base;
        cfg.exclude_cra_from_all_teams.push("ghost".into());
        assert!(matches!(
            sanity_check(&cfg),
            Err(ValidationError::UnknownGloballyExcluded { .. })
        ));
    }

    #[test]
    fn sanity_check_rejects_secret_child() {
        let mut cfg = member_config(&[]);
        cfg.teams.insert("eng".into(), team(&[], None));
        let mut child = team(&[], Some("eng"));
        child.privacy = Some(TeamPrivacy::Secret);
        cfg.teams.insert("backend".into(), child);
        assert!(matches!(
            sanity_check(&cfg),
            Err(ValidationError::SecretChildTeam { .. })
        ));
    }

    #[test]
    fn sanity_check_rejects_two_levels_for_one_grantee() {
        let mut cfg = member_config(&["alice"]);
        cfg.teams.insert("eng".into(), team(&["alice"], None));
        let mut site = Repository::default();
        site.grant(RepoPermission::Write, Grantee::User("alice".into()));
        site.grant(RepoPermission::Read, Grantee::Team("eng".into()));
        cfg.repositories.insert("site".into(), site);
        assert!(sanity_check(&cfg).is_ok());

        let site = cfg.repositories.get_mut("site").unwrap();
        site.grant(RepoPermission::Read, Grantee::User("alice".into()));
        let err = sanity_check(&cfg).unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::ConflictingGrants {
                repository,
                first: RepoPermission::Read,
                second: RepoPermission::Write,
                ..
            } if repository == "site"
        ));
        assert_eq!(
            err.to_string(),
            r#"user alice is granted both READ and WRITE on repository "site""#
        );
    }

    fn messy() -> Config {
        let mut cfg = member_config(&["alice", "bob"]);
        cfg.teams
            .insert("eng".into(), team(&["bob", "alice", "bob"], None));
        cfg.teams.insert("backend".into(), team(&["alice"], Some("eng")));
        cfg.teams.insert("db".into(), team(&[], Some("backend")));
        let mut repo = Repository::default();
        repo.grant(RepoPermission::Write, Grantee::Team("eng".into()));
        repo.grant(RepoPermission::Write, Grantee::Team("db".into()));
        repo.grant(RepoPermission::Admin, Grantee::Team("backend".into()));
        repo.grant(RepoPermission::Read, Grantee::User("outsider".into()));
        repo.grant(RepoPermission::Read, Grantee::User("alice".into()));
        cfg.repositories.insert("website".into(), repo);
        cfg.exclude_cra_from_all_teams = vec!["bob".into(), "alice".into(), "bob".into()];
        cfg
    }

    #[test]
    fn sort_config_canonicalizes() {
        let mut cfg = messy();
        sort_config(&mut cfg);

        assert_eq!(cfg.teams["eng"].members, vec!["alice", "bob"]);
        assert_eq!(cfg.teams["eng"].privacy, Some(TeamPrivacy::Secret));
        assert_eq!(cfg.teams["backend"].privacy, Some(TeamPrivacy::Visible));
        assert_eq!(cfg.exclude_cra_from_all_teams, vec!["alice", "bob"]);

        let repo = &cfg.repositories["website"];
        assert_eq!(
            repo.team_grants().collect::<Vec<_>>(),
            vec![
                (RepoPermission::Write, "eng"),
                (RepoPermission::Admin, "backend"),
            ]
        );
        assert_eq!(
            cfg.outside_collaborators.keys().collect::<Vec<_>>(),
            vec!["outsider"]
        );
    }

    #[test]
    fn sort_config_is_idempotent() {
        let mut once = messy();
        sort_config(&mut once);
        let mut twice = once.clone();
        sort_config(&mut twice);
        assert_eq!(once, twice);
        assert_eq!(
            render(&once, Format::Yaml).unwrap(),
            render(&twice, Format::Yaml).unwrap()
        );
    }

    #[test]
    fn normalize_strips_local_metadata() {
        let mut cfg = messy();
        cfg.members.get_mut("alice").unwrap().name = "Alice A".into();
        let eng = cfg.teams.get_mut("eng").unwrap();
        eng.mentors = vec!["alice".into()];
        eng.code_review_assignment.include_child_team_members = Some(true);
        sort_config(&mut cfg);
        cfg.outside_collaborators.get_mut("outsider").unwrap().reason = "contractor".into();

        let mut full = cfg.clone();
        normalize(&mut full, NormalizeOptions::default());
        assert!(full.members["alice"].name.is_empty());
        assert!(full.teams["eng"].mentors.is_empty());
        assert_eq!(
            full.teams["eng"].code_review_assignment.include_child_team_members,
            None
        );
        assert!(full.outside_collaborators["outsider"].reason.is_empty());
        assert!(full.exclude_cra_from_all_teams.is_empty());

        let mut teams_only = cfg;
        normalize(
            &mut teams_only,
            NormalizeOptions {
                repositories: false,
                members: false,
                teams: true,
            },
        );
        assert!(teams_only.repositories.is_empty());
        assert!(teams_only.members.is_empty());
        assert_eq!(teams_only.teams.len(), 3);
    }
}
