//! Edits of the local configuration made by the helper commands.

use anyhow::anyhow;
use log::info;
use org_sync::github::{GithubRead, slug};
use std::collections::BTreeSet;
use team_config::{Config, LookupError, Team, User, find_team, find_user, find_users};

/// Adds GitHub accounts to the organization members, returning their logins
/// as spelled by GitHub.
pub fn add_users(
    cfg: &mut Config,
    github: &dyn GithubRead,
    logins: &[String],
) -> anyhow::Result<Vec<String>> {
    let mut added = Vec::new();
    for login in logins {
        let user = github
            .user(login)?
            .ok_or_else(|| anyhow!("GitHub user {login} does not exist"))?;
        let member = cfg.members.entry(user.login.clone()).or_insert_with(User::default);
        member.id = user.id;
        member.name = user.name;
        added.push(user.login);
    }
    Ok(added)
}

/// Adds teams to the configuration, picking up their identifiers when they
/// already exist in the organization.
pub fn add_teams(cfg: &mut Config, github: &dyn GithubRead, names: &[String]) -> anyhow::Result<()> {
    for name in names {
        if cfg.teams.contains_key(name) {
            info!("Team {name} is already configured");
            continue;
        }
        let mut team = Team::default();
        match github.team(&cfg.organization, &slug(name))? {
            Some(remote) => {
                team.id = remote.id;
                team.rest_id = remote.rest_id;
            }
            None => info!("Team {name} does not exist yet, the next push creates it"),
        }
        cfg.teams.insert(name.clone(), team);
    }
    Ok(())
}

/// Replaces the members of `team`. Users are looked up by login or name.
pub fn set_team_members(cfg: &mut Config, team: &str, users: &[String]) -> Result<(), LookupError> {
    let members: BTreeSet<String> = find_users(cfg, users)?.into_iter().collect();
    let team = cfg
        .teams
        .get_mut(team)
        .ok_or_else(|| LookupError::UnknownTeam(team.to_string()))?;
    team.members = members.into_iter().collect();
    Ok(())
}

/// Adds users to `team`, keeping its current members.
pub fn add_team_members(cfg: &mut Config, team: &str, users: &[String]) -> Result<(), LookupError> {
    let mut members = find_team(cfg, team)?.members.clone();
    members.extend(users.iter().cloned());
    set_team_members(cfg, team, &members)
}

/// Excludes users from the review assignment of every team.
pub fn add_pto(cfg: &mut Config, users: &[String]) -> Result<(), LookupError> {
    let logins = find_users(cfg, users)?;
    let mut excluded: BTreeSet<String> = cfg.exclude_cra_from_all_teams.drain(..).collect();
    excluded.extend(logins);
    cfg.exclude_cra_from_all_teams = excluded.into_iter().collect();
    Ok(())
}

/// Includes users in the review assignment of their teams again.
pub fn remove_pto(cfg: &mut Config, users: &[String]) -> Result<(), LookupError> {
    let logins = users
        .iter()
        .map(|user| find_user(cfg, user))
        .collect::<Result<BTreeSet<_>, _>>()?;
    cfg.exclude_cra_from_all_teams
        .retain(|login| !logins.contains(login));
    Ok(())
}

/// `(team, login)` of every mentor that is not a member of its team.
pub fn stray_mentors(cfg: &Config) -> Vec<(&str, &str)> {
    cfg.teams
        .iter()
        .flat_map(|(name, team)| {
            team.mentors
                .iter()
                .filter(|mentor| !team.members.contains(*mentor))
                .map(move |mentor| (name.as_str(), mentor.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use org_sync::github::{
        OrgMember, Page, RemoteTeam, RemoteUser, RepositoryNode, TeamMembersNode,
        TeamRepositoriesNode,
    };

    /// Knows a few accounts and a single team, `infra`.
    struct StubGithub;

    impl GithubRead for StubGithub {
        fn authenticated_user(&self) -> anyhow::Result<String> {
            Ok("bot".to_string())
        }

        fn org_members(&self, _: &str, _: Option<&str>) -> anyhow::Result<Page<OrgMember>> {
            Ok(Page::default())
        }

        fn org_repositories(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
        ) -> anyhow::Result<Page<RepositoryNode>> {
            Ok(Page::default())
        }

        fn org_team_repositories(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
        ) -> anyhow::Result<Page<TeamRepositoriesNode>> {
            Ok(Page::default())
        }

        fn org_team_members(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
        ) -> anyhow::Result<Page<TeamMembersNode>> {
            Ok(Page::default())
        }

        fn pending_invitations(&self, _: &str) -> anyhow::Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }

        fn limited_availability(&self, _: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        fn user(&self, login: &str) -> anyhow::Result<Option<RemoteUser>> {
            Ok((login.eq_ignore_ascii_case("alice")).then(|| RemoteUser {
                id: "U_alice".to_string(),
                rest_id: 1,
                login: "Alice".to_string(),
                name: "Alice Liddell".to_string(),
            }))
        }

        fn team(&self, _: &str, slug: &str) -> anyhow::Result<Option<RemoteTeam>> {
            Ok((slug == "infra").then(|| RemoteTeam {
                id: "T_infra".to_string(),
                rest_id: 7,
                name: "Infra".to_string(),
                slug: slug.to_string(),
            }))
        }
    }

    fn config() -> Config {
        let mut cfg = Config::default();
        for (login, name) in [("alice", "Alice Liddell"), ("bob", "Bob Ross"), ("carol", "")] {
            cfg.members.insert(
                login.to_string(),
                User {
                    name: name.to_string(),
                    ..User::default()
                },
            );
        }
        cfg.teams.insert(
            "eng".to_string(),
            Team {
                members: vec!["carol".to_string()],
                mentors: vec!["bob".to_string(), "carol".to_string()],
                ..Team::default()
            },
        );
        cfg
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn users_take_their_github_login() {
        let mut cfg = Config::default();
        let added = add_users(&mut cfg, &StubGithub, &strings(&["alice"])).unwrap();
        assert_eq!(added, strings(&["Alice"]));
        assert_eq!(cfg.members["Alice"].id, "U_alice");
        assert!(add_users(&mut cfg, &StubGithub, &strings(&["nobody"])).is_err());
    }

    #[test]
    fn teams_pick_up_remote_ids() {
        let mut cfg = config();
        add_teams(&mut cfg, &StubGithub, &strings(&["infra", "new team"])).unwrap();
        assert_eq!(cfg.teams["infra"].rest_id, 7);
        assert_eq!(cfg.teams["new team"].id, "");
    }

    #[test]
    fn team_members_are_resolved_and_sorted() {
        let mut cfg = config();
        add_team_members(&mut cfg, "eng", &strings(&["ross", "alice"])).unwrap();
        assert_eq!(cfg.teams["eng"].members, strings(&["alice", "bob", "carol"]));

        set_team_members(&mut cfg, "eng", &strings(&["bob", "bob"])).unwrap();
        assert_eq!(cfg.teams["eng"].members, strings(&["bob"]));

        assert_eq!(
            set_team_members(&mut cfg, "ops", &strings(&["bob"])),
            Err(LookupError::UnknownTeam("ops".to_string()))
        );
    }

    #[test]
    fn pto_round_trip() {
        let mut cfg = config();
        add_pto(&mut cfg, &strings(&["bob", "liddell"])).unwrap();
        assert_eq!(cfg.exclude_cra_from_all_teams, strings(&["alice", "bob"]));

        assert!(add_pto(&mut cfg, &strings(&["zed"])).is_err());
        assert_eq!(cfg.exclude_cra_from_all_teams, strings(&["alice", "bob"]));

        remove_pto(&mut cfg, &strings(&["Alice"])).unwrap();
        assert_eq!(cfg.exclude_cra_from_all_teams, strings(&["bob"]));
    }

    #[test]
    fn mentors_outside_their_team() {
        let cfg = config();
        assert_eq!(stray_mentors(&cfg), vec![("eng", "bob")]);
    }
}
