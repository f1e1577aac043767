use crate::model::{Config, Team};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("user {0:?} not found")]
    UserNotFound(String),
    #[error("user {query:?} is ambiguous, it matches: {}", .logins.join(", "))]
    AmbiguousUser { query: String, logins: Vec<String> },
    #[error("team {0:?} does not exist")]
    UnknownTeam(String),
}

/// Resolves a login or a part of a display name to a member login.
///
/// An exact login always wins. Otherwise the query is matched,
/// case-insensitively, against the display names of every member.
pub fn find_user(cfg: &Config, query: &str) -> Result<String, LookupError> {
    if cfg.members.contains_key(query) {
        return Ok(query.to_string());
    }
    let needle = query.to_lowercase();
    let mut logins: Vec<String> = cfg
        .members
        .iter()
        .filter(|(_, user)| !user.name.is_empty() && user.name.to_lowercase().contains(&needle))
        .map(|(login, _)| login.clone())
        .collect();
    match logins.len() {
        0 => Err(LookupError::UserNotFound(query.to_string())),
        1 => Ok(logins.remove(0)),
        _ => {
            logins.sort();
            Err(LookupError::AmbiguousUser {
                query: query.to_string(),
                logins,
            })
        }
    }
}

pub fn find_users<S: AsRef<str>>(cfg: &Config, queries: &[S]) -> Result<Vec<String>, LookupError> {
    queries.iter().map(|q| find_user(cfg, q.as_ref())).collect()
}

pub fn find_team<'a>(cfg: &'a Config, name: &str) -> Result<&'a Team, LookupError> {
    cfg.teams
        .get(name)
        .ok_or_else(|| LookupError::UnknownTeam(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    fn members(entries: &[(&str, &str)]) -> Config {
        let mut cfg = Config::default();
        for (login, name) in entries {
            cfg.members.insert(
                login.to_string(),
                User {
                    name: name.to_string(),
                    ..User::default()
                },
            );
        }
        cfg
    }

    #[test]
    fn display_name_substring() {
        let cfg = members(&[("alice123", "Alice A")]);
        assert_eq!(find_user(&cfg, "ali").unwrap(), "alice123");
    }

    #[test]
    fn ambiguous_display_name() {
        let cfg = members(&[("alice123", "Alice A"), ("alibob", "Bob Ali")]);
        assert_eq!(
            find_user(&cfg, "ali"),
            Err(LookupError::AmbiguousUser {
                query: "ali".into(),
                logins: vec!["alibob".into(), "alice123".into()],
            })
        );
    }

    #[test]
    fn exact_login_wins() {
        let cfg = members(&[("ali", "Someone"), ("alice123", "Alice A")]);
        assert_eq!(find_user(&cfg, "ali").unwrap(), "ali");
    }

    #[test]
    fn unknown_user_and_team() {
        let cfg = members(&[("alice123", "Alice A")]);
        assert_eq!(
            find_user(&cfg, "zed"),
            Err(LookupError::UserNotFound("zed".into()))
        );
        assert_eq!(
            find_users(&cfg, &["alice123", "zed"]),
            Err(LookupError::UserNotFound("zed".into()))
        );
        assert!(matches!(
            find_team(&cfg, "eng"),
            Err(LookupError::UnknownTeam(_))
        ));
    }
}
