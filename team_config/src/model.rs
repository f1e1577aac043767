use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// The local description of an organization.
///
/// Every team lives in the flat `teams` table, whatever its depth in the
/// hierarchy. The hierarchy itself is only stored as `Team::parent` and all
/// the tree views below are derived from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub organization: String,
    pub slack_workspace: Option<String>,
    pub members: BTreeMap<String, User>,
    pub outside_collaborators: BTreeMap<String, OutsideCollaborator>,
    pub teams: BTreeMap<String, Team>,
    pub repositories: BTreeMap<String, Repository>,
    pub exclude_cra_from_all_teams: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "slackID", skip_serializing_if = "String::is_empty")]
    pub slack_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutsideCollaborator {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Team {
    /// GraphQL node id.
    pub id: String,
    /// REST database id.
    pub rest_id: u64,
    pub description: String,
    pub members: Vec<String>,
    pub mentors: Vec<String>,
    pub code_review_assignment: CodeReviewAssignment,
    pub privacy: Option<TeamPrivacy>,
    pub parent: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReviewAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<ReviewAlgorithm>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_members: Vec<ExcludedMember>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub notify_team: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub team_member_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_child_team_members: Option<bool>,
}

impl CodeReviewAssignment {
    pub fn is_default(&self) -> bool {
        *self == CodeReviewAssignment::default()
    }

    pub fn is_excluded(&self, login: &str) -> bool {
        self.excluded_members.iter().any(|m| m.login == login)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedMember {
    pub login: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAlgorithm {
    LoadBalance,
    RoundRobin,
}

impl ReviewAlgorithm {
    pub fn graphql_name(self) -> &'static str {
        match self {
            ReviewAlgorithm::LoadBalance => "LOAD_BALANCE",
            ReviewAlgorithm::RoundRobin => "ROUND_ROBIN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamPrivacy {
    #[serde(alias = "secret")]
    Secret,
    #[serde(alias = "visible", alias = "closed")]
    Visible,
}

impl TeamPrivacy {
    pub fn rest_name(self) -> &'static str {
        match self {
            TeamPrivacy::Secret => "secret",
            TeamPrivacy::Visible => "closed",
        }
    }
}

impl fmt::Display for TeamPrivacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamPrivacy::Secret => write!(f, "SECRET"),
            TeamPrivacy::Visible => write!(f, "VISIBLE"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepoPermission {
    Read,
    Triage,
    Write,
    Maintain,
    Admin,
}

impl RepoPermission {
    pub fn graphql_name(self) -> &'static str {
        match self {
            RepoPermission::Read => "READ",
            RepoPermission::Triage => "TRIAGE",
            RepoPermission::Write => "WRITE",
            RepoPermission::Maintain => "MAINTAIN",
            RepoPermission::Admin => "ADMIN",
        }
    }

    /// The name the REST API expects when granting this permission.
    pub fn rest_name(self) -> &'static str {
        match self {
            RepoPermission::Read => "pull",
            RepoPermission::Triage => "triage",
            RepoPermission::Write => "push",
            RepoPermission::Maintain => "maintain",
            RepoPermission::Admin => "admin",
        }
    }
}

impl fmt::Display for RepoPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.graphql_name())
    }
}

impl FromStr for RepoPermission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "READ" | "PULL" => Ok(RepoPermission::Read),
            "TRIAGE" => Ok(RepoPermission::Triage),
            "WRITE" | "PUSH" => Ok(RepoPermission::Write),
            "MAINTAIN" => Ok(RepoPermission::Maintain),
            "ADMIN" => Ok(RepoPermission::Admin),
            _ => anyhow::bail!("unknown repository permission: {s}"),
        }
    }
}

/// Who a repository permission is granted to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grantee {
    Team(String),
    User(String),
}

impl Grantee {
    pub fn name(&self) -> &str {
        match self {
            Grantee::Team(name) | Grantee::User(name) => name,
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grantee::Team(name) => write!(f, "team {name}"),
            Grantee::User(login) => write!(f, "user {login}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Repository {
    pub grants: BTreeMap<RepoPermission, BTreeSet<Grantee>>,
}

impl Repository {
    pub fn grant(&mut self, permission: RepoPermission, grantee: Grantee) {
        self.grants.entry(permission).or_default().insert(grantee);
    }

    /// Removes every grant held by `grantee`, whatever its permission.
    pub fn revoke(&mut self, grantee: &Grantee) {
        for grantees in self.grants.values_mut() {
            grantees.remove(grantee);
        }
        self.grants.retain(|_, grantees| !grantees.is_empty());
    }

    pub fn permissions(&self) -> impl Iterator<Item = (RepoPermission, &Grantee)> {
        self.grants
            .iter()
            .flat_map(|(perm, grantees)| grantees.iter().map(move |g| (*perm, g)))
    }

    pub fn team_grants(&self) -> impl Iterator<Item = (RepoPermission, &str)> {
        self.permissions().filter_map(|(perm, grantee)| match grantee {
            Grantee::Team(name) => Some((perm, name.as_str())),
            Grantee::User(_) => None,
        })
    }

    pub fn user_grants(&self) -> impl Iterator<Item = (RepoPermission, &str)> {
        self.permissions().filter_map(|(perm, grantee)| match grantee {
            Grantee::User(login) => Some((perm, login.as_str())),
            Grantee::Team(_) => None,
        })
    }
}

impl Config {
    pub fn team(&self, name: &str) -> Option<&Team> {
        self.teams.get(name)
    }

    /// Parent name to sorted child names, only for parents present in the
    /// table.
    pub fn children_map(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, team) in &self.teams {
            if let Some(parent) = &team.parent {
                if self.teams.contains_key(parent) {
                    children.entry(parent.as_str()).or_default().push(name);
                }
            }
        }
        children
    }

    pub fn children(&self, name: &str) -> Vec<&str> {
        self.children_map().remove(name).unwrap_or_default()
    }

    /// Teams without a parent, or whose parent is not part of this config.
    pub fn roots(&self) -> Vec<&str> {
        self.teams
            .iter()
            .filter(|(_, team)| match &team.parent {
                Some(parent) => !self.teams.contains_key(parent),
                None => true,
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Every team below `name`, not including `name` itself.
    pub fn descendants(&self, name: &str) -> BTreeSet<String> {
        let children = self.children_map();
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for child in children.get(current).into_iter().flatten() {
                if *child != name && found.insert(child.to_string()) {
                    queue.push_back(child);
                }
            }
        }
        found
    }

    /// The parent chain of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = self.teams.get(name).and_then(|t| t.parent.as_deref());
        while let Some(parent) = current {
            if parent == name || chain.iter().any(|seen| seen == parent) {
                break;
            }
            chain.push(parent.to_string());
            current = self.teams.get(parent).and_then(|t| t.parent.as_deref());
        }
        chain
    }

    pub fn is_ancestor_of(&self, ancestor: &str, team: &str) -> bool {
        self.ancestors(team).iter().any(|a| a == ancestor)
    }

    /// Forgets an organization member everywhere it is referenced.
    pub fn scrub_member(&mut self, login: &str) {
        self.members.remove(login);
        for team in self.teams.values_mut() {
            team.members.retain(|m| m != login);
            team.mentors.retain(|m| m != login);
            team.code_review_assignment
                .excluded_members
                .retain(|m| m.login != login);
        }
        let grantee = Grantee::User(login.to_string());
        for repo in self.repositories.values_mut() {
            repo.revoke(&grantee);
        }
        self.exclude_cra_from_all_teams.retain(|m| m != login);
    }

    /// Drops every repository grant held by a team.
    pub fn revoke_team_grants(&mut self, name: &str) {
        let grantee = Grantee::Team(name.to_string());
        for repo in self.repositories.values_mut() {
            repo.revoke(&grantee);
        }
    }
}
