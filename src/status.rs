//! Reviewer availability of every team.

use anyhow::Context as _;
use log::info;
use org_sync::github::GithubRead;
use std::collections::BTreeSet;
use team_config::Config;

/// Why a team member can't be assigned reviews.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unavailability {
    Busy,
    OrgExcluded,
    TeamExcluded,
    TeamMentor,
}

impl Unavailability {
    fn label(self) -> &'static str {
        match self {
            Unavailability::Busy => "busy",
            Unavailability::OrgExcluded => "org_excluded",
            Unavailability::TeamExcluded => "team_excluded",
            Unavailability::TeamMentor => "team_mentor",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamAvailability {
    pub team: String,
    /// Every member with the reasons it is unavailable, if any.
    pub members: Vec<(String, Vec<Unavailability>)>,
}

impl TeamAvailability {
    pub fn unavailable(&self) -> usize {
        self.members
            .iter()
            .filter(|(_, reasons)| !reasons.is_empty())
            .count()
    }

    pub fn active(&self) -> usize {
        self.members.len() - self.unavailable()
    }

    /// Fewer than two members can review, and the team is large enough to
    /// be expected to have two.
    pub fn lacks_reviewers(&self) -> bool {
        let total = self.members.len();
        let unavailable = self.unavailable();
        if total > unavailable + 1 {
            return false;
        }
        !((total <= 1 && unavailable == 0) || (total == 2 && unavailable <= 1))
    }
}

/// Computes the availability of every team given the members who flagged
/// themselves as busy.
pub fn team_availability(cfg: &Config, busy: &BTreeSet<String>) -> Vec<TeamAvailability> {
    cfg.teams
        .iter()
        .map(|(name, team)| {
            let members = team
                .members
                .iter()
                .map(|login| {
                    let mut reasons = Vec::new();
                    if busy.contains(login) {
                        reasons.push(Unavailability::Busy);
                    }
                    if cfg.exclude_cra_from_all_teams.contains(login) {
                        reasons.push(Unavailability::OrgExcluded);
                    }
                    if team.code_review_assignment.is_excluded(login) {
                        reasons.push(Unavailability::TeamExcluded);
                    }
                    if team.mentors.contains(login) {
                        reasons.push(Unavailability::TeamMentor);
                    }
                    (login.clone(), reasons)
                })
                .collect();
            TeamAvailability {
                team: name.clone(),
                members,
            }
        })
        .collect()
}

/// Fetches the status of every member and prints the availability report.
pub fn check_user_status(cfg: &Config, github: &dyn GithubRead) -> anyhow::Result<()> {
    println!(
        "Found {} teams with {} unique members",
        cfg.teams.len(),
        cfg.members.len()
    );
    let mut busy = BTreeSet::new();
    for login in cfg.members.keys() {
        info!("Checking status of {login}");
        let limited = github
            .limited_availability(login)
            .with_context(|| format!("unable to get the availability of {login}"))?;
        if limited {
            busy.insert(login.clone());
        }
    }

    for availability in team_availability(cfg, &busy) {
        println!(
            "Team {} has the following active member ratio: {}/{}",
            availability.team,
            availability.active(),
            availability.members.len()
        );
        if !availability.lacks_reviewers() {
            continue;
        }
        println!(
            "Team {} with {} members doesn't have enough reviewers:",
            availability.team,
            availability.members.len()
        );
        for (login, reasons) in &availability.members {
            let labels: Vec<&str> = reasons.iter().map(|r| r.label()).collect();
            if labels.is_empty() {
                println!("  - {login}");
            } else {
                println!("  - {login} ({})", labels.join(", "));
            }
        }
    }
    Ok(())
}
