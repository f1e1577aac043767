//! Reconciles a local [`team_config::Config`] with the live state of a
//! GitHub organization.

mod cancel;
pub mod github;
mod utils;

pub use crate::cancel::{CancellationToken, RATE_LIMIT_BACKOFF, retry_rate_limited};

use crate::github::{GitHubApiRead, GitHubApiWrite, HttpClient};

const USER_AGENT: &str = concat!("team-manager/", env!("CARGO_PKG_VERSION"));

/// Builds the read and write clients from the environment: `GITHUB_TOKEN`
/// authenticates every request and `GITHUB_APP_SLUG`, when set, names the
/// GitHub App the token belongs to.
pub fn connect(cancel: CancellationToken) -> anyhow::Result<(GitHubApiRead, GitHubApiWrite)> {
    let client = HttpClient::from_env(cancel)?;
    let app_slug = std::env::var("GITHUB_APP_SLUG")
        .ok()
        .filter(|slug| !slug.is_empty());
    let read = GitHubApiRead::from_client(client.clone(), app_slug)?;
    Ok((read, GitHubApiWrite::new(client)))
}
