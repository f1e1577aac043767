mod read;
mod url;
mod write;

use crate::cancel::{CancellationToken, RATE_LIMIT_BACKOFF, retry_rate_limited};
use crate::utils::{ResponseExt, mentions_secondary_rate_limit};
use anyhow::{Context, bail};
use hyper_old_types::header::{Link, RelationType};
use log::{debug, trace};
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{
    Method, StatusCode,
    blocking::{Client, RequestBuilder, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use std::time::Duration;
use team_config::{RepoPermission, ReviewAlgorithm, TeamPrivacy};

pub use read::{GitHubApiRead, GithubRead};
pub use write::{GitHubApiWrite, GithubWrite};

pub(crate) use url::GitHubUrl;

/// Remote failures callers have to tell apart from the rest.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("the API rate limit was exceeded")]
    RateLimited,
    #[error("the secondary API rate limit was exceeded")]
    SecondaryRateLimited,
    #[error("the operation was cancelled")]
    Cancelled,
}

/// Whether `err` was caused by the cancellation token.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<RemoteError>(),
            Some(RemoteError::Cancelled)
        )
    })
}

/// Upper bound of a single request. Cancellation is only observed between
/// requests, so an interrupt takes effect at most this long after it fires.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cancel: CancellationToken,
}

impl HttpClient {
    pub fn new(token: &SecretString, cancel: CancellationToken) -> anyhow::Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("token {}", token.expose_secret()))?;
        auth.set_sensitive(true);

        let mut map = HeaderMap::default();
        map.insert(header::AUTHORIZATION, auth);
        map.insert(
            header::USER_AGENT,
            HeaderValue::from_static(crate::USER_AGENT),
        );

        Ok(Self {
            client: reqwest::blocking::ClientBuilder::default()
                .default_headers(map)
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            cancel,
        })
    }

    /// Builds a client authenticated with the `GITHUB_TOKEN` environment
    /// variable.
    pub fn from_env(cancel: CancellationToken) -> anyhow::Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .context("failed to get the GITHUB_TOKEN environment variable")?;
        Self::new(&SecretString::from(token), cancel)
    }

    /// Starts a request unless the token was cancelled. A request already in
    /// flight is not interrupted and runs until [`REQUEST_TIMEOUT`].
    fn req(&self, method: Method, url: &GitHubUrl) -> anyhow::Result<RequestBuilder> {
        self.cancel.check()?;
        trace!("http request: {} {}", method, url.url());
        Ok(self.client.request(method, url.url()))
    }

    fn retrying<T>(&self, op: impl FnMut() -> anyhow::Result<T>) -> anyhow::Result<T> {
        retry_rate_limited(&self.cancel, RATE_LIMIT_BACKOFF, op)
    }

    fn send<T: serde::Serialize + std::fmt::Debug>(
        &self,
        method: Method,
        url: &GitHubUrl,
        body: &T,
    ) -> anyhow::Result<Response> {
        self.retrying(|| {
            self.req(method.clone(), url)?
                .json(body)
                .send()?
                .custom_error_for_status()
        })
    }

    fn send_option<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &GitHubUrl,
    ) -> anyhow::Result<Option<T>> {
        self.retrying(|| {
            let resp = self.req(method.clone(), url)?.send()?;
            match resp.status() {
                StatusCode::OK => Ok(Some(resp.json_annotated().with_context(|| {
                    format!(
                        "Failed to decode response body on {method} request to '{}'",
                        url.url()
                    )
                })?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => {
                    resp.custom_error_for_status()?;
                    bail!("unexpected status {status} on {method} request to '{}'", url.url())
                }
            }
        })
    }

    /// Sends a DELETE request, treating an already missing resource as
    /// success.
    fn delete(&self, url: &GitHubUrl) -> anyhow::Result<()> {
        self.retrying(|| {
            let resp = self.req(Method::DELETE, url)?.send()?;
            allow_not_found(resp, Method::DELETE, url.url())
        })
    }

    fn graphql<R, V>(&self, query: &str, variables: V) -> anyhow::Result<R>
    where
        R: DeserializeOwned,
        V: serde::Serialize,
    {
        #[derive(serde::Serialize)]
        struct Request<'a, V> {
            query: &'a str,
            variables: &'a V,
        }
        let url = GitHubUrl::new("graphql".to_string());
        self.retrying(|| {
            let resp = self
                .req(Method::POST, &url)?
                .json(&Request {
                    query,
                    variables: &variables,
                })
                .send()?
                .custom_error_for_status()?;

            let res: GraphResult<R> = resp.json_annotated().with_context(|| {
                format!("Failed to decode response body on graphql request with query '{query}'")
            })?;
            if let Some(error) = res.errors.first() {
                if error.kind.as_deref() == Some("RATE_LIMITED") {
                    return Err(RemoteError::RateLimited.into());
                }
                if mentions_secondary_rate_limit(&error.message) {
                    return Err(RemoteError::SecondaryRateLimited.into());
                }
                bail!("graphql error: {}", error.message);
            } else if let Some(data) = res.data {
                Ok(data)
            } else {
                bail!("missing graphql data");
            }
        })
    }

    fn rest_paginated<F, T>(&self, method: &Method, url: &GitHubUrl, mut f: F) -> anyhow::Result<()>
    where
        F: FnMut(Vec<T>) -> anyhow::Result<()>,
        T: DeserializeOwned,
    {
        let mut next = Some(url.clone());
        while let Some(next_url) = next.take() {
            let resp = self.retrying(|| {
                self.req(method.clone(), &next_url)?
                    .send()?
                    .custom_error_for_status()
            })?;

            // Extract the next page
            if let Some(links) = resp.headers().get(header::LINK) {
                let links: Link = links.to_str()?.parse()?;
                for link in links.values() {
                    if link
                        .rel()
                        .map(|r| r.iter().any(|r| *r == RelationType::Next))
                        .unwrap_or(false)
                    {
                        next = Some(GitHubUrl::new(link.link().to_string()));
                        break;
                    }
                }
            }

            f(resp.json().with_context(|| {
                format!(
                    "Failed to deserialize response body for {method} request to '{}'",
                    next_url.url()
                )
            })?)?;
        }
        Ok(())
    }
}

fn allow_not_found(resp: Response, method: Method, url: &str) -> anyhow::Result<()> {
    match resp.status() {
        StatusCode::NOT_FOUND => {
            debug!("Response from {method} {url} returned 404 which is treated as success");
        }
        _ => {
            resp.custom_error_for_status()?;
        }
    }
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct GraphResult<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, serde::Deserialize)]
struct GraphError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphPageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

/// A connection exposing its items through `nodes`.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphNodes<T> {
    page_info: GraphPageInfo,
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl<T> GraphNodes<T> {
    fn into_page<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            nodes: self.nodes.into_iter().flatten().map(f).collect(),
            end_cursor: self.page_info.end_cursor,
            has_next_page: self.page_info.has_next_page,
        }
    }
}

/// A connection exposing its items through `edges`.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEdges<T> {
    page_info: GraphPageInfo,
    #[serde(default = "Vec::new")]
    edges: Vec<Option<T>>,
}

impl<T> GraphEdges<T> {
    fn into_page<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            nodes: self.edges.into_iter().flatten().map(f).collect(),
            end_cursor: self.page_info.end_cursor,
            has_next_page: self.page_info.has_next_page,
        }
    }
}

/// One page of a cursor-paginated collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub nodes: Vec<T>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Page {
            nodes: Vec::new(),
            end_cursor: None,
            has_next_page: false,
        }
    }
}

impl<T> Page<T> {
    /// A page holding the whole collection.
    pub fn complete(nodes: Vec<T>) -> Self {
        Page {
            nodes,
            ..Page::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrgMember {
    pub id: String,
    pub login: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collaborator {
    pub login: String,
    /// `None` when the platform reports a permission this tool doesn't know.
    pub permission: Option<RepoPermission>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryNode {
    pub id: String,
    pub name: String,
    pub collaborators: Page<Collaborator>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamRepository {
    pub name: String,
    pub permission: Option<RepoPermission>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamRepositoriesNode {
    pub id: String,
    pub name: String,
    pub repositories: Page<TeamRepository>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReviewSettings {
    pub enabled: bool,
    pub algorithm: Option<ReviewAlgorithm>,
    pub member_count: u32,
    pub notify_team: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamMembersNode {
    pub id: String,
    pub rest_id: u64,
    pub name: String,
    pub description: String,
    pub privacy: TeamPrivacy,
    pub parent: Option<String>,
    pub review: ReviewSettings,
    pub members: Page<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: String,
    pub rest_id: u64,
    pub login: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTeam {
    pub id: String,
    pub rest_id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
    pub privacy: TeamPrivacy,
    pub parent_rest_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedTeam {
    pub id: String,
    pub rest_id: u64,
    pub slug: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentChange {
    Set(u64),
    Remove,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeamEdit {
    pub description: Option<String>,
    pub privacy: Option<TeamPrivacy>,
    pub parent: Option<ParentChange>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewAssignmentUpdate {
    pub enabled: bool,
    pub algorithm: Option<ReviewAlgorithm>,
    pub excluded_member_ids: Vec<String>,
    pub notify_team: bool,
    pub team_member_count: u32,
    pub include_child_team_members: Option<bool>,
}

static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("slug separator pattern is valid"));

/// The URL-friendly name the platform derives from a team name.
pub fn slug(name: &str) -> String {
    SLUG_SEPARATORS
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_client_sends_nothing() {
        let cancel = CancellationToken::new();
        let token = SecretString::from("token".to_string());
        let client = HttpClient::new(&token, cancel.clone()).unwrap();
        cancel.cancel();
        let err = client
            .req(Method::GET, &GitHubUrl::new("user".to_string()))
            .err()
            .expect("a cancelled client must not start requests");
        assert!(is_cancelled(&err));
    }

    #[test]
    fn team_slugs() {
        assert_eq!(slug("Core Team"), "core-team");
        assert_eq!(slug("rustup.rs"), "rustup-rs");
        assert_eq!(slug("--infra / ops!"), "infra-ops");
    }
}
