/// A URL to a GitHub REST endpoint.
#[derive(Clone, Debug)]
pub(crate) struct GitHubUrl {
    url: String,
}

impl GitHubUrl {
    pub(crate) fn new(url: String) -> Self {
        let https = "https://";
        let url = if url.starts_with(https) {
            url
        } else {
            format!("{https}api.github.com/{url}")
        };
        Self { url }
    }

    pub(crate) fn orgs(org: &str, remaining_endpoint: &str) -> anyhow::Result<Self> {
        validate_remaining_endpoint(remaining_endpoint)?;
        Ok(Self::new(format!("orgs/{org}/{remaining_endpoint}")))
    }

    pub(crate) fn repos(org: &str, repo: &str, remaining_endpoint: &str) -> anyhow::Result<Self> {
        validate_remaining_endpoint(remaining_endpoint)?;
        Ok(Self::new(format!("repos/{org}/{repo}/{remaining_endpoint}")))
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }
}

fn validate_remaining_endpoint(endpoint: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        !endpoint.starts_with('/'),
        "remaining endpoint {endpoint} should not start with a slash"
    );
    Ok(())
}
