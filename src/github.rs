//! GitHub repository listing.
//!
//! A thin paginated fetch over the REST API, driven synchronously through
//! [`crate::bridge`]. With a token the authenticated `/user/repos` endpoint
//! returns everything the user can reach (private and org repos included);
//! without one, public user repos are merged with each organization's
//! public repos.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::bridge;
use crate::errors::FleetError;
use crate::target::{Target, TargetSource, Visibility};

const GITHUB_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("gitfleet/", env!("CARGO_PKG_VERSION"));
const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(120);

/// A GitHub repository (subset of fields we care about).
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: GitHubOwner,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fork: bool,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub clone_url: String,
    pub ssh_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubOrg {
    login: String,
}

impl GitHubRepo {
    /// Map onto a [`Target`] checked out at `base_dir/<name>`.
    pub fn into_target(self, base_dir: &Path, authenticated: bool) -> Target {
        let clone_url = if authenticated {
            self.ssh_url
        } else {
            self.clone_url
        };
        let visibility = if self.private {
            Visibility::Private
        } else {
            Visibility::Public
        };

        let mut target = Target::new(&self.name, base_dir.join(&self.name))
            .with_owner(self.owner.login)
            .with_visibility(visibility)
            .with_flags(self.archived, self.fork)
            .with_clone_url(clone_url);
        // The API's own full_name wins over the owner/name we rebuilt.
        target.full_name = self.full_name;
        if let Some(branch) = self.default_branch {
            target = target.with_default_branch(branch);
        }
        if let Some(language) = self.language {
            target = target.with_language(language);
        }
        if let Some(description) = self.description {
            target = target.with_description(description);
        }
        target
    }
}

/// Drop repeats by repository id, keeping first occurrence order.
pub fn dedupe(repos: Vec<GitHubRepo>) -> Vec<GitHubRepo> {
    let mut seen = HashSet::new();
    repos.into_iter().filter(|r| seen.insert(r.id)).collect()
}

/// [`TargetSource`] backed by the GitHub REST API.
pub struct GitHubSource {
    base_dir: PathBuf,
    username: String,
    token: Option<String>,
    orgs: Vec<String>,
    api_url: String,
    timeout: Duration,
}

impl GitHubSource {
    pub fn new(base_dir: impl Into<PathBuf>, username: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            username: username.into(),
            token: None,
            orgs: Vec::new(),
            api_url: GITHUB_API_URL.to_string(),
            timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Extra organizations to list when running unauthenticated.
    pub fn with_orgs(mut self, orgs: Vec<String>) -> Self {
        self.orgs = orgs;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
        let req = client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Fetch every page of a repository listing.
    async fn fetch_all(
        &self,
        client: &reqwest::Client,
        url: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<GitHubRepo>> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let per_page = PER_PAGE.to_string();
            let mut query = vec![("per_page", per_page.as_str()), ("page", page_str.as_str())];
            query.extend_from_slice(extra);

            let resp = self
                .request(client, url)
                .query(&query)
                .send()
                .await
                .with_context(|| format!("Failed to send request to {}", url))?;

            if resp.status() == reqwest::StatusCode::FORBIDDEN {
                return Err(FleetError::GitHub("rate limit exceeded".into()).into());
            }
            let status = resp.status();
            if !status.is_success() {
                return Err(FleetError::GitHub(format!("{} returned {}", url, status)).into());
            }

            let repos: Vec<GitHubRepo> = resp
                .json()
                .await
                .with_context(|| format!("Failed to parse repository list from {}", url))?;
            let count = repos.len();
            all.extend(repos);

            if count < PER_PAGE {
                break; // Last page
            }
            page += 1;
        }

        debug!(url, count = all.len(), "listed repositories");
        Ok(all)
    }

    /// Public organizations of the user. Best effort: failures yield none.
    async fn user_orgs(&self, client: &reqwest::Client) -> Vec<String> {
        let url = format!("{}/users/{}/orgs", self.api_url, self.username);
        let resp = match self.request(client, &url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!(status = %resp.status(), "could not list organizations");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "could not list organizations");
                return Vec::new();
            }
        };
        match resp.json::<Vec<GitHubOrg>>().await {
            Ok(orgs) => orgs.into_iter().map(|o| o.login).collect(),
            Err(e) => {
                warn!(error = %e, "could not parse organization list");
                Vec::new()
            }
        }
    }

    async fn list_repos(&self) -> Result<Vec<GitHubRepo>> {
        let client = reqwest::Client::new();

        if self.is_authenticated() {
            info!("listing repositories with token");
            let url = format!("{}/user/repos", self.api_url);
            let repos = self
                .fetch_all(
                    &client,
                    &url,
                    &[("affiliation", "owner,collaborator,organization_member")],
                )
                .await?;
            return Ok(dedupe(repos));
        }

        info!(user = %self.username, "listing public repositories");
        let url = format!("{}/users/{}/repos", self.api_url, self.username);
        let mut repos = self.fetch_all(&client, &url, &[]).await?;

        let mut orgs = self.user_orgs(&client).await;
        for org in &self.orgs {
            if !orgs.iter().any(|o| o.eq_ignore_ascii_case(org)) {
                orgs.push(org.clone());
            }
        }
        for org in &orgs {
            let url = format!("{}/orgs/{}/repos", self.api_url, org);
            match self.fetch_all(&client, &url, &[]).await {
                Ok(org_repos) => {
                    info!(org = %org, count = org_repos.len(), "listed organization repositories");
                    repos.extend(org_repos);
                }
                Err(e) => warn!(org = %org, error = %e, "skipping organization"),
            }
        }

        Ok(dedupe(repos))
    }
}

impl TargetSource for GitHubSource {
    fn list(&self) -> Result<Vec<Target>> {
        let repos = bridge::block_on_with_timeout(self.timeout, self.list_repos())
            .map_err(FleetError::from)??;
        info!(count = repos.len(), "found unique repositories");
        let authenticated = self.is_authenticated();
        Ok(repos
            .into_iter()
            .map(|r| r.into_target(&self.base_dir, authenticated))
            .collect())
    }
}
