use std::{fmt, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const PER_PAGE: usize = 100;
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// A repository discovered by a gatherer. Immutable once created; the
/// resolved set holds these behind `Arc` and shares them with the analysis
/// engine read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub private: bool,
    pub fork: bool,
    pub clone_url: String,
}

impl RepositoryRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A validated organization, used as the owner context for org-scoped
/// repository lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgRef {
    pub login: String,
}

/// Failure modes of a single gather call.
///
/// `NotFound` and `AuthRequired` are per-target: the resolver records them
/// and keeps going. `Api` covers everything that survived the bounded retry.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("`{0}` was not found")]
    NotFound(String),

    #[error("authentication required for `{0}`")]
    AuthRequired(String),

    #[error("GitHub API error: {0}")]
    Api(#[from] anyhow::Error),
}

/// The four remote enumeration operations the target resolver drives.
///
/// Implemented by [`GitHubClient`] in production and by deterministic mocks
/// in tests; the resolver is generic over this trait and has no network
/// dependency of its own.
#[async_trait]
pub trait Gatherer: Sync {
    /// All repositories visible to a login.
    async fn repositories_for_login(&self, login: &str) -> Result<Vec<RepositoryRef>, GatherError>;

    /// Validate an organization's existence.
    async fn organization(&self, name: &str) -> Result<OrgRef, GatherError>;

    /// All repositories belonging to an already-validated organization.
    async fn organization_repositories(
        &self,
        org: &OrgRef,
    ) -> Result<Vec<RepositoryRef>, GatherError>;

    /// A single named repository scoped to a validated owner.
    async fn owner_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<RepositoryRef, GatherError>;
}

/// Thin REST client for github.com or a GitHub Enterprise endpoint.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: Url, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, api_url, token })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatherError> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid API path {path}"))
            .map_err(GatherError::Api)
    }

    /// One GET with bounded retry on transient failures (rate limiting,
    /// server errors, connection resets).
    async fn get(&self, url: Url, target: &str) -> Result<Value, GatherError> {
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            let mut req =
                self.http.get(url.clone()).header("Accept", "application/vnd.github+json");
            if let Some(token) = &self.token {
                req = req.bearer_auth(token);
            }
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Value>()
                            .await
                            .with_context(|| format!("Malformed API response for {target}"))
                            .map_err(GatherError::Api);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(GatherError::NotFound(target.to_string()));
                    }
                    if status == StatusCode::UNAUTHORIZED
                        || (status == StatusCode::FORBIDDEN && self.token.is_none())
                    {
                        return Err(GatherError::AuthRequired(target.to_string()));
                    }
                    let transient = status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::FORBIDDEN
                        || status.is_server_error();
                    if !transient || attempt == MAX_ATTEMPTS {
                        return Err(GatherError::Api(anyhow::anyhow!("{target}: HTTP {status}")));
                    }
                    warn!("Transient API failure for {target} (HTTP {status}), retrying");
                }
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(GatherError::Api(
                            anyhow::Error::new(e).context(format!("Request failed for {target}")),
                        ));
                    }
                    warn!("Request error for {target}: {e}, retrying");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
        unreachable!("retry loop always returns")
    }

    /// Walk a paginated listing endpoint until a short page is returned.
    async fn get_paginated(&self, path: &str, target: &str) -> Result<Vec<Value>, GatherError> {
        let mut items = Vec::new();
        for page in 1.. {
            let mut url = self.endpoint(path)?;
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            let body = self.get(url, target).await?;
            let page_items = body
                .as_array()
                .cloned()
                .context("Expected a JSON array from a listing endpoint")
                .map_err(GatherError::Api)?;
            let short_page = page_items.len() < PER_PAGE;
            items.extend(page_items);
            if short_page {
                break;
            }
        }
        Ok(items)
    }
}

fn repo_from_json(value: &Value) -> Option<RepositoryRef> {
    let owner = value.get("owner")?.get("login")?.as_str()?.to_string();
    let name = value.get("name")?.as_str()?.to_string();
    Some(RepositoryRef {
        owner,
        name,
        private: value.get("private").and_then(Value::as_bool).unwrap_or(false),
        fork: value.get("fork").and_then(Value::as_bool).unwrap_or(false),
        clone_url: value.get("clone_url").and_then(Value::as_str).unwrap_or_default().to_string(),
    })
}

#[async_trait]
impl Gatherer for GitHubClient {
    async fn repositories_for_login(&self, login: &str) -> Result<Vec<RepositoryRef>, GatherError> {
        let items = self.get_paginated(&format!("users/{login}/repos"), login).await?;
        let repos: Vec<_> = items.iter().filter_map(repo_from_json).collect();
        debug!("Enumerated {} repositories for login {login}", repos.len());
        Ok(repos)
    }

    async fn organization(&self, name: &str) -> Result<OrgRef, GatherError> {
        let body = self.get(self.endpoint(&format!("orgs/{name}"))?, name).await?;
        let login = body
            .get("login")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string());
        Ok(OrgRef { login })
    }

    async fn organization_repositories(
        &self,
        org: &OrgRef,
    ) -> Result<Vec<RepositoryRef>, GatherError> {
        let items = self.get_paginated(&format!("orgs/{}/repos", org.login), &org.login).await?;
        let repos: Vec<_> = items.iter().filter_map(repo_from_json).collect();
        debug!("Enumerated {} repositories for org {}", repos.len(), org.login);
        Ok(repos)
    }

    async fn owner_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<RepositoryRef, GatherError> {
        let target = format!("{owner}/{name}");
        let body = self.get(self.endpoint(&format!("repos/{owner}/{name}"))?, &target).await?;
        repo_from_json(&body)
            .with_context(|| format!("Malformed repository object for {target}"))
            .map_err(GatherError::Api)
    }
}
