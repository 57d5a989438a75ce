//! Upstream forge adapters
//!
//! Every configured git connection resolves to one [`ForgeClient`] variant.
//! The variants share a small capability set: resolve a ref to a commit, list
//! tags, list commits, stream an archive, and fetch a raw file. Callers never
//! see the concrete client type outside construction.

pub mod github;
pub mod gitlab;

use crate::config::ForgeKind;
use crate::domain::{Commit, ResolvedRoute};
use thiserror::Error;

pub use github::GitHubForge;
pub use gitlab::GitLabForge;

/// User agent sent on upstream requests
pub const USER_AGENT: &str = concat!("modgate/", env!("CARGO_PKG_VERSION"));

/// Errors from upstream forge calls
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("{0}")]
    NotFound(String),

    #[error("unexpected status {status} from {context}")]
    Status { status: u16, context: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("no git client available")]
    Offline,
}

/// Errors constructing a forge client at startup
#[derive(Error, Debug)]
pub enum ForgeInitError {
    #[error("invalid git-url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build github client: {0}")]
    GitHub(String),
}

/// Shared upstream HTTP clients.
///
/// `no_redirect` has redirects disabled so pre-signed archive locations can
/// be captured and fetched with `client` as a plain GET.
#[derive(Clone)]
pub struct UpstreamHttp {
    pub client: reqwest::Client,
    pub no_redirect: reqwest::Client,
}

impl Default for UpstreamHttp {
    fn default() -> Self {
        UpstreamHttp {
            client: reqwest::Client::new(),
            no_redirect: reqwest::Client::new(),
        }
    }
}

/// An upstream adapter, tagged by forge family
#[derive(Debug)]
pub enum ForgeClient {
    GitLab(GitLabForge),
    GitHub(GitHubForge),
    /// Rejects every network call; used when modules are expected to come
    /// entirely from the local cache
    Offline,
}

/// Build a forge client for a configured git connection
pub fn connect(
    kind: ForgeKind,
    api_url: &str,
    token: &str,
    http: &UpstreamHttp,
) -> Result<ForgeClient, ForgeInitError> {
    match kind {
        ForgeKind::GitLab => Ok(ForgeClient::GitLab(GitLabForge::new(
            http.client.clone(),
            api_url,
            token,
        ))),
        ForgeKind::GitHub => Ok(ForgeClient::GitHub(GitHubForge::new(api_url, token, http)?)),
        ForgeKind::Offline => Ok(ForgeClient::Offline),
    }
}

impl ForgeClient {
    /// Resolve a tag, branch, or (short) commit id to a concrete commit
    pub async fn resolve_commit(
        &self,
        route: &ResolvedRoute,
        reference: &str,
    ) -> Result<Commit, ForgeError> {
        match self {
            ForgeClient::GitLab(forge) => forge.resolve_commit(route, reference).await,
            ForgeClient::GitHub(forge) => forge.resolve_commit(route, reference).await,
            ForgeClient::Offline => Err(ForgeError::Offline),
        }
    }

    /// List tag names, newest first
    pub async fn list_tags(
        &self,
        route: &ResolvedRoute,
        limit: usize,
    ) -> Result<Vec<String>, ForgeError> {
        match self {
            ForgeClient::GitLab(forge) => forge.list_tags(route, limit).await,
            ForgeClient::GitHub(forge) => forge.list_tags(route, limit).await,
            ForgeClient::Offline => Err(ForgeError::Offline),
        }
    }

    /// List commits, newest first
    pub async fn list_commits(
        &self,
        route: &ResolvedRoute,
        limit: usize,
    ) -> Result<Vec<Commit>, ForgeError> {
        match self {
            ForgeClient::GitLab(forge) => forge.list_commits(route, limit).await,
            ForgeClient::GitHub(forge) => forge.list_commits(route, limit).await,
            ForgeClient::Offline => Err(ForgeError::Offline),
        }
    }

    /// Open a gzip-compressed tar stream of the repository at a commit
    pub async fn stream_archive(
        &self,
        route: &ResolvedRoute,
        sha: &str,
    ) -> Result<reqwest::Response, ForgeError> {
        match self {
            ForgeClient::GitLab(forge) => forge.stream_archive(route, sha).await,
            ForgeClient::GitHub(forge) => forge.stream_archive(route, sha).await,
            ForgeClient::Offline => Err(ForgeError::Offline),
        }
    }

    /// Fetch a single file at a commit
    pub async fn fetch_raw_file(
        &self,
        route: &ResolvedRoute,
        sha: &str,
        path_in_repo: &str,
    ) -> Result<Vec<u8>, ForgeError> {
        match self {
            ForgeClient::GitLab(forge) => forge.fetch_raw_file(route, sha, path_in_repo).await,
            ForgeClient::GitHub(forge) => forge.fetch_raw_file(route, sha, path_in_repo).await,
            ForgeClient::Offline => Err(ForgeError::Offline),
        }
    }

    /// Repository URL reported in version descriptors
    pub fn origin_url(&self, route: &ResolvedRoute) -> String {
        match self {
            ForgeClient::GitLab(_) => format!("https://{}.git", route.base_group_repo()),
            ForgeClient::GitHub(_) => format!("https://{}", route.base_group_repo()),
            ForgeClient::Offline => String::new(),
        }
    }
}
