//! GitLab forge adapter
//!
//! Talks to the GitLab REST API v4. Projects are addressed by their
//! URL-encoded `group/repo` path, and archives stream directly from the
//! `repository/archive.tar.gz` endpoint.

use super::ForgeError;
use crate::domain::{Commit, ResolvedRoute};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GitLabCommit {
    id: String,
    committed_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitLabTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabMessage {
    message: String,
}

/// Client for one GitLab instance
#[derive(Debug)]
pub struct GitLabForge {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitLabForge {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str) -> Self {
        GitLabForge {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn project_url(&self, route: &ResolvedRoute) -> String {
        format!(
            "{}/api/v4/projects/{}",
            self.base_url,
            urlencoding::encode(&route.group_repo())
        )
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, ForgeError> {
        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if !self.token.is_empty() {
            request = request.header("PRIVATE-TOKEN", &self.token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let message = response
                .json::<GitLabMessage>()
                .await
                .map(|m| m.message)
                .unwrap_or_else(|_| "Not Found".to_string());
            return Err(ForgeError::NotFound(format!("404 {message}")));
        }
        if !status.is_success() {
            return Err(ForgeError::Status {
                status: status.as_u16(),
                context: url.to_string(),
            });
        }
        Ok(response)
    }

    pub async fn resolve_commit(
        &self,
        route: &ResolvedRoute,
        reference: &str,
    ) -> Result<Commit, ForgeError> {
        let url = format!(
            "{}/repository/commits/{}",
            self.project_url(route),
            urlencoding::encode(reference)
        );
        debug!(%url, "gitlab commit lookup");
        let commit: GitLabCommit = self
            .get(&url, &[])
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(Commit {
            id: commit.id,
            committed_at: commit.committed_date,
        })
    }

    pub async fn list_tags(
        &self,
        route: &ResolvedRoute,
        limit: usize,
    ) -> Result<Vec<String>, ForgeError> {
        let url = format!("{}/repository/tags", self.project_url(route));
        let per_page = limit.to_string();
        let tags: Vec<GitLabTag> = self
            .get(&url, &[("per_page", per_page.as_str())])
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    pub async fn list_commits(
        &self,
        route: &ResolvedRoute,
        limit: usize,
    ) -> Result<Vec<Commit>, ForgeError> {
        let url = format!("{}/repository/commits", self.project_url(route));
        let per_page = limit.to_string();
        let commits: Vec<GitLabCommit> = self
            .get(&url, &[("per_page", per_page.as_str())])
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(commits
            .into_iter()
            .map(|c| Commit {
                id: c.id,
                committed_at: c.committed_date,
            })
            .collect())
    }

    pub async fn stream_archive(
        &self,
        route: &ResolvedRoute,
        sha: &str,
    ) -> Result<reqwest::Response, ForgeError> {
        let url = format!("{}/repository/archive.tar.gz", self.project_url(route));
        debug!(%url, sha, "gitlab archive stream");
        self.get(&url, &[("sha", sha)]).await
    }

    pub async fn fetch_raw_file(
        &self,
        route: &ResolvedRoute,
        sha: &str,
        path_in_repo: &str,
    ) -> Result<Vec<u8>, ForgeError> {
        let url = format!(
            "{}/repository/files/{}/raw",
            self.project_url(route),
            urlencoding::encode(path_in_repo)
        );
        let response = self.get(&url, &[("ref", sha)]).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
