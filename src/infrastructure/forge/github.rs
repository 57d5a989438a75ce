//! GitHub forge adapter
//!
//! Metadata goes through octocrab against the REST API; archives are fetched
//! in two steps, capturing the pre-signed tarball location from a redirect
//! and downloading it with a plain GET.

use super::{ForgeError, ForgeInitError, UpstreamHttp};
use crate::domain::{Commit, ResolvedRoute};
use base64::Engine;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use reqwest::header;
use serde_json::Value;
use tracing::debug;

/// Client for github.com or a GitHub Enterprise instance
#[derive(Debug)]
pub struct GitHubForge {
    octo: Octocrab,
    no_redirect: reqwest::Client,
    plain: reqwest::Client,
    api_base: String,
    token: String,
}

/// Normalise a configured git-url into an API base.
///
/// Self-hosted instances serve the API under `/api/v3/`; hosts that already
/// point at an API endpoint (`api.` prefix or an explicit `/api/v3/` path)
/// are left alone.
fn normalize_api_base(api_url: &str) -> Result<String, ForgeInitError> {
    let mut url = url::Url::parse(api_url).map_err(|e| ForgeInitError::InvalidUrl {
        url: api_url.to_string(),
        reason: e.to_string(),
    })?;
    let mut path = url.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    let host = url.host_str().unwrap_or_default().to_string();
    if !path.ends_with("/api/v3/") && !host.starts_with("api.") && !host.contains(".api.") {
        path.push_str("api/v3/");
    }
    url.set_path(&path);
    Ok(url.to_string())
}

impl GitHubForge {
    pub fn new(api_url: &str, token: &str, http: &UpstreamHttp) -> Result<Self, ForgeInitError> {
        let api_base = normalize_api_base(api_url)?;
        let mut builder = Octocrab::builder()
            .base_uri(api_base.clone())
            .map_err(|e| ForgeInitError::GitHub(e.to_string()))?;
        if !token.is_empty() {
            builder = builder.personal_token(token.to_string());
        }
        let octo = builder
            .build()
            .map_err(|e| ForgeInitError::GitHub(e.to_string()))?;
        Ok(GitHubForge {
            octo,
            no_redirect: http.no_redirect.clone(),
            plain: http.client.clone(),
            api_base,
            token: token.to_string(),
        })
    }

    async fn get_json(&self, path: String) -> Result<Value, ForgeError> {
        self.octo
            .get(path, None::<&()>)
            .await
            .map_err(|e| ForgeError::Api(e.to_string()))
    }

    pub async fn resolve_commit(
        &self,
        route: &ResolvedRoute,
        reference: &str,
    ) -> Result<Commit, ForgeError> {
        let path = format!("repos/{}/{}/commits/{}", route.group, route.repo, reference);
        debug!(%path, "github commit lookup");
        let value = self.get_json(path).await?;
        parse_commit(&value)
    }

    pub async fn list_tags(
        &self,
        route: &ResolvedRoute,
        limit: usize,
    ) -> Result<Vec<String>, ForgeError> {
        let path = format!("repos/{}/{}/tags?per_page={}", route.group, route.repo, limit);
        let value = self.get_json(path).await?;
        let entries = value
            .as_array()
            .ok_or_else(|| ForgeError::Decode("tag list is not an array".to_string()))?;
        Ok(entries
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    pub async fn list_commits(
        &self,
        route: &ResolvedRoute,
        limit: usize,
    ) -> Result<Vec<Commit>, ForgeError> {
        let path = format!(
            "repos/{}/{}/commits?per_page={}",
            route.group, route.repo, limit
        );
        let value = self.get_json(path).await?;
        let entries = value
            .as_array()
            .ok_or_else(|| ForgeError::Decode("commit list is not an array".to_string()))?;
        entries.iter().map(parse_commit).collect()
    }

    pub async fn stream_archive(
        &self,
        route: &ResolvedRoute,
        sha: &str,
    ) -> Result<reqwest::Response, ForgeError> {
        let url = format!(
            "{}repos/{}/{}/tarball/{}",
            self.api_base, route.group, route.repo, sha
        );
        let mut request = self.no_redirect.get(&url);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }
        let response = request.send().await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ForgeError::Decode("archive redirect without location".to_string()))?
                .to_string();
            debug!(%location, "github archive link");
            // the location is pre-signed, so no credentials are attached
            let response = self.plain.get(&location).send().await?;
            if !response.status().is_success() {
                return Err(ForgeError::Status {
                    status: response.status().as_u16(),
                    context: location,
                });
            }
            return Ok(response);
        }
        if status.is_success() {
            return Ok(response);
        }
        Err(ForgeError::Status {
            status: status.as_u16(),
            context: url,
        })
    }

    pub async fn fetch_raw_file(
        &self,
        route: &ResolvedRoute,
        sha: &str,
        path_in_repo: &str,
    ) -> Result<Vec<u8>, ForgeError> {
        let path = format!(
            "repos/{}/{}/contents/{}?ref={}",
            route.group, route.repo, path_in_repo, sha
        );
        let value = self.get_json(path).await?;
        let encoded = value
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ForgeError::NotFound(format!("no content for {path_in_repo}")))?;
        // GitHub returns base64 with embedded newlines
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| ForgeError::Decode(e.to_string()))
    }
}

fn parse_commit(value: &Value) -> Result<Commit, ForgeError> {
    let id = value
        .get("sha")
        .and_then(Value::as_str)
        .ok_or_else(|| ForgeError::Decode("commit without sha".to_string()))?;
    let date = value
        .pointer("/commit/committer/date")
        .and_then(Value::as_str)
        .ok_or_else(|| ForgeError::Decode("commit without committer date".to_string()))?;
    let committed_at = DateTime::parse_from_rfc3339(date)
        .map_err(|e| ForgeError::Decode(e.to_string()))?
        .with_timezone(&Utc);
    Ok(Commit {
        id: id.to_string(),
        committed_at,
    })
}
