//! `list` endpoint: known versions, one per line

use crate::application::ProxyError;
use crate::domain::{compact_date, pseudo_version, ResolvedRoute};
use crate::infrastructure::ForgeClient;
use axum::response::{IntoResponse, Response};

/// Tag page size; large enough to filter client-side when a major version
/// restricts the listing
const MAJOR_FILTER_LIMIT: usize = 1000;
const DEFAULT_LIMIT: usize = 10;

pub async fn get(route: &ResolvedRoute, forge: &ForgeClient) -> Result<Response, ProxyError> {
    let limit = if route.major_version.is_some() {
        MAJOR_FILTER_LIMIT
    } else {
        DEFAULT_LIMIT
    };
    let tags = forge.list_tags(route, limit).await.map_err(ProxyError::from)?;

    let mut body = String::new();
    if let Some(major) = &route.major_version {
        let prefix = format!("{major}.");
        for tag in &tags {
            if tag == major || tag.starts_with(&prefix) {
                body.push_str(tag);
                body.push('\n');
            }
        }
        return Ok(body.into_response());
    }

    if !tags.is_empty() {
        for tag in &tags {
            body.push_str(tag);
            body.push('\n');
        }
        return Ok(body.into_response());
    }

    let commits = forge
        .list_commits(route, DEFAULT_LIMIT)
        .await
        .map_err(ProxyError::from)?;
    for commit in commits {
        body.push_str(&pseudo_version(&compact_date(&commit.committed_at), &commit.id));
        body.push('\n');
    }
    Ok(body.into_response())
}
