//! Version negotiation
//!
//! Resolves a requested version string against a resolved route: the local
//! cache is probed first, then the upstream forge, and the answer is folded
//! into a canonical [`VersionDescriptor`].

use crate::application::errors::ProxyError;
use crate::domain::{
    compact_date, parse_compact_date, parse_version_query, pseudo_version, Origin, ResolvedRoute,
    VersionDescriptor,
};
use crate::infrastructure::{ForgeClient, ForgeError, ModuleCache};
use std::sync::Arc;
use tracing::debug;

pub struct VersionService {
    cache: Option<Arc<ModuleCache>>,
}

impl VersionService {
    pub fn new(cache: Option<Arc<ModuleCache>>) -> Self {
        VersionService { cache }
    }

    /// Resolve `requested` for a route into a canonical descriptor.
    ///
    /// Version-resolution failures come back as
    /// [`ProxyError::VersionNotFound`] carrying the notice text the `go`
    /// command expects.
    pub async fn negotiate(
        &self,
        route: &ResolvedRoute,
        forge: &ForgeClient,
        requested: &str,
    ) -> Result<VersionDescriptor, ProxyError> {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.probe(route, requested) {
                if let Some(time) = parse_compact_date(&entry.date) {
                    let version = if entry.version.is_empty() {
                        pseudo_version(&entry.date, &entry.sha)
                    } else {
                        entry.version.clone()
                    };
                    return Ok(VersionDescriptor {
                        version,
                        time,
                        origin: Origin {
                            vcs: "cache".to_string(),
                            url: String::new(),
                            ref_name: String::new(),
                            hash: entry.sha.clone(),
                        },
                        cache_dir: Some(entry.dir),
                        cache_path: Some(entry.path),
                    });
                }
            }
        }

        let query = parse_version_query(requested);
        debug!(search = %query.search, module = %route.base_group_repo(), "resolving version upstream");

        let commit = forge
            .resolve_commit(route, &query.search)
            .await
            .map_err(|err| {
                let notice = match err {
                    ForgeError::Offline => format!(
                        "not found: {}@{}: invalid version: unknown revision",
                        route.base_group_repo(),
                        requested
                    ),
                    other => format!(
                        "not found: {}@{}: invalid version: unknown revision, {}",
                        route.base_group_repo(),
                        requested,
                        other
                    ),
                };
                ProxyError::VersionNotFound(notice)
            })?;

        // when the search term was not a commit id, keep the requested tag
        let mut version = if commit.id.starts_with(&query.search) {
            String::new()
        } else {
            requested.to_string()
        };

        let date = compact_date(&commit.committed_at);
        let cache_dir = self.cache.as_ref().map(|c| c.module_dir(route));
        let mut origin = Origin {
            vcs: "git".to_string(),
            url: forge.origin_url(route),
            ref_name: String::new(),
            hash: commit.id.clone(),
        };

        let cache_path;
        if version.is_empty() {
            version = pseudo_version(&date, &commit.id);
            cache_path = cache_dir
                .as_ref()
                .map(|dir| dir.join(ModuleCache::entry_file_name("", &date, &commit.id)));
        } else {
            origin.ref_name = format!("refs/tags/{version}");
            cache_path = cache_dir
                .as_ref()
                .map(|dir| dir.join(ModuleCache::entry_file_name(&version, &date, &commit.id)));
        }

        if let Some(pseudo_date) = &query.pseudo_date {
            if *pseudo_date != date {
                return Err(ProxyError::VersionNotFound(format!(
                    "not found: {}@{}: invalid pseudo-version: does not match version-control timestamp (expected {})",
                    route.base_group_repo(),
                    pseudo_date,
                    date
                )));
            }
        }

        Ok(VersionDescriptor {
            version,
            time: commit.committed_at,
            origin,
            cache_dir,
            cache_path,
        })
    }

    /// Descriptor for the newest tag, falling back to the newest commit
    pub async fn latest(
        &self,
        route: &ResolvedRoute,
        forge: &ForgeClient,
    ) -> Result<VersionDescriptor, ProxyError> {
        let tags = forge.list_tags(route, 1).await.map_err(ProxyError::from)?;
        if let Some(tag) = tags.first() {
            return self.negotiate(route, forge, tag).await;
        }

        let commits = forge
            .list_commits(route, 1)
            .await
            .map_err(ProxyError::from)?;
        let commit = commits.into_iter().next().ok_or_else(|| {
            ProxyError::VersionNotFound(format!(
                "not found: {}@latest: invalid version: unknown revision",
                route.base_group_repo()
            ))
        })?;
        let date = compact_date(&commit.committed_at);
        Ok(VersionDescriptor {
            version: pseudo_version(&date, &commit.id),
            time: commit.committed_at,
            origin: Origin {
                vcs: "git".to_string(),
                url: forge.origin_url(route),
                ref_name: String::new(),
                hash: commit.id,
            },
            cache_dir: None,
            cache_path: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::forge::GitLabForge;

    const SHA: &str = "deadbeefcafe0012deadbeefcafe0012deadbeef";
    const DATE: &str = "20240302101112";

    fn route() -> ResolvedRoute {
        ResolvedRoute {
            original_path: "example.com/a".into(),
            base: "forge-b.test".into(),
            group: "org".into(),
            repo: "a".into(),
            ..Default::default()
        }
    }

    fn gitlab_forge(server: &mockito::Server) -> ForgeClient {
        ForgeClient::GitLab(GitLabForge::new(reqwest::Client::new(), &server.url(), ""))
    }

    async fn mock_commit(server: &mut mockito::Server, reference: &str) -> mockito::Mock {
        server
            .mock(
                "GET",
                format!("/api/v4/projects/org%2Fa/repository/commits/{reference}").as_str(),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"id":"{SHA}","committed_date":"2024-03-02T10:11:12Z"}}"#
            ))
            .create_async()
            .await
    }

    #[tokio::test]
    async fn pseudo_version_round_trips() {
        let mut server = mockito::Server::new_async().await;
        mock_commit(&mut server, "deadbeefcafe").await;
        let forge = gitlab_forge(&server);
        let service = VersionService::new(None);

        let first = service
            .negotiate(&route(), &forge, &format!("v0.0.0-{DATE}-deadbeefcafe"))
            .await
            .unwrap();
        assert_eq!(first.version, format!("v0.0.0-{DATE}-deadbeefcafe"));
        assert_eq!(first.origin.hash, SHA);
        assert_eq!(first.origin.vcs, "git");
        assert_eq!(first.origin.ref_name, "");

        let again = service
            .negotiate(&route(), &forge, &first.version)
            .await
            .unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn tagged_version_keeps_tag_and_sets_ref() {
        let mut server = mockito::Server::new_async().await;
        mock_commit(&mut server, "v1.4.0").await;
        let forge = gitlab_forge(&server);
        let service = VersionService::new(None);

        let descriptor = service.negotiate(&route(), &forge, "v1.4.0").await.unwrap();
        assert_eq!(descriptor.version, "v1.4.0");
        assert_eq!(descriptor.origin.ref_name, "refs/tags/v1.4.0");
        assert_eq!(descriptor.origin.url, "https://forge-b.test/org/a.git");
        assert_eq!(descriptor.time_rfc3339(), "2024-03-02T10:11:12Z");
    }

    #[tokio::test]
    async fn date_mismatch_is_rejected_with_notice() {
        let mut server = mockito::Server::new_async().await;
        mock_commit(&mut server, "deadbeefcafe").await;
        let forge = gitlab_forge(&server);
        let service = VersionService::new(None);

        let err = service
            .negotiate(&route(), &forge, "v0.0.0-20240101000000-deadbeefcafe")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "not found: forge-b.test/org/a@20240101000000: invalid pseudo-version: \
                 does not match version-control timestamp (expected {DATE})"
            )
        );
    }

    #[tokio::test]
    async fn unknown_revision_notice_includes_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/org%2Fa/repository/commits/v9.9.9")
            .with_status(404)
            .with_body(r#"{"message":"404 Commit Not Found"}"#)
            .create_async()
            .await;
        let forge = gitlab_forge(&server);
        let service = VersionService::new(None);

        let err = service.negotiate(&route(), &forge, "v9.9.9").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "not found: forge-b.test/org/a@v9.9.9: invalid version: unknown revision, 404 404 Commit Not Found"
        );
    }

    #[tokio::test]
    async fn offline_forge_yields_bare_notice() {
        let service = VersionService::new(None);
        let err = service
            .negotiate(&route(), &ForgeClient::Offline, "v1.0.0")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "not found: forge-b.test/org/a@v1.0.0: invalid version: unknown revision"
        );
    }

    #[tokio::test]
    async fn cache_hit_answers_without_upstream() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(ModuleCache::new(tmp.path().to_path_buf()));
        let dir = cache.module_dir(&route());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(ModuleCache::entry_file_name("v1.4.0", DATE, SHA)),
            b"tarball",
        )
        .unwrap();

        let service = VersionService::new(Some(cache));
        // the offline forge proves no upstream call happens
        let descriptor = service
            .negotiate(&route(), &ForgeClient::Offline, "v1.4.0")
            .await
            .unwrap();
        assert_eq!(descriptor.version, "v1.4.0");
        assert_eq!(descriptor.origin.vcs, "cache");
        assert_eq!(descriptor.origin.hash, SHA);
        assert!(descriptor.cache_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn cached_pseudo_entry_synthesizes_version() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(ModuleCache::new(tmp.path().to_path_buf()));
        let dir = cache.module_dir(&route());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(ModuleCache::entry_file_name("", DATE, SHA)),
            b"tarball",
        )
        .unwrap();

        let service = VersionService::new(Some(cache));
        let requested = format!("v0.0.0-{DATE}-{}", &SHA[..12]);
        let descriptor = service
            .negotiate(&route(), &ForgeClient::Offline, &requested)
            .await
            .unwrap();
        assert_eq!(descriptor.version, requested);
        assert_eq!(descriptor.origin.vcs, "cache");
    }

    #[tokio::test]
    async fn miss_with_cache_computes_write_location() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(ModuleCache::new(tmp.path().to_path_buf()));
        let mut server = mockito::Server::new_async().await;
        mock_commit(&mut server, "v1.4.0").await;
        let forge = gitlab_forge(&server);

        let service = VersionService::new(Some(cache.clone()));
        let descriptor = service.negotiate(&route(), &forge, "v1.4.0").await.unwrap();
        assert_eq!(
            descriptor.cache_path.unwrap(),
            cache
                .module_dir(&route())
                .join(format!("v1.4.0{DATE}-{SHA}.tgz"))
        );
    }
}
