//! `.mod` endpoint: the module manifest
//!
//! Resolution order: a cached tarball, then the raw file upstream. Either
//! failing degrades to a one-line stub so repositories without an explicit
//! manifest stay usable through the proxy.

use crate::application::archive_service::split_dir_file;
use crate::application::ProxyError;
use crate::domain::ResolvedRoute;
use crate::infrastructure::ForgeClient;
use crate::presentation::controllers::AppState;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

pub async fn get(
    state: &AppState,
    route: &ResolvedRoute,
    forge: &ForgeClient,
    version: &str,
) -> Result<Response, ProxyError> {
    let descriptor = state.versions.negotiate(route, forge, version).await?;

    if let Some(path) = descriptor.cache_path.clone() {
        if path.exists() {
            let clean_sub_path = route.clean_sub_path.clone();
            match tokio::task::spawn_blocking(move || {
                manifest_from_tarball(&path, &clean_sub_path)
            })
            .await?
            {
                Ok(Some(manifest)) => return Ok(manifest_response(manifest)),
                Ok(None) => return Ok(stub(route)),
                Err(err) => {
                    warn!(error = %err, "failed reading cached tarball, serving stub");
                    return Ok(stub(route));
                }
            }
        }
    }

    let manifest_path = if route.clean_sub_path.is_empty() {
        "go.mod".to_string()
    } else {
        format!("{}/go.mod", route.clean_sub_path)
    };
    match forge
        .fetch_raw_file(route, &descriptor.origin.hash, &manifest_path)
        .await
    {
        Ok(manifest) => Ok(manifest_response(manifest)),
        Err(err) => {
            debug!(error = %err, "manifest not found upstream, serving stub");
            Ok(stub(route))
        }
    }
}

fn stub(route: &ResolvedRoute) -> Response {
    format!("module {}\n", route.original_path).into_response()
}

fn manifest_response(manifest: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        manifest,
    )
        .into_response()
}

/// Scan a cached tarball for the manifest of the module directory
fn manifest_from_tarball(path: &Path, clean_sub_path: &str) -> io::Result<Option<Vec<u8>>> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some((_, rel)) = name.split_once('/') else {
            continue;
        };
        let (dir, file_name) = split_dir_file(rel);
        if dir.trim_end_matches('/') == clean_sub_path && file_name == "go.mod" {
            let mut manifest = Vec::new();
            entry.read_to_end(&mut manifest)?;
            return Ok(Some(manifest));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn finds_root_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("entry.tgz");
        write_tar_gz(
            &path,
            &[
                ("r/go.mod", b"module example.com/a\n"),
                ("r/sub/go.mod", b"module example.com/a/sub\n"),
            ],
        );
        let manifest = manifest_from_tarball(&path, "").unwrap().unwrap();
        assert_eq!(manifest, b"module example.com/a\n");
    }

    #[test]
    fn finds_sub_module_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("entry.tgz");
        write_tar_gz(
            &path,
            &[
                ("r/go.mod", b"module example.com/a\n"),
                ("r/sub/go.mod", b"module example.com/a/sub\n"),
            ],
        );
        let manifest = manifest_from_tarball(&path, "sub").unwrap().unwrap();
        assert_eq!(manifest, b"module example.com/a/sub\n");
    }

    #[test]
    fn missing_manifest_returns_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("entry.tgz");
        write_tar_gz(&path, &[("r/a.go", b"//a")]);
        assert_eq!(manifest_from_tarball(&path, "").unwrap(), None);
    }
}
