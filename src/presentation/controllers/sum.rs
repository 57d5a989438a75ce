//! `.sum` endpoint: the tree and manifest checksums

use crate::application::{compute_checksums, ModuleChecksums, ProxyError};
use crate::domain::ResolvedRoute;
use crate::infrastructure::{ForgeClient, SpoolBuffer};
use crate::presentation::controllers::AppState;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use std::fs::File;
use std::io::Write;

const SOURCE_SPOOL_MEM: usize = 512 << 10;
const SOURCE_SPOOL_BLOCK: usize = 64 << 10;

pub async fn get(
    state: &AppState,
    route: &ResolvedRoute,
    forge: &ForgeClient,
    module: &str,
    version: &str,
) -> Result<Response, ProxyError> {
    let descriptor = state.versions.negotiate(route, forge, version).await?;
    let final_version = descriptor.version.clone();

    let sums: ModuleChecksums;
    if let Some(path) = descriptor.cache_path.clone().filter(|p| p.exists()) {
        let module = module.to_string();
        let version = final_version.clone();
        sums = tokio::task::spawn_blocking(move || {
            let mut file = File::open(&path)?;
            compute_checksums(&mut file, &module, &version)
        })
        .await??;
    } else {
        let upstream = forge
            .stream_archive(route, &descriptor.origin.hash)
            .await
            .map_err(ProxyError::from)?;
        let mut source = SpoolBuffer::new(SOURCE_SPOOL_MEM, SOURCE_SPOOL_BLOCK);
        let mut stream = upstream.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProxyError::Upstream(e.to_string()))?;
            source.write_all(&chunk)?;
        }
        let module = module.to_string();
        let version = final_version.clone();
        sums = tokio::task::spawn_blocking(move || {
            compute_checksums(&mut source, &module, &version)
        })
        .await??;
    }

    let mut body = String::new();
    body.push_str(&format!("{module} {final_version} h1:{}\n", sums.tree));
    if let Some(manifest) = &sums.manifest {
        body.push_str(&format!("{module} {final_version}/go.mod h1:{manifest}\n"));
    }
    Ok(body.into_response())
}
