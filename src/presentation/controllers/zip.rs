//! `.zip` endpoint: the repackaged module archive
//!
//! The upstream tarball is staged in a spill buffer, optionally persisted to
//! the local cache, then repackaged into a zip whose length is known before
//! the response is committed. Cache write failures downgrade to streaming
//! straight from the staging buffer.

use crate::application::{repack_to_zip, ProxyError};
use crate::domain::ResolvedRoute;
use crate::infrastructure::{ForgeClient, ModuleCache, SpoolBuffer};
use crate::presentation::controllers::AppState;
use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use std::fs::File;
use std::io::{self, Read, Write};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

const SOURCE_SPOOL_MEM: usize = 512 << 10;
const SOURCE_SPOOL_BLOCK: usize = 64 << 10;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub async fn get(
    state: &AppState,
    route: &ResolvedRoute,
    forge: &ForgeClient,
    module: &str,
    version: &str,
) -> Result<Response, ProxyError> {
    let descriptor = state.versions.negotiate(route, forge, version).await?;

    // a tarball already on disk is the canonical source
    if let Some(path) = descriptor.cache_path.clone() {
        if path.exists() {
            let module = module.to_string();
            let clean_sub_path = route.clean_sub_path.clone();
            let version = descriptor.version.clone();
            let spool = tokio::task::spawn_blocking(move || {
                let mut file = File::open(&path)?;
                repack_to_zip(&mut file, &module, &clean_sub_path, &version)
            })
            .await??;
            return Ok(zip_response(spool));
        }
    }

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
    let clean_sub_path = route.clean_sub_path.clone();
    let version = descriptor.version.clone();
    let spool = tokio::task::spawn_blocking(move || -> Result<SpoolBuffer, ProxyError> {
        let mut magic = [0u8; 2];
        let n = source.read_at(&mut magic, 0)?;
        if n < 2 || magic != GZIP_MAGIC {
            return Err(ProxyError::NotGzip { module });
        }

        if let (Some(dir), Some(path)) = (&descriptor.cache_dir, &descriptor.cache_path) {
            match ModuleCache::store(dir, path, &mut source) {
                Ok(mut cached) => return repack_to_zip(&mut cached, &module, &clean_sub_path, &version),
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "cache write failed, streaming through");
                }
            }
        }
        repack_to_zip(&mut source, &module, &clean_sub_path, &version)
    })
    .await??;

    Ok(zip_response(spool))
}

/// Stream a finished spill buffer with an exact `Content-Length`
pub(crate) fn zip_response(mut spool: SpoolBuffer) -> Response {
    let length = spool.len();
    spool.rewind();

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(4);
    tokio::task::spawn_blocking(move || {
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            match spool.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&chunk[..n]))).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.blocking_send(Err(err));
                    break;
                }
            }
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap()
}
