//! Application layer error types

use crate::infrastructure::ForgeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the proxy pipeline.
///
/// Responses are plain text: the `go` command displays version-resolution
/// notices verbatim, so their wording is part of the wire contract.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("404 page not found")]
    RouteNotFound,

    /// Carries the full package-manager-formatted notice
    #[error("{0}")]
    VersionNotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("archive is not TGZ: {module}")]
    NotGzip { module: String },

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ForgeError> for ProxyError {
    fn from(err: ForgeError) -> Self {
        ProxyError::Upstream(err.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::RouteNotFound | ProxyError::VersionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("{self}\n")).into_response()
    }
}
