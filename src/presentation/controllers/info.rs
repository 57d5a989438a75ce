//! `.info` endpoint: the JSON version descriptor

use crate::application::ProxyError;
use crate::domain::ResolvedRoute;
use crate::infrastructure::ForgeClient;
use crate::presentation::controllers::AppState;
use crate::presentation::models::VersionInfo;
use axum::response::{IntoResponse, Json, Response};
use tracing::debug;

pub async fn get(
    state: &AppState,
    route: &ResolvedRoute,
    forge: &ForgeClient,
    version: &str,
) -> Result<Response, ProxyError> {
    let descriptor = state.versions.negotiate(route, forge, version).await?;
    debug!(version = %descriptor.version, hash = %descriptor.origin.hash, "resolved version");
    Ok(Json(VersionInfo::from(&descriptor)).into_response())
}
