//! `@latest` endpoint: descriptor of the newest tag or commit

use crate::application::ProxyError;
use crate::domain::ResolvedRoute;
use crate::infrastructure::ForgeClient;
use crate::presentation::controllers::AppState;
use crate::presentation::models::VersionInfo;
use axum::response::{IntoResponse, Json, Response};

pub async fn get(
    state: &AppState,
    route: &ResolvedRoute,
    forge: &ForgeClient,
) -> Result<Response, ProxyError> {
    let descriptor = state.versions.latest(route, forge).await?;
    Ok(Json(VersionInfo::from(&descriptor)).into_response())
}
