//! Route definitions and goproxy URL parsing
//!
//! Module paths contain slashes, which rules out ordinary path captures, so
//! a single fallback handler parses the goproxy URL shape by hand:
//! `/{module}/@v/{version}.{info|mod|zip|sum}`, `/{module}/@v/list`, and
//! `/{module}/@latest`.

use crate::application::{ProxyError, VersionService};
use crate::config::Config;
use crate::infrastructure::{ModuleCache, Resolver, ResolverError, UpstreamHttp};
use crate::presentation::controllers::{self, AppState};
use axum::extract::State;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Archive transforms of large repositories can legitimately take minutes
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60 * 60);

/// Which proxy operation a URL names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyEndpoint {
    Info,
    Mod,
    Zip,
    Sum,
    List,
    Latest,
}

/// A parsed proxy URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Module path exactly as requested, still case-encoded
    pub module: String,
    pub version: Option<String>,
    pub endpoint: ProxyEndpoint,
}

/// Parse a request path into a proxy operation
pub fn parse_proxy_path(path: &str) -> Option<ProxyRequest> {
    let path = path.strip_prefix('/')?;
    let path = urlencoding::decode(path).ok()?;

    if let Some(module) = path.strip_suffix("/@latest") {
        if module.is_empty() {
            return None;
        }
        return Some(ProxyRequest {
            module: module.to_string(),
            version: None,
            endpoint: ProxyEndpoint::Latest,
        });
    }

    let (module, tail) = path.rsplit_once("/@v/")?;
    if module.is_empty() || tail.is_empty() {
        return None;
    }
    if tail == "list" {
        return Some(ProxyRequest {
            module: module.to_string(),
            version: None,
            endpoint: ProxyEndpoint::List,
        });
    }

    let (version, extension) = tail.rsplit_once('.')?;
    if version.is_empty() {
        return None;
    }
    let endpoint = match extension {
        "info" => ProxyEndpoint::Info,
        "mod" => ProxyEndpoint::Mod,
        "zip" => ProxyEndpoint::Zip,
        "sum" => ProxyEndpoint::Sum,
        _ => return None,
    };
    Some(ProxyRequest {
        module: module.to_string(),
        version: Some(version.to_string()),
        endpoint,
    })
}

async fn dispatch(State(state): State<AppState>, uri: Uri) -> Response {
    match handle(state, uri).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle(state: AppState, uri: Uri) -> Result<Response, ProxyError> {
    let request = parse_proxy_path(uri.path()).ok_or(ProxyError::RouteNotFound)?;
    debug!(module = %request.module, endpoint = ?request.endpoint, "proxy request");

    let (route, forge) = state
        .resolver
        .resolve(&request.module)
        .ok_or(ProxyError::RouteNotFound)?;

    let version = request.version.as_deref().unwrap_or_default();
    match request.endpoint {
        ProxyEndpoint::Info => controllers::info::get(&state, &route, &forge, version).await,
        ProxyEndpoint::Latest => controllers::latest::get(&state, &route, &forge).await,
        ProxyEndpoint::List => controllers::list::get(&route, &forge).await,
        ProxyEndpoint::Mod => controllers::modfile::get(&state, &route, &forge, version).await,
        ProxyEndpoint::Zip => {
            controllers::zip::get(&state, &route, &forge, &request.module, version).await
        }
        ProxyEndpoint::Sum => {
            controllers::sum::get(&state, &route, &forge, &request.module, version).await
        }
    }
}

/// Build the application router on top of an existing state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(controllers::health::get))
        .fallback(get(dispatch))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// Wire configuration into a ready-to-serve router
pub fn create_app(config: &Config, http: &UpstreamHttp) -> Result<Router, ResolverError> {
    let resolver = Arc::new(Resolver::from_config(config, http)?);
    let cache = config
        .local_cache
        .as_ref()
        .map(|root| Arc::new(ModuleCache::new(root.clone())));
    let state = AppState {
        resolver,
        versions: Arc::new(VersionService::new(cache)),
    };
    Ok(create_router(state))
}
