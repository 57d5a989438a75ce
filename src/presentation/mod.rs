//! Presentation Layer - HTTP surface
//!
//! This module contains the Axum router, the goproxy URL parser, the
//! endpoint controllers, and the wire DTOs.

pub mod controllers;
pub mod models;
pub mod routes;

pub use controllers::AppState;
pub use models::{HealthResponse, VersionInfo};
pub use routes::{create_app, create_router};
