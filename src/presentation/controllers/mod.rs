//! Endpoint controllers

pub mod health;
pub mod info;
pub mod latest;
pub mod list;
pub mod modfile;
pub mod sum;
pub mod zip;

use crate::application::VersionService;
use crate::infrastructure::Resolver;
use std::sync::Arc;

/// Shared application state for the handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub versions: Arc<VersionService>,
}
