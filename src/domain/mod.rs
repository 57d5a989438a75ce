//! Domain Layer - Core types and pure logic
//!
//! This module contains the route and version types shared across the proxy
//! pipeline, along with the pseudo-version and module-path encoding rules.

pub mod route;
pub mod version;

pub use route::*;
pub use version::*;
