//! Modgate - a read-only Go module proxy for private Git forges
//!
//! This crate answers the `go` command's module-download protocol by resolving
//! module paths onto private GitLab or GitHub repositories, fetching commits or
//! tagged revisions, and repackaging upstream tarballs into the exact responses
//! the toolchain expects.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use config::Config;
pub use logging::init_tracing;
