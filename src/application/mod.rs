//! Application Layer - The request-to-artifact pipeline
//!
//! This module orchestrates version negotiation, archive repackaging, and
//! checksum computation on top of the domain and infrastructure layers.

pub mod archive_service;
pub mod checksum_service;
pub mod errors;
pub mod version_service;

pub use archive_service::repack_to_zip;
pub use checksum_service::{compute_checksums, ModuleChecksums};
pub use errors::ProxyError;
pub use version_service::VersionService;
