//! Wire DTOs
//!
//! The descriptor JSON uses the package manager's Go-style field names; the
//! cache location fields never leave the process.

use crate::domain::VersionDescriptor;
use serde::Serialize;

/// JSON body of `.info` and `@latest` responses
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Origin")]
    pub origin: OriginInfo,
}

#[derive(Debug, Serialize)]
pub struct OriginInfo {
    #[serde(rename = "VCS")]
    pub vcs: String,
    #[serde(rename = "URL", skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(rename = "Ref", skip_serializing_if = "String::is_empty")]
    pub ref_name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
}

impl From<&VersionDescriptor> for VersionInfo {
    fn from(descriptor: &VersionDescriptor) -> Self {
        VersionInfo {
            version: descriptor.version.clone(),
            time: descriptor.time_rfc3339(),
            origin: OriginInfo {
                vcs: descriptor.origin.vcs.clone(),
                url: descriptor.origin.url.clone(),
                ref_name: descriptor.origin.ref_name.clone(),
                hash: descriptor.origin.hash.clone(),
            },
        }
    }
}

/// Body of the `/health` endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
