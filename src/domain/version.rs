//! Version descriptors, commits, and pseudo-version handling

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::path::PathBuf;

/// Compact commit timestamp used in pseudo-versions and cache file names
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// A commit as reported by an upstream forge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Full hex commit id
    pub id: String,
    /// Committer timestamp
    pub committed_at: DateTime<Utc>,
}

/// Provenance of a resolved version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// `git` for upstream-resolved versions, `cache` for local hits
    pub vcs: String,
    pub url: String,
    /// `refs/tags/<tag>` for tag-backed versions, empty otherwise
    pub ref_name: String,
    /// Full commit id
    pub hash: String,
}

/// The canonical answer for a `(module, version)` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    /// Tag name or synthesized pseudo-version
    pub version: String,
    /// Committer timestamp
    pub time: DateTime<Utc>,
    pub origin: Origin,
    /// On-disk location for the upstream tarball, when caching is enabled
    pub cache_dir: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
}

impl VersionDescriptor {
    /// RFC 3339 rendering of the committer timestamp
    pub fn time_rfc3339(&self) -> String {
        self.time.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Format a timestamp as `YYYYMMDDhhmmss` UTC
pub fn compact_date(time: &DateTime<Utc>) -> String {
    time.format(COMPACT_DATE_FORMAT).to_string()
}

/// Parse a `YYYYMMDDhhmmss` timestamp as UTC
pub fn parse_compact_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, COMPACT_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Synthesize a pseudo-version from a compact date and a commit id
pub fn pseudo_version(date: &str, commit_id: &str) -> String {
    format!("v0.0.0-{}-{}", date, &commit_id[..commit_id.len().min(12)])
}

/// A requested version string, split into the term handed to the forge and,
/// for pseudo-versions, the embedded timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionQuery {
    /// Tag name, branch, or (short) commit id to resolve upstream
    pub search: String,
    /// The `YYYYMMDDhhmmss` segment of a pseudo-version
    pub pseudo_date: Option<String>,
}

/// Split a requested version string.
///
/// A version is treated as a pseudo-version when its last `-` sits at index 20
/// or later, the string is at least 34 characters, and the dash is at least
/// four characters before the end; everything after the dash is then the short
/// commit id and the 14 characters before it the timestamp. Any trailing
/// `+incompatible` marker is stripped from the search term only.
pub fn parse_version_query(version: &str) -> VersionQuery {
    if let Some(dash) = version.rfind('-') {
        if dash >= 20 && version.len() >= 34 && dash < version.len() - 4 {
            if let (Some(search), Some(date)) =
                (version.get(dash + 1..), version.get(dash - 14..dash))
            {
                return VersionQuery {
                    search: search.trim_end_matches("+incompatible").to_string(),
                    pseudo_date: Some(date.to_string()),
                };
            }
        }
    }
    VersionQuery {
        search: version.trim_end_matches("+incompatible").to_string(),
        pseudo_date: None,
    }
}
