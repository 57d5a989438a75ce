//! On-disk cache of upstream tarballs
//!
//! Cache files live under `<root>/<base>/<group>/<repo>/<cleanSubPath>/` and
//! are named `<tag?><YYYYMMDDhhmmss>-<40hexSha>.tgz`. The tag prefix is
//! variable-width; the date, sha, and extension form a fixed 59-character
//! suffix. File names are content-addressed on the full commit sha, so
//! concurrent writers of the same entry produce identical bytes and
//! last-writer-wins is safe.

use crate::domain::ResolvedRoute;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const SUFFIX_LEN: usize = 59;
const DATE_LEN: usize = 14;
const SHA_LEN: usize = 40;

/// A cache file recovered from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Tag name the entry was stored under, empty for pseudo-versions
    pub version: String,
    /// Compact committer date
    pub date: String,
    /// Full commit sha
    pub sha: String,
    pub path: PathBuf,
    pub dir: PathBuf,
}

/// Disk-backed tarball cache rooted at a configured directory
#[derive(Debug, Clone)]
pub struct ModuleCache {
    root: PathBuf,
}

impl ModuleCache {
    pub fn new(root: PathBuf) -> Self {
        ModuleCache { root }
    }

    /// Directory holding entries for a resolved module
    pub fn module_dir(&self, route: &ResolvedRoute) -> PathBuf {
        let mut dir = self.root.join(&route.base).join(&route.group).join(&route.repo);
        if !route.clean_sub_path.is_empty() {
            dir = dir.join(&route.clean_sub_path);
        }
        dir
    }

    /// File name for an entry; `version` is empty for pseudo-versions
    pub fn entry_file_name(version: &str, date: &str, sha: &str) -> String {
        format!("{version}{date}-{sha}.tgz")
    }

    /// Scan the module directory for an entry matching the requested version.
    ///
    /// A file matches when the requested version equals its tag, or begins
    /// with `v0.0.0-<date>-<sha[..6]>`, or begins with `<sha[..12]>`.
    pub fn probe(&self, route: &ResolvedRoute, version: &str) -> Option<CacheEntry> {
        let dir = self.module_dir(route);
        let entries = fs::read_dir(&dir).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some((tag, date, sha)) = parse_entry_name(&name) else {
                continue;
            };
            let matches = version == tag
                || version.starts_with(&format!("v0.0.0-{date}-{}", &sha[..6]))
                || version.starts_with(&sha[..12]);
            if matches {
                debug!(module = %route.base_group_repo(), file = %name, "cache hit");
                return Some(CacheEntry {
                    version: tag.to_string(),
                    date: date.to_string(),
                    sha: sha.to_string(),
                    path: dir.join(name.as_ref()),
                    dir,
                });
            }
        }
        None
    }

    /// Copy a seekable source into the cache entry at `path`.
    ///
    /// The bytes land in a temp file in the target directory first and are
    /// renamed into place, so readers never observe a half-written entry.
    /// Returns the persisted file reopened for reading.
    pub fn store<R: Read + Seek>(dir: &Path, path: &Path, source: &mut R) -> io::Result<File> {
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        source.seek(SeekFrom::Start(0))?;
        io::copy(source, tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        File::open(path)
    }
}

/// Split a cache file name into `(tag, date, sha)`
fn parse_entry_name(name: &str) -> Option<(&str, &str, &str)> {
    if !name.ends_with(".tgz") || name.len() < SUFFIX_LEN {
        return None;
    }
    let dp = name.len() - SUFFIX_LEN;
    let tag = name.get(..dp)?;
    let date = name.get(dp..dp + DATE_LEN)?;
    let sha = name.get(dp + DATE_LEN + 1..dp + DATE_LEN + 1 + SHA_LEN)?;
    if name.as_bytes().get(dp + DATE_LEN) != Some(&b'-') {
        return None;
    }
    if !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some((tag, date, sha))
}
