//! Tarball transformer
//!
//! Repackages an upstream gzip-tar into the zip the `go` command downloads.
//! The tar is walked twice: the first pass collects directories that carry
//! their own `go.mod` and therefore belong to nested modules, the second
//! emits the surviving files under a rewritten `<module>@<version>` top-level
//! directory. The zip is staged in a spill buffer so the response can carry
//! an exact `Content-Length`.

use crate::application::errors::ProxyError;
use crate::infrastructure::SpoolBuffer;
use chrono::{Datelike, Timelike};
use flate2::read::GzDecoder;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::debug;
use zip::write::SimpleFileOptions;

const ZIP_SPOOL_MEM: usize = 200 << 10;
const ZIP_SPOOL_BLOCK: usize = 32 << 10;

/// Drop the tar's first path segment, which names the repository root
pub(crate) fn strip_first_segment(name: &str) -> Option<&str> {
    name.split_once('/').map(|(_, rest)| rest)
}

/// Split a relative path into its directory (trailing slash kept) and file name
pub(crate) fn split_dir_file(rel: &str) -> (&str, &str) {
    match rel.rfind('/') {
        Some(idx) => (&rel[..idx + 1], &rel[idx + 1..]),
        None => ("", rel),
    }
}

fn has_vendor_segment(name: &str) -> bool {
    name.split('/').any(|segment| segment == "vendor")
}

/// Repackage a seekable gzip-tar source into a zip held in a spill buffer.
///
/// `module` is the module path exactly as requested in the URL, since the
/// `go` command expects the escaped form inside archive paths.
pub fn repack_to_zip<R: Read + Seek>(
    source: &mut R,
    module: &str,
    clean_sub_path: &str,
    version: &str,
) -> Result<SpoolBuffer, ProxyError> {
    let folder = if clean_sub_path.is_empty() {
        String::new()
    } else {
        format!("{clean_sub_path}/")
    };

    // pass 1: directories owning a manifest other than the module's own
    source.seek(SeekFrom::Start(0))?;
    let mut ignore_dirs: Vec<String> = Vec::new();
    {
        let gz = GzDecoder::new(&mut *source);
        let mut archive = tar::Archive::new(gz);
        for entry in archive.entries()? {
            let entry = entry?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let Some(rel) = strip_first_segment(&name) else {
                continue;
            };
            if rel.is_empty() {
                continue;
            }
            let (dir, file) = split_dir_file(rel);
            if file == "go.mod" && dir != folder {
                ignore_dirs.push(dir.to_string());
            }
        }
    }
    debug!(?ignore_dirs, module, "nested modules excluded from archive");

    // pass 2: emit the zip with the rewritten top-level directory
    source.seek(SeekFrom::Start(0))?;
    let gz = GzDecoder::new(&mut *source);
    let mut archive = tar::Archive::new(gz);
    let mut writer = zip::ZipWriter::new(SpoolBuffer::new(ZIP_SPOOL_MEM, ZIP_SPOOL_BLOCK));
    let directory = format!("{module}@{version}");

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(rel) = strip_first_segment(&name) else {
            continue;
        };
        if rel.is_empty() || has_vendor_segment(&name) {
            continue;
        }
        if !rel.starts_with(&folder) {
            continue;
        }
        if ignore_dirs
            .iter()
            .any(|dir| rel.starts_with(dir.as_str()) && dir.starts_with(&folder))
        {
            continue;
        }

        let stripped = &rel[folder.len()..];
        let mtime = entry.header().mtime().unwrap_or(0);
        let options = SimpleFileOptions::default().last_modified_time(zip_time(mtime));
        writer.start_file(format!("{directory}/{stripped}"), options)?;
        io::copy(&mut entry, &mut writer)?;
    }

    let mut spool = writer.finish()?;
    spool.rewind();
    Ok(spool)
}

fn zip_time(epoch_secs: u64) -> zip::DateTime {
    let Some(time) = chrono::DateTime::from_timestamp(epoch_secs as i64, 0) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(
        time.year().clamp(0, u16::MAX as i32) as u16,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .unwrap_or_default()
}
