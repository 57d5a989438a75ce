//! Checksum computer
//!
//! Produces the package manager's `h1:` hashes from an upstream tarball: a
//! tree hash over every regular file and a separate hash over the manifest
//! alone. Both are base64 encodings of a sha256 over sorted
//! `"<hex digest>  <name>\n"` lines.

use crate::application::errors::ProxyError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Seek, SeekFrom};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The two `h1:` digests for one module version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleChecksums {
    /// Hash over the full file tree
    pub tree: String,
    /// Hash over the root `go.mod` line alone, absent without a manifest
    pub manifest: Option<String>,
}

/// Compute both digests from a tar source, transparently unwrapping gzip
pub fn compute_checksums<R: Read + Seek>(
    source: &mut R,
    module: &str,
    version: &str,
) -> Result<ModuleChecksums, ProxyError> {
    source.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 2];
    let n = source.read(&mut magic)?;
    let gzipped = n == 2 && magic == GZIP_MAGIC;
    source.seek(SeekFrom::Start(0))?;

    if gzipped {
        sum_entries(GzDecoder::new(source), module, version)
    } else {
        sum_entries(source, module, version)
    }
}

fn sum_entries<R: Read>(
    reader: R,
    module: &str,
    version: &str,
) -> Result<ModuleChecksums, ProxyError> {
    let directory = format!("{module}@{version}");
    let mut archive = tar::Archive::new(reader);
    let mut files: Vec<(String, String)> = Vec::new();
    let mut manifest = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some((_, rel)) = name.split_once('/') else {
            continue;
        };
        let rel = rel.to_string();

        let mut hasher = Sha256::new();
        io::copy(&mut entry, &mut hasher)?;
        let digest = hex::encode(hasher.finalize());

        if rel == "go.mod" {
            let mut manifest_hasher = Sha256::new();
            manifest_hasher.update(format!("{digest}  go.mod\n"));
            manifest = Some(BASE64.encode(manifest_hasher.finalize()));
        }
        files.push((format!("{directory}/{rel}"), digest));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut tree_hasher = Sha256::new();
    for (name, digest) in &files {
        tree_hasher.update(format!("{digest}  {name}\n"));
    }
    Ok(ModuleChecksums {
        tree: BASE64.encode(tree_hasher.finalize()),
        manifest,
    })
}
