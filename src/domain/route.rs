//! Resolved module routes and module-path decoding

/// Where a module path landed after resolution: the upstream forge host,
/// project coordinates, and the directory of the module within the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// The module path as requested, after `!x` decoding but before any remap
    pub original_path: String,
    /// Forge host
    pub base: String,
    /// Repository owner or group
    pub group: String,
    /// Repository name
    pub repo: String,
    /// Path inside the repository to the module directory, possibly empty
    pub sub_path: String,
    /// `vN` segment extracted from the front of `sub_path`
    pub major_version: Option<String>,
    /// `sub_path` with the major-version segment stripped
    pub clean_sub_path: String,
}

impl ResolvedRoute {
    /// `group/repo`
    pub fn group_repo(&self) -> String {
        join_segments(&[&self.group, &self.repo])
    }

    /// `base/group/repo`
    pub fn base_group_repo(&self) -> String {
        join_segments(&[&self.base, &self.group, &self.repo])
    }
}

fn join_segments(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// Reverse the module-path case encoding: the `go` command writes an uppercase
/// letter as `!` followed by its lowercase form. A trailing bare `!` is kept.
pub fn decode_module_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '!' && chars.peek().is_some() {
            let next = chars.next().unwrap();
            out.extend(next.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a leading `v<digits>` segment off a sub-path.
///
/// Returns the major-version segment, if present, and the remaining path.
pub fn split_major_version(sub_path: &str) -> (Option<String>, String) {
    let (head, rest) = match sub_path.split_once('/') {
        Some((head, rest)) => (head, rest),
        None => (sub_path, ""),
    };
    if is_major_version(head) {
        (Some(head.to_string()), rest.to_string())
    } else {
        (None, sub_path.to_string())
    }
}

fn is_major_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}
