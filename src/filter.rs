//! Pure predicates deciding what the scanner looks at.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use path_slash::PathExt;

/// Lower-cased extensions without the leading dot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    extensions: HashSet<String>,
}

impl ExtensionSet {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.extensions.contains(&extension.to_lowercase())
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.contains(ext))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }
}

/// Does `path` carry one of the extensions in `set`
pub fn matches_extension(path: &Path, set: &ExtensionSet) -> bool {
    set.matches(path)
}

/// Ignore entries resolved against the scan root once, up front
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    prefixes: Vec<String>,
}

impl IgnoreSet {
    pub fn new<S: AsRef<str>>(ignore_folders: &[S], root: &Path) -> Self {
        let mut prefixes = Vec::new();

        for entry in ignore_folders {
            let raw = entry.as_ref();
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.contains('\0') {
                log::warn!("Skipping malformed ignore entry {:?}", raw);
                continue;
            }
            prefixes.push(normalize(&root.join(trimmed)));
        }

        Self { prefixes }
    }

    /// Exclude an absolute path regardless of the configured entries
    pub fn add_excluded(&mut self, path: &Path) {
        let normalized = normalize(path);
        if !self.prefixes.contains(&normalized) {
            self.prefixes.push(normalized);
        }
    }

    /// True when `path` is one of the ignored folders or sits inside one
    pub fn is_ignored(&self, path: &Path) -> bool {
        let candidate = normalize(path);
        self.prefixes
            .iter()
            .any(|prefix| is_within(&candidate, prefix))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// One-shot form of [`IgnoreSet::is_ignored`]
pub fn is_ignored<S: AsRef<str>>(path: &Path, ignore_folders: &[S], root: &Path) -> bool {
    IgnoreSet::new(ignore_folders, root).is_ignored(path)
}

fn is_within(candidate: &str, prefix: &str) -> bool {
    if candidate == prefix {
        return true;
    }
    candidate
        .strip_prefix(prefix)
        .map(|rest| rest.starts_with('/') || prefix.ends_with('/'))
        .unwrap_or(false)
}

/// Lexically cleaned, forward-slashed, lower-cased form used for comparisons
fn normalize(path: &Path) -> String {
    let cleaned = clean(path);
    let mut s = cleaned.to_slash_lossy().to_lowercase();
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

/// Resolve `.` and `..` without touching the filesystem
pub(crate) fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
