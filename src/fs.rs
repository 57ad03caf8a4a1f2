// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem abstraction.
//!
//! Everything reqtrace persists goes through the [`FileSystem`] trait: artifact
//! files, counters, and the git object store itself. Two implementations sit
//! behind it:
//!
//! - [`MemoryFs`], an in-process store of path to bytes plus a set of
//!   directory markers. Used when there is no native filesystem to talk to.
//! - [`NativeFs`], a pass-through to the host filesystem that is only ever
//!   reached through the asynchronous [bridge](crate::bridge). Every call is a
//!   request/response round trip; nothing is shared between the two sides.
//!
//! # Path Conventions
//!
//! Paths are plain strings separated by `/`, regardless of host platform.
//! Writing a file creates any missing parent directories, so callers never
//! have to call [`FileSystem::mkdir`] before [`FileSystem::write_file`].
//!
//! # Not Found
//!
//! A missing path is reported as [`FsError::NotFound`], never as a generic
//! I/O failure. First time creation is a normal case for most callers, and
//! they need to tell it apart from a permission problem.

pub mod memory;
pub mod native;

pub use memory::{MemoryFs, MemoryStore};
pub use native::NativeFs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Result of [`FileSystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: EntryKind,
    pub len: u64,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Uniform POSIX-like file operations.
///
/// Implementations are cheap handles. Cloning one yields another handle onto
/// the _same_ underlying storage.
#[async_trait]
pub trait FileSystem: Clone + Send + Sync + 'static {
    /// Read entire file as bytes.
    ///
    /// # Errors
    ///
    /// - Return [`FsError::NotFound`] if nothing exists at `path`.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Read entire file as UTF-8 text.
    async fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8 {
            path: path.to_string(),
        })
    }

    /// Write file, creating intermediate directories as needed.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Delete a single file.
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Names of the files directly inside `dir`.
    async fn list_files(&self, dir: &str) -> Result<Vec<String>>;

    /// Names of files and directories directly inside `dir`.
    ///
    /// Only the first path segment below `dir` is reported. Directories
    /// created through [`FileSystem::mkdir`] show up even when empty.
    async fn list_entries(&self, dir: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> bool;

    async fn stat(&self, path: &str) -> Result<Metadata>;

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Read file, mapping [`FsError::NotFound`] to `None`.
    async fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.read_file(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// List directory, mapping [`FsError::NotFound`] to an empty listing.
    async fn list_files_or_empty(&self, dir: &str) -> Result<Vec<String>> {
        match self.list_files(dir).await {
            Ok(names) => Ok(names),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

/// Collect every file below `dir`, relative to `dir`.
///
/// Entries whose first segment is listed in `skip` are not descended into.
pub async fn walk_files<F: FileSystem>(fs: &F, dir: &str, skip: &[&str]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];

    // Use DFS to traverse directory tree.
    while let Some(rel) = pending.pop() {
        let abs = join(dir, &rel);
        let entries = match fs.list_entries(&abs).await {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => continue,
            Err(err) => return Err(err),
        };

        for name in entries {
            if rel.is_empty() && skip.contains(&name.as_str()) {
                continue;
            }

            let child = join(&rel, &name);
            if fs.stat(&join(dir, &child)).await?.is_dir() {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Delete every file below `dir`.
///
/// Directory markers are left behind, the contract has no way to remove them.
pub async fn remove_tree<F: FileSystem>(fs: &F, dir: &str) -> Result<usize> {
    let files = walk_files(fs, dir, &[]).await?;
    for file in &files {
        fs.delete_file(&join(dir, file)).await?;
    }
    debug!("removed {} files below {dir:?}", files.len());

    Ok(files.len())
}

/// Normalize `/` separated path.
///
/// Collapses repeated separators, drops `.` segments, resolves `..` segments,
/// and strips any trailing separator. Absolute paths stay absolute.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            segment => parts.push(segment),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Join `rel` onto `base`.
pub fn join(base: &str, rel: &str) -> String {
    if base.is_empty() {
        return normalize(rel);
    }
    if rel.is_empty() {
        return normalize(base);
    }

    normalize(&format!("{base}/{rel}"))
}

/// Parent directory of `path`, if it has one.
pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/".to_string()),
        Some(0) => None,
        Some(idx) => Some(path[..idx].to_string()),
        None if path.is_empty() => None,
        None => Some(String::new()),
    }
}

/// Last segment of `path`.
pub fn file_name(path: &str) -> String {
    let path = normalize(path);
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Is `path` the root of its namespace?
pub fn is_root(path: &str) -> bool {
    matches!(normalize(path).as_str(), "" | "/")
}

/// Prefix of not-found errors sent across the bridge.
pub const NOT_FOUND_CODE: &str = "ENOENT";

/// Filesystem error types.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Nothing exists at target path.
    #[error("{NOT_FOUND_CODE}: no such file or directory, {path:?}")]
    NotFound { path: String },

    /// Target path exists but could not be accessed.
    #[error("failed to access {path:?}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid UTF-8.
    #[error("file {path:?} is not valid UTF-8")]
    InvalidUtf8 { path: String },

    /// Bridge to the native filesystem failed or reported an error.
    #[error("native filesystem: {0}")]
    Bridge(String),
}

impl FsError {
    /// Is this the distinguished "doesn't exist yet" outcome?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn io(path: impl Into<String>, kind: std::io::ErrorKind, message: &str) -> Self {
        Self::Io {
            path: path.into(),
            source: std::io::Error::new(kind, message.to_string()),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = FsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_collapses_segments() {
        assert_eq!(normalize("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn join_and_parent() {
        assert_eq!(join("/repo", "requirements/REQ-001.md"), "/repo/requirements/REQ-001.md");
        assert_eq!(join("", "README.md"), "README.md");
        assert_eq!(join("/repo", ""), "/repo");
        assert_eq!(parent("/repo/requirements/REQ-001.md").as_deref(), Some("/repo/requirements"));
        assert_eq!(parent("/repo").as_deref(), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(parent("README.md").as_deref(), Some(""));
        assert_eq!(file_name("/repo/requirements/REQ-001.md"), "REQ-001.md");
    }

    #[tokio::test]
    async fn walk_files_skips_listed_top_level_entries() -> anyhow::Result<()> {
        let fs = MemoryFs::default();
        fs.write_file("/repo/.git/HEAD", b"ref: refs/heads/main\n").await?;
        fs.write_file("/repo/README.md", b"hi").await?;
        fs.write_file("/repo/requirements/REQ-001.md", b"req").await?;

        let files = walk_files(&fs, "/repo", &[".git"]).await?;
        assert_eq!(files, vec!["README.md", "requirements/REQ-001.md"]);

        let removed = remove_tree(&fs, "/repo/requirements").await?;
        assert_eq!(removed, 1);
        assert!(!fs.exists("/repo/requirements/REQ-001.md").await);

        Ok(())
    }
}
