// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-process virtual filesystem.
//!
//! The whole filesystem lives inside a [`MemoryStore`]: a mapping of path to
//! bytes, plus a set of directory markers. The store is an ordinary owned
//! value handed to [`MemoryFs::new`], so every test can build its own
//! independent filesystem.
//!
//! Writes mutate the store in place. There is no snapshot isolation, a reader
//! running between two related writes sees whatever has landed so far.

use crate::fs::{self, EntryKind, FileSystem, FsError, Metadata, Result};

use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::ErrorKind,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::trace;

/// Backing state of a [`MemoryFs`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    denied: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_dir(&self, path: &str) -> bool {
        fs::is_root(path) || self.dirs.contains(path)
    }

    fn is_denied(&self, path: &str) -> bool {
        self.denied
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/")))
    }

    fn check_access(&self, path: &str) -> Result<()> {
        if self.is_denied(path) {
            return Err(FsError::io(path, ErrorKind::PermissionDenied, "permission denied"));
        }

        Ok(())
    }

    fn mark_ancestors(&mut self, path: &str) {
        let mut current = fs::parent(path);
        while let Some(dir) = current {
            if fs::is_root(&dir) {
                break;
            }
            current = fs::parent(&dir);
            self.dirs.insert(dir);
        }
    }

    fn children(&self, dir: &str) -> Vec<(String, EntryKind)> {
        let prefix = match dir {
            "" => String::new(),
            "/" => "/".to_string(),
            dir => format!("{dir}/"),
        };

        let files = self.files.keys().filter_map(|path| {
            child_segment(path, &prefix).map(|(name, nested)| {
                let kind = if nested { EntryKind::Directory } else { EntryKind::File };
                (name.to_string(), kind)
            })
        });
        let dirs = self.dirs.iter().filter_map(|path| {
            child_segment(path, &prefix).map(|(name, _)| (name.to_string(), EntryKind::Directory))
        });

        files.chain(dirs).collect()
    }
}

fn child_segment<'a>(path: &'a str, prefix: &str) -> Option<(&'a str, bool)> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }

    match rest.split_once('/') {
        Some(("", _)) => None,
        Some((name, _)) => Some((name, true)),
        None => Some((rest, false)),
    }
}

/// Virtual filesystem over a shared [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryFs {
    /// Construct new virtual filesystem that owns `store`.
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Deny all access at and below `prefix`.
    ///
    /// Operations on denied paths fail with a permission error instead of
    /// the not-found outcome.
    pub fn deny(&self, prefix: impl AsRef<str>) {
        self.lock().denied.insert(fs::normalize(prefix.as_ref()));
    }

    /// Lift a previous [`MemoryFs::deny`].
    pub fn allow(&self, prefix: impl AsRef<str>) {
        self.lock().denied.remove(&fs::normalize(prefix.as_ref()));
    }

    /// Every file path currently stored, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Copy of the current store contents.
    pub fn snapshot(&self) -> MemoryStore {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        // INVARIANT: Store mutations never panic midway, so a poisoned lock still holds
        // consistent data.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = fs::normalize(path);
        let store = self.lock();
        store.check_access(&path)?;

        if let Some(contents) = store.files.get(&path) {
            return Ok(contents.clone());
        }

        if store.is_dir(&path) {
            return Err(FsError::io(path, ErrorKind::Other, "is a directory"));
        }

        Err(FsError::NotFound { path })
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let path = fs::normalize(path);
        let mut store = self.lock();
        store.check_access(&path)?;

        if store.is_dir(&path) {
            return Err(FsError::io(path, ErrorKind::Other, "is a directory"));
        }

        trace!("write {} bytes to {path:?}", contents.len());
        store.files.insert(path.clone(), contents.to_vec());
        store.mark_ancestors(&path);

        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let path = fs::normalize(path);
        let mut store = self.lock();
        store.check_access(&path)?;

        match store.files.remove(&path) {
            Some(_) => Ok(()),
            None => Err(FsError::NotFound { path }),
        }
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let dir = fs::normalize(dir);
        let store = self.lock();
        store.check_access(&dir)?;

        if !store.is_dir(&dir) {
            return Err(FsError::NotFound { path: dir });
        }

        let names = store
            .children(&dir)
            .into_iter()
            .filter(|(_, kind)| *kind == EntryKind::File)
            .map(|(name, _)| name)
            .collect::<BTreeSet<_>>();

        Ok(names.into_iter().collect())
    }

    async fn list_entries(&self, dir: &str) -> Result<Vec<String>> {
        let dir = fs::normalize(dir);
        let store = self.lock();
        store.check_access(&dir)?;

        if !store.is_dir(&dir) {
            return Err(FsError::NotFound { path: dir });
        }

        // INVARIANT: Union of file entries and directory markers, deduplicated.
        let names = store
            .children(&dir)
            .into_iter()
            .map(|(name, _)| name)
            .collect::<BTreeSet<_>>();

        Ok(names.into_iter().collect())
    }

    async fn exists(&self, path: &str) -> bool {
        let path = fs::normalize(path);
        let store = self.lock();
        store.files.contains_key(&path) || store.is_dir(&path)
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let path = fs::normalize(path);
        let store = self.lock();
        store.check_access(&path)?;

        if let Some(contents) = store.files.get(&path) {
            return Ok(Metadata {
                kind: EntryKind::File,
                len: contents.len() as u64,
            });
        }

        if store.is_dir(&path) {
            return Ok(Metadata {
                kind: EntryKind::Directory,
                len: 0,
            });
        }

        Err(FsError::NotFound { path })
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let path = fs::normalize(path);
        let mut store = self.lock();
        store.check_access(&path)?;

        if store.files.contains_key(&path) {
            return Err(FsError::io(path, ErrorKind::AlreadyExists, "file exists"));
        }

        if recursive {
            store.mark_ancestors(&path);
        } else {
            if store.is_dir(&path) {
                return Err(FsError::io(path, ErrorKind::AlreadyExists, "directory exists"));
            }

            let parent = fs::parent(&path).unwrap_or_default();
            if !store.is_dir(&parent) {
                return Err(FsError::NotFound { path: parent });
            }
        }

        if !fs::is_root(&path) {
            store.dirs.insert(path);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn write_creates_parent_directories() -> anyhow::Result<()> {
        let fs = MemoryFs::default();
        fs.write_file("/ws/global/requirements/REQ-001.md", b"content").await?;

        assert!(fs.exists("/ws").await);
        assert!(fs.exists("/ws/global/requirements").await);
        assert!(fs.stat("/ws/global").await?.is_dir());
        assert_eq!(fs.read_file("/ws/global/requirements/REQ-001.md").await?, b"content");

        Ok(())
    }

    #[tokio::test]
    async fn list_entries_unions_files_and_markers() -> anyhow::Result<()> {
        let fs = MemoryFs::default();
        fs.mkdir("/repo/usecases", true).await?;
        fs.write_file("/repo/requirements/REQ-001.md", b"a").await?;
        fs.write_file("/repo/requirements/REQ-002.md", b"b").await?;
        fs.write_file("/repo/README.md", b"c").await?;

        assert_eq!(
            fs.list_entries("/repo").await?,
            vec!["README.md", "requirements", "usecases"]
        );
        assert_eq!(fs.list_files("/repo").await?, vec!["README.md"]);
        assert_eq!(
            fs.list_files("/repo/requirements").await?,
            vec!["REQ-001.md", "REQ-002.md"]
        );
        assert!(fs.list_files("/repo/usecases").await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn not_found_is_distinct_from_access_failure() -> anyhow::Result<()> {
        let fs = MemoryFs::default();
        fs.write_file("/repo/secret.md", b"x").await?;
        fs.deny("/repo/secret.md");

        let missing = fs.read_file("/repo/missing.md").await.unwrap_err();
        assert!(missing.is_not_found());

        let denied = fs.read_file("/repo/secret.md").await.unwrap_err();
        assert!(!denied.is_not_found());
        assert!(matches!(denied, FsError::Io { .. }));

        fs.allow("/repo/secret.md");
        assert_eq!(fs.read_file("/repo/secret.md").await?, b"x");

        Ok(())
    }

    #[tokio::test]
    async fn independent_stores_do_not_share_state() -> anyhow::Result<()> {
        let first = MemoryFs::new(MemoryStore::new());
        let second = MemoryFs::new(MemoryStore::new());
        let alias = first.clone();

        first.write_file("/a.md", b"1").await?;
        assert!(alias.exists("/a.md").await);
        assert!(!second.exists("/a.md").await);

        Ok(())
    }

    #[tokio::test]
    async fn mkdir_without_recursion_needs_parent() -> anyhow::Result<()> {
        let fs = MemoryFs::default();
        let err = fs.mkdir("/a/b", false).await.unwrap_err();
        assert!(err.is_not_found());

        fs.mkdir("/a", false).await?;
        fs.mkdir("/a/b", false).await?;
        assert!(fs.stat("/a/b").await?.is_dir());
        assert!(fs.mkdir("/a/b", true).await.is_ok());

        Ok(())
    }
}
