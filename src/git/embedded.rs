// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Embedded git implementation.
//!
//! Writes the standard repository layout through a [`FileSystem`], so the
//! same code backs the in-memory store and the native disk. Objects are only
//! ever written loose. Packfiles are never produced, and are not read either,
//! so a repository that standard git has garbage collected must be handled by
//! the native backend instead.
//!
//! # Layout
//!
//! ```text
//! {dir}/.git/HEAD               ref: refs/heads/main
//! {dir}/.git/config
//! {dir}/.git/index              DIRC v2
//! {dir}/.git/objects/xx/yyyy..  zlib(kind len\0data)
//! {dir}/.git/refs/heads/*
//! {dir}/.git/refs/tags/*
//! ```

use crate::{
    fs::{self, FileSystem},
    git::{
        index::{Index, IndexEntry},
        object::{self, Commit, Identity, ObjectKind, Tag, TreeEntry},
        CommitInfo, FileStatus, GitBackend, GitError, LogQuery, Result, Signature, StatusRow,
        TagInfo,
    },
};

use async_trait::async_trait;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque},
};
use tracing::{debug, instrument, trace};

const GIT_DIR: &str = ".git";

const CONFIG: &str = "[core]\n\
    \trepositoryformatversion = 0\n\
    \tfilemode = false\n\
    \tbare = false\n\
    \tlogallrefupdates = true\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Head {
    Symbolic(String),
    Detached(String),
}

/// Pure git over any [`FileSystem`].
#[derive(Debug, Clone)]
pub struct EmbeddedGit<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> EmbeddedGit<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    fn git_path(dir: &str, rel: &str) -> String {
        fs::join(&fs::join(dir, GIT_DIR), rel)
    }

    async fn ensure_init(&self, dir: &str) -> Result<()> {
        if self.fs.exists(&Self::git_path(dir, "HEAD")).await {
            return Ok(());
        }

        Err(GitError::NotInitialized {
            dir: dir.to_string(),
        })
    }

    async fn write_object(&self, dir: &str, kind: ObjectKind, data: &[u8]) -> Result<String> {
        let (oid, bytes) = object::encode_loose(kind, data)?;
        let path = Self::git_path(dir, &object::loose_path(&oid));

        // INVARIANT: Objects are immutable, so an existing file already holds this content.
        if !self.fs.exists(&path).await {
            trace!("write {kind} {oid}");
            self.fs.write_file(&path, &bytes).await?;
        }

        Ok(oid)
    }

    async fn read_object(&self, dir: &str, oid: &str) -> Result<(ObjectKind, Vec<u8>)> {
        if !object::is_oid(oid) {
            return Err(GitError::ObjectNotFound { oid: oid.to_string() });
        }

        match self
            .fs
            .read_optional(&Self::git_path(dir, &object::loose_path(oid)))
            .await?
        {
            Some(bytes) => object::decode_loose(&bytes),
            None => Err(GitError::ObjectNotFound { oid: oid.to_string() }),
        }
    }

    async fn read_commit(&self, dir: &str, oid: &str) -> Result<Commit> {
        match self.read_object(dir, oid).await? {
            (ObjectKind::Commit, data) => Commit::parse(&data),
            (kind, _) => Err(GitError::Corrupt(format!("{oid} is a {kind}, not a commit"))),
        }
    }

    async fn read_tree(&self, dir: &str, oid: &str) -> Result<Vec<TreeEntry>> {
        match self.read_object(dir, oid).await? {
            (ObjectKind::Tree, data) => object::parse_tree(&data),
            (kind, _) => Err(GitError::Corrupt(format!("{oid} is a {kind}, not a tree"))),
        }
    }

    /// Follow tag objects until reaching a commit.
    async fn peel_to_commit(&self, dir: &str, oid: &str) -> Result<String> {
        let mut current = oid.to_string();
        loop {
            match self.read_object(dir, &current).await? {
                (ObjectKind::Commit, _) => return Ok(current),
                (ObjectKind::Tag, data) => current = Tag::parse(&data)?.object,
                (kind, _) => {
                    return Err(GitError::Corrupt(format!("{current} is a {kind}, not a commit")))
                }
            }
        }
    }

    async fn read_index(&self, dir: &str) -> Result<Index> {
        match self.fs.read_optional(&Self::git_path(dir, "index")).await? {
            Some(bytes) => Index::parse(&bytes),
            None => Ok(Index::new()),
        }
    }

    async fn write_index(&self, dir: &str, index: &Index) -> Result<()> {
        self.fs
            .write_file(&Self::git_path(dir, "index"), &index.encode()?)
            .await?;
        Ok(())
    }

    async fn read_head(&self, dir: &str) -> Result<Head> {
        let head = self.fs.read_to_string(&Self::git_path(dir, "HEAD")).await?;
        let head = head.trim();
        match head.strip_prefix("ref: ") {
            Some(name) => Ok(Head::Symbolic(name.trim().to_string())),
            None => Ok(Head::Detached(head.to_string())),
        }
    }

    /// Value of a full reference name, following symbolic refs.
    async fn read_ref(&self, dir: &str, name: &str) -> Result<Option<String>> {
        let mut name = name.to_string();

        // INVARIANT: Bound symbolic ref chains so a cycle cannot hang the caller.
        for _ in 0..8 {
            match self.fs.read_optional(&Self::git_path(dir, &name)).await? {
                Some(bytes) => {
                    let value = String::from_utf8_lossy(&bytes).trim().to_string();
                    match value.strip_prefix("ref: ") {
                        Some(target) => name = target.trim().to_string(),
                        None => return Ok(Some(value)),
                    }
                }
                None => return self.read_packed_ref(dir, &name).await,
            }
        }

        Err(GitError::Corrupt(format!("symbolic ref loop at {name:?}")))
    }

    async fn read_packed_ref(&self, dir: &str, name: &str) -> Result<Option<String>> {
        let Some(bytes) = self.fs.read_optional(&Self::git_path(dir, "packed-refs")).await? else {
            return Ok(None);
        };

        let packed = String::from_utf8_lossy(&bytes).into_owned();
        Ok(packed
            .lines()
            .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
            .filter_map(|line| line.split_once(' '))
            .find(|(_, refname)| *refname == name)
            .map(|(oid, _)| oid.to_string()))
    }

    async fn write_ref(&self, dir: &str, name: &str, oid: &str) -> Result<()> {
        self.fs
            .write_file(&Self::git_path(dir, name), format!("{oid}\n").as_bytes())
            .await?;
        Ok(())
    }

    /// Resolve reference to object id, `None` for an unborn branch.
    async fn try_resolve(&self, dir: &str, reference: &str) -> Result<Option<String>> {
        if reference == "HEAD" {
            return match self.read_head(dir).await? {
                Head::Symbolic(name) => self.read_ref(dir, &name).await,
                Head::Detached(oid) => Ok(Some(oid)),
            };
        }

        if object::is_oid(reference) {
            return Ok(Some(reference.to_lowercase()));
        }

        if reference.starts_with("refs/") {
            return self.read_ref(dir, reference).await;
        }

        for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/"] {
            if let Some(oid) = self.read_ref(dir, &format!("{prefix}{reference}")).await? {
                return Ok(Some(oid));
            }
        }

        Ok(None)
    }

    async fn resolve_commit(&self, dir: &str, reference: &str) -> Result<Option<String>> {
        match self.try_resolve(dir, reference).await? {
            Some(oid) => Ok(Some(self.peel_to_commit(dir, &oid).await?)),
            None => Ok(None),
        }
    }

    /// Flatten tree into path to blob id.
    async fn flatten_tree(&self, dir: &str, tree: &str) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let mut pending = VecDeque::new();
        pending.push_front((String::new(), tree.to_string()));

        // Use DFS to traverse tree objects.
        while let Some((prefix, oid)) = pending.pop_front() {
            for entry in self.read_tree(dir, &oid).await? {
                let path = fs::join(&prefix, &entry.name);
                if entry.is_tree() {
                    pending.push_front((path, entry.oid));
                } else {
                    files.insert(path, entry.oid);
                }
            }
        }

        Ok(files)
    }

    async fn commit_files(&self, dir: &str, commit: &str) -> Result<BTreeMap<String, String>> {
        let tree = self.read_commit(dir, commit).await?.tree;
        self.flatten_tree(dir, &tree).await
    }

    async fn head_files(&self, dir: &str) -> Result<BTreeMap<String, String>> {
        match self.resolve_commit(dir, "HEAD").await? {
            Some(oid) => self.commit_files(dir, &oid).await,
            None => Ok(BTreeMap::new()),
        }
    }

    /// Blob id at `path` inside `tree`.
    async fn blob_at(&self, dir: &str, tree: &str, path: &str) -> Result<Option<String>> {
        let path = fs::normalize(path);
        let segments: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        let mut current = tree.to_string();

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            let entries = self.read_tree(dir, &current).await?;
            let Some(entry) = entries.into_iter().find(|entry| entry.name == *segment) else {
                return Ok(None);
            };

            match (last, entry.is_tree()) {
                (true, false) => return Ok(Some(entry.oid)),
                (false, true) => current = entry.oid,
                _ => return Ok(None),
            }
        }

        Ok(None)
    }

    async fn gitignore(&self, dir: &str) -> Result<Gitignore> {
        let rules = self.fs.read_optional(&fs::join(dir, ".gitignore")).await?;
        let mut builder = GitignoreBuilder::new(dir);
        for line in String::from_utf8_lossy(rules.as_deref().unwrap_or_default()).lines() {
            builder.add_line(None, line)?;
        }

        Ok(builder.build()?)
    }

    /// Working tree files with their blob ids.
    async fn workdir_files(&self, dir: &str) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        for path in fs::walk_files(&self.fs, dir, &[GIT_DIR]).await? {
            let bytes = self.fs.read_file(&fs::join(dir, &path)).await?;
            files.insert(path, object::hash_object(ObjectKind::Blob, &bytes));
        }

        Ok(files)
    }

    async fn stage_file(&self, dir: &str, index: &mut Index, path: &str) -> Result<()> {
        let bytes = self.fs.read_file(&fs::join(dir, path)).await?;
        let oid = self.write_object(dir, ObjectKind::Blob, &bytes).await?;
        index.insert(path, IndexEntry::file(oid, bytes.len()));
        Ok(())
    }

    /// Write nested tree objects for the stage, returning the root tree id.
    async fn write_tree(&self, dir: &str, index: &Index) -> Result<String> {
        let mut trees: BTreeMap<String, Vec<TreeEntry>> = BTreeMap::new();
        trees.insert(String::new(), Vec::new());

        for (path, entry) in index.iter() {
            let parent = fs::parent(path).unwrap_or_default();
            let mut ancestor = Some(parent.clone());
            while let Some(current) = ancestor {
                if trees.contains_key(&current) {
                    break;
                }
                ancestor = fs::parent(&current);
                trees.insert(current, Vec::new());
            }

            trees.entry(parent).or_default().push(TreeEntry {
                mode: entry.mode,
                name: fs::file_name(path),
                oid: entry.oid.clone(),
            });
        }

        // INVARIANT: Write deepest trees first so parents can reference them.
        let mut order = trees.keys().cloned().collect::<Vec<_>>();
        order.sort_by_key(|path| Reverse(depth(path)));

        let mut root = None;
        for path in order {
            let entries = trees.remove(&path).unwrap_or_default();
            let oid = self
                .write_object(dir, ObjectKind::Tree, &object::encode_tree(entries)?)
                .await?;

            match fs::parent(&path) {
                Some(parent) if !path.is_empty() => trees
                    .entry(parent)
                    .or_default()
                    .push(TreeEntry::tree(fs::file_name(&path), oid)),
                _ => root = Some(oid),
            }
        }

        root.ok_or_else(|| GitError::Corrupt("stage produced no root tree".into()))
    }

    async fn matrix(&self, dir: &str, filepaths: &[String]) -> Result<Vec<StatusRow>> {
        self.ensure_init(dir).await?;
        let head = self.head_files(dir).await?;
        let index = self.read_index(dir).await?;
        let workdir = self.workdir_files(dir).await?;
        let ignore = self.gitignore(dir).await?;

        let mut paths = BTreeSet::new();
        paths.extend(head.keys().cloned());
        paths.extend(index.paths().cloned());
        for path in workdir.keys() {
            let tracked = head.contains_key(path) || index.get(path).is_some();
            if tracked || !ignore.matched_path_or_any_parents(path, false).is_ignore() {
                paths.insert(path.clone());
            }
        }

        Ok(paths
            .into_iter()
            .filter(|path| matches_filter(path, filepaths))
            .map(|path| {
                let head_oid = head.get(&path).map(String::as_str);
                let workdir_oid = workdir.get(&path).map(String::as_str);
                let stage_oid = index.get(&path).map(|entry| entry.oid.as_str());
                StatusRow::from_oids(path.clone(), head_oid, workdir_oid, stage_oid)
            })
            .collect())
    }
}

fn depth(path: &str) -> usize {
    match path {
        "" => 0,
        path => path.matches('/').count() + 1,
    }
}

fn matches_filter(path: &str, filepaths: &[String]) -> bool {
    filepaths.is_empty()
        || filepaths.iter().any(|filter| {
            let filter = filter.trim_end_matches('/');
            filter.is_empty() || filter == "." || path == filter || path.starts_with(&format!("{filter}/"))
        })
}

#[async_trait]
impl<F: FileSystem> GitBackend for EmbeddedGit<F> {
    #[instrument(skip(self), level = "debug")]
    async fn init(&self, dir: &str, default_branch: &str) -> Result<()> {
        if self.fs.exists(&Self::git_path(dir, "HEAD")).await {
            debug!("repository at {dir:?} already initialized");
            return Ok(());
        }

        self.fs.mkdir(dir, true).await?;
        for sub in ["objects", "refs/heads", "refs/tags"] {
            self.fs.mkdir(&Self::git_path(dir, sub), true).await?;
        }
        self.fs
            .write_file(&Self::git_path(dir, "config"), CONFIG.as_bytes())
            .await?;
        self.fs
            .write_file(
                &Self::git_path(dir, "HEAD"),
                format!("ref: refs/heads/{default_branch}\n").as_bytes(),
            )
            .await?;

        Ok(())
    }

    async fn add(&self, dir: &str, filepath: &str) -> Result<()> {
        self.ensure_init(dir).await?;
        let mut index = self.read_index(dir).await?;
        let filepath = fs::normalize(filepath);
        let target = fs::join(dir, &filepath);

        if self.fs.stat(&target).await?.is_dir() {
            let ignore = self.gitignore(dir).await?;
            for rel in fs::walk_files(&self.fs, &target, &[GIT_DIR]).await? {
                let path = fs::join(&filepath, &rel);
                if index.get(&path).is_none()
                    && ignore.matched_path_or_any_parents(&path, false).is_ignore()
                {
                    continue;
                }
                self.stage_file(dir, &mut index, &path).await?;
            }
        } else {
            self.stage_file(dir, &mut index, &filepath).await?;
        }

        self.write_index(dir, &index).await
    }

    async fn remove(&self, dir: &str, filepath: &str) -> Result<()> {
        self.ensure_init(dir).await?;
        let mut index = self.read_index(dir).await?;
        let removed = index.remove(&fs::normalize(filepath));
        trace!("unstaged {removed} entries for {filepath:?}");
        self.write_index(dir, &index).await
    }

    #[instrument(skip(self, author), level = "debug")]
    async fn commit(&self, dir: &str, message: &str, author: &Signature) -> Result<String> {
        self.ensure_init(dir).await?;
        let index = self.read_index(dir).await?;
        let tree = self.write_tree(dir, &index).await?;
        let parents = self.resolve_commit(dir, "HEAD").await?.into_iter().collect();

        let identity = Identity::now(author);
        let commit = Commit {
            tree,
            parents,
            author: identity.clone(),
            committer: identity,
            message: message.to_string(),
        };
        let oid = self.write_object(dir, ObjectKind::Commit, &commit.encode()).await?;

        match self.read_head(dir).await? {
            Head::Symbolic(name) => self.write_ref(dir, &name, &oid).await?,
            Head::Detached(_) => {
                self.fs
                    .write_file(&Self::git_path(dir, "HEAD"), format!("{oid}\n").as_bytes())
                    .await?
            }
        }
        debug!("committed {oid}");

        Ok(oid)
    }

    async fn log(&self, dir: &str, query: &LogQuery) -> Result<Vec<CommitInfo>> {
        self.ensure_init(dir).await?;
        let start = self
            .resolve_commit(dir, &query.reference)
            .await?
            .ok_or_else(|| GitError::RefNotFound {
                reference: query.reference.clone(),
            })?;

        let depth = query.depth.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut commits = HashMap::new();
        let mut sequence = 0usize;
        let mut queue = BinaryHeap::new();

        let commit = self.read_commit(dir, &start).await?;
        queue.push((commit.committer.timestamp, Reverse(sequence), start.clone()));
        commits.insert(start.clone(), commit);
        seen.insert(start);

        // INVARIANT: Newest committer time first, ties broken by discovery order.
        while let Some((_, _, oid)) = queue.pop() {
            if entries.len() >= depth {
                break;
            }
            let Some(commit) = commits.remove(&oid) else {
                continue;
            };

            let include = match &query.filepath {
                None => true,
                Some(path) => {
                    let current = self.blob_at(dir, &commit.tree, path).await?;
                    let previous = match commit.parents.first() {
                        Some(parent) => {
                            let parent_tree = self.read_commit(dir, parent).await?.tree;
                            self.blob_at(dir, &parent_tree, path).await?
                        }
                        None => None,
                    };
                    current != previous
                }
            };

            for parent in &commit.parents {
                if seen.insert(parent.clone()) {
                    sequence += 1;
                    let parent_commit = self.read_commit(dir, parent).await?;
                    queue.push((parent_commit.committer.timestamp, Reverse(sequence), parent.clone()));
                    commits.insert(parent.clone(), parent_commit);
                }
            }

            if include {
                entries.push(CommitInfo {
                    hash: oid,
                    message: commit.message,
                    author: commit.author.signature(),
                    timestamp: commit.author.timestamp,
                });
            }
        }

        Ok(entries)
    }

    async fn status(&self, dir: &str, filepath: &str) -> Result<FileStatus> {
        let filepath = fs::normalize(filepath);
        let rows = self.matrix(dir, std::slice::from_ref(&filepath)).await?;
        if let Some(row) = rows.iter().find(|row| row.path == filepath) {
            return Ok(FileStatus::from_row(row));
        }

        let ignore = self.gitignore(dir).await?;
        if self.fs.exists(&fs::join(dir, &filepath)).await
            && ignore.matched_path_or_any_parents(&filepath, false).is_ignore()
        {
            return Ok(FileStatus::Ignored);
        }

        Ok(FileStatus::Absent)
    }

    async fn status_matrix(&self, dir: &str, filepaths: &[String]) -> Result<Vec<StatusRow>> {
        self.matrix(dir, filepaths).await
    }

    async fn list_files(&self, dir: &str, reference: Option<&str>) -> Result<Vec<String>> {
        self.ensure_init(dir).await?;
        match reference {
            None => Ok(self.read_index(dir).await?.paths().cloned().collect()),
            Some(reference) => {
                let oid = self
                    .resolve_commit(dir, reference)
                    .await?
                    .ok_or_else(|| GitError::RefNotFound {
                        reference: reference.to_string(),
                    })?;
                Ok(self.commit_files(dir, &oid).await?.into_keys().collect())
            }
        }
    }

    async fn read_blob(&self, dir: &str, oid: &str, filepath: Option<&str>) -> Result<Option<Vec<u8>>> {
        self.ensure_init(dir).await?;
        let blob = match filepath {
            None => oid.to_string(),
            Some(path) => {
                let commit = self.peel_to_commit(dir, oid).await?;
                let tree = self.read_commit(dir, &commit).await?.tree;
                match self.blob_at(dir, &tree, path).await? {
                    Some(blob) => blob,
                    None => return Ok(None),
                }
            }
        };

        match self.read_object(dir, &blob).await? {
            (ObjectKind::Blob, data) => Ok(Some(data)),
            (kind, _) => Err(GitError::Corrupt(format!("{blob} is a {kind}, not a blob"))),
        }
    }

    async fn resolve_ref(&self, dir: &str, reference: &str) -> Result<String> {
        self.ensure_init(dir).await?;
        self.try_resolve(dir, reference)
            .await?
            .ok_or_else(|| GitError::RefNotFound {
                reference: reference.to_string(),
            })
    }

    async fn is_descendent(
        &self,
        dir: &str,
        oid: &str,
        ancestor: &str,
        depth: Option<usize>,
    ) -> Result<bool> {
        self.ensure_init(dir).await?;
        let depth = depth.unwrap_or(usize::MAX);
        let mut seen = HashSet::new();
        let mut pending = VecDeque::new();
        pending.push_back((oid.to_string(), 0usize));

        // Use BFS to walk ancestry up to depth.
        while let Some((current, level)) = pending.pop_front() {
            if level >= depth {
                continue;
            }

            for parent in self.read_commit(dir, &current).await?.parents {
                if parent == ancestor {
                    return Ok(true);
                }
                if seen.insert(parent.clone()) {
                    pending.push_back((parent, level + 1));
                }
            }
        }

        Ok(false)
    }

    async fn current_branch(&self, dir: &str) -> Result<Option<String>> {
        self.ensure_init(dir).await?;
        match self.read_head(dir).await? {
            Head::Symbolic(name) => Ok(Some(
                name.strip_prefix("refs/heads/").unwrap_or(&name).to_string(),
            )),
            Head::Detached(_) => Ok(None),
        }
    }

    #[instrument(skip(self, message, tagger), level = "debug")]
    async fn annotated_tag(
        &self,
        dir: &str,
        name: &str,
        message: &str,
        object: Option<&str>,
        tagger: &Signature,
    ) -> Result<String> {
        self.ensure_init(dir).await?;
        let refname = format!("refs/tags/{name}");
        if self.read_ref(dir, &refname).await?.is_some() {
            return Err(GitError::TagExists {
                name: name.to_string(),
            });
        }

        let reference = object.unwrap_or("HEAD");
        let target = self
            .try_resolve(dir, reference)
            .await?
            .ok_or_else(|| GitError::RefNotFound {
                reference: reference.to_string(),
            })?;
        let (kind, _) = self.read_object(dir, &target).await?;

        let tag = Tag {
            object: target,
            kind,
            name: name.to_string(),
            tagger: Identity::now(tagger),
            message: message.to_string(),
        };
        let oid = self.write_object(dir, ObjectKind::Tag, &tag.encode()).await?;
        self.write_ref(dir, &refname, &oid).await?;

        Ok(oid)
    }

    async fn list_tags(&self, dir: &str) -> Result<Vec<String>> {
        self.ensure_init(dir).await?;
        let mut tags = fs::walk_files(&self.fs, &Self::git_path(dir, "refs/tags"), &[])
            .await?
            .into_iter()
            .collect::<BTreeSet<_>>();

        if let Some(bytes) = self.fs.read_optional(&Self::git_path(dir, "packed-refs")).await? {
            let packed = String::from_utf8_lossy(&bytes).into_owned();
            tags.extend(
                packed
                    .lines()
                    .filter_map(|line| line.split_once(' '))
                    .filter_map(|(_, name)| name.strip_prefix("refs/tags/"))
                    .map(str::to_string),
            );
        }

        Ok(tags.into_iter().collect())
    }

    async fn read_tag(&self, dir: &str, oid: &str) -> Result<TagInfo> {
        self.ensure_init(dir).await?;
        match self.read_object(dir, oid).await? {
            (ObjectKind::Tag, data) => {
                let tag = Tag::parse(&data)?;
                Ok(TagInfo {
                    oid: oid.to_string(),
                    name: tag.name,
                    object: tag.object,
                    tagger: tag.tagger.signature(),
                    timestamp: tag.tagger.timestamp,
                    message: tag.message,
                })
            }
            (kind, _) => Err(GitError::Corrupt(format!("{oid} is a {kind}, not a tag"))),
        }
    }
}
