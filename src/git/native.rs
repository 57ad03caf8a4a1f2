// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Libgit2 access to repositories on the native disk.
//!
//! Everything here blocks. The bridge host runs each call inside
//! [`tokio::task::spawn_blocking`], and nothing else in the crate touches a
//! [`Git2Repo`] directly.

use crate::git::{
    CommitInfo, FileStatus, GitError, LogQuery, PullOutcome, RemoteInfo, Result,
    Signature, StatusRow, TagInfo,
};

use auth_git2::GitAuthenticator;
use git2::{
    build::CheckoutBuilder, AnnotatedCommit, CheckoutNotificationType, ErrorCode, FetchOptions,
    IndexAddOption, ObjectType, Oid, PushOptions, RemoteCallbacks, Repository,
    RepositoryInitOptions, Sort,
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Username paired with a stored access token.
const TOKEN_USERNAME: &str = "x-access-token";

/// Open repository handle on the native disk.
pub struct Git2Repo {
    repository: Repository,
}

impl std::fmt::Debug for Git2Repo {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Git2Repo")
            .field("path", &self.repository.path())
            .finish()
    }
}

impl Git2Repo {
    /// Open existing repository at `dir`.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::NotInitialized`] if no repository exists there.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        match Repository::open(dir.as_ref()) {
            Ok(repository) => Ok(Self { repository }),
            Err(err) if err.code() == ErrorCode::NotFound => Err(GitError::NotInitialized {
                dir: dir.as_ref().display().to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Initialize repository at `dir`, or open it when it already exists.
    #[instrument(skip(dir), level = "debug")]
    pub fn init(dir: impl AsRef<Path>, default_branch: &str) -> Result<Self> {
        if let Ok(repository) = Repository::open(dir.as_ref()) {
            debug!("repository at {:?} already initialized", dir.as_ref());
            return Ok(Self { repository });
        }

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(default_branch);
        let repository = Repository::init_opts(dir.as_ref(), &opts)?;

        Ok(Self { repository })
    }

    fn workdir(&self) -> Result<&Path> {
        self.repository
            .workdir()
            .ok_or_else(|| GitError::Corrupt("repository has no working directory".into()))
    }

    pub fn add(&self, filepath: &str) -> Result<()> {
        let mut index = self.repository.index()?;
        if self.workdir()?.join(filepath).is_dir() {
            let pattern = match filepath.trim_end_matches('/') {
                "" | "." => "*".to_string(),
                dir => format!("{dir}/*"),
            };
            index.add_all([pattern].iter(), IndexAddOption::DEFAULT, None)?;
        } else {
            index.add_path(Path::new(filepath))?;
        }
        index.write()?;

        Ok(())
    }

    pub fn remove(&self, filepath: &str) -> Result<()> {
        let mut index = self.repository.index()?;
        if index.get_path(Path::new(filepath), 0).is_some() {
            index.remove_path(Path::new(filepath))?;
        } else {
            index.remove_dir(Path::new(filepath), 0)?;
        }
        index.write()?;

        Ok(())
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        match self.repository.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, author), level = "debug")]
    pub fn commit(&self, message: &str, author: &Signature) -> Result<String> {
        let mut index = self.repository.index()?;
        let tree = self.repository.find_tree(index.write_tree()?)?;
        let signature = git2::Signature::now(&author.name, &author.email)?;

        let parent = self.head_commit()?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;

        Ok(oid.to_string())
    }

    fn resolve_oid(&self, reference: &str) -> Result<Oid> {
        match self.repository.revparse_single(reference) {
            Ok(object) => Ok(object.id()),
            Err(err) if matches!(err.code(), ErrorCode::NotFound | ErrorCode::UnbornBranch) => {
                Err(GitError::RefNotFound {
                    reference: reference.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn blob_id_at(&self, commit: &git2::Commit<'_>, path: &str) -> Result<Option<Oid>> {
        match commit.tree()?.get_path(Path::new(path)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Blob) => Ok(Some(entry.id())),
            Ok(_) => Ok(None),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn log(&self, query: &LogQuery) -> Result<Vec<CommitInfo>> {
        let start = self.resolve_oid(&query.reference)?;
        let start = self.repository.find_object(start, None)?.peel_to_commit()?.id();

        let mut walk = self.repository.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(start)?;

        let depth = query.depth.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        for oid in walk {
            if entries.len() >= depth {
                break;
            }

            let commit = self.repository.find_commit(oid?)?;
            if let Some(path) = &query.filepath {
                let current = self.blob_id_at(&commit, path)?;
                let previous = match commit.parents().next() {
                    Some(parent) => self.blob_id_at(&parent, path)?,
                    None => None,
                };
                if current == previous {
                    continue;
                }
            }

            let author = commit.author();
            let message = commit.message().unwrap_or_default();
            entries.push(CommitInfo {
                hash: commit.id().to_string(),
                message: message.strip_suffix('\n').unwrap_or(message).to_string(),
                author: Signature::new(
                    author.name().unwrap_or_default(),
                    author.email().unwrap_or_default(),
                ),
                timestamp: author.when().seconds(),
            });
        }

        Ok(entries)
    }

    fn head_files(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let Some(commit) = self.head_commit()? else {
            return Ok(files);
        };

        let mut pending = VecDeque::new();
        pending.push_front((commit.tree()?, PathBuf::new()));

        // Use DFS to traverse commit tree.
        while let Some((tree, path)) = pending.pop_front() {
            for entry in &tree {
                let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
                match entry.kind() {
                    Some(ObjectType::Tree) => {
                        let next = self.repository.find_tree(entry.id())?;
                        pending.push_front((next, path.join(name)));
                    }
                    Some(ObjectType::Blob) => {
                        files.insert(slash_path(&path.join(name)), entry.id().to_string());
                    }
                    _ => continue,
                }
            }
        }

        Ok(files)
    }

    fn workdir_files(&self) -> Result<BTreeMap<String, String>> {
        let root = self.workdir()?.to_path_buf();
        let mut files = BTreeMap::new();
        let mut pending = vec![PathBuf::new()];

        // Use DFS to traverse working directory.
        while let Some(rel) = pending.pop() {
            for entry in std::fs::read_dir(root.join(&rel))? {
                let entry = entry?;
                let name = entry.file_name();
                if rel.as_os_str().is_empty() && name == ".git" {
                    continue;
                }

                let child = rel.join(&name);
                if entry.file_type()?.is_dir() {
                    pending.push(child);
                } else {
                    let oid = Oid::hash_file(ObjectType::Blob, root.join(&child))?;
                    files.insert(slash_path(&child), oid.to_string());
                }
            }
        }

        Ok(files)
    }

    pub fn status_matrix(&self, filepaths: &[String]) -> Result<Vec<StatusRow>> {
        let head = self.head_files()?;
        let workdir = self.workdir_files()?;
        let index = self.repository.index()?;
        let stage = index
            .iter()
            .filter(|entry| (entry.flags >> 12) & 0x3 == 0)
            .map(|entry| (String::from_utf8_lossy(&entry.path).into_owned(), entry.id.to_string()))
            .collect::<BTreeMap<_, _>>();

        let mut paths = BTreeSet::new();
        paths.extend(head.keys().cloned());
        paths.extend(stage.keys().cloned());
        for path in workdir.keys() {
            let tracked = head.contains_key(path) || stage.contains_key(path);
            if tracked || !self.repository.status_should_ignore(Path::new(path))? {
                paths.insert(path.clone());
            }
        }

        Ok(paths
            .into_iter()
            .filter(|path| matches_filter(path, filepaths))
            .map(|path| {
                StatusRow::from_oids(
                    path.clone(),
                    head.get(&path).map(String::as_str),
                    workdir.get(&path).map(String::as_str),
                    stage.get(&path).map(String::as_str),
                )
            })
            .collect())
    }

    pub fn status(&self, filepath: &str) -> Result<FileStatus> {
        let rows = self.status_matrix(&[filepath.to_string()])?;
        if let Some(row) = rows.iter().find(|row| row.path == filepath) {
            return Ok(FileStatus::from_row(row));
        }

        if self.workdir()?.join(filepath).exists()
            && self.repository.status_should_ignore(Path::new(filepath))?
        {
            return Ok(FileStatus::Ignored);
        }

        Ok(FileStatus::Absent)
    }

    pub fn list_files(&self, reference: Option<&str>) -> Result<Vec<String>> {
        match reference {
            None => Ok(self
                .repository
                .index()?
                .iter()
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect()),
            Some("HEAD") => Ok(self.head_files()?.into_keys().collect()),
            Some(reference) => {
                let oid = self.resolve_oid(reference)?;
                let commit = self.repository.find_object(oid, None)?.peel_to_commit()?;
                let mut files = Vec::new();
                commit.tree()?.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
                    if entry.kind() == Some(ObjectType::Blob) {
                        files.push(format!("{root}{}", entry.name().unwrap_or_default()));
                    }
                    git2::TreeWalkResult::Ok
                })?;
                files.sort();
                Ok(files)
            }
        }
    }

    pub fn read_blob(&self, oid: &str, filepath: Option<&str>) -> Result<Option<Vec<u8>>> {
        let blob = match filepath {
            None => Oid::from_str(oid)?,
            Some(path) => {
                let object = self.repository.find_object(self.resolve_oid(oid)?, None)?;
                match self.blob_id_at(&object.peel_to_commit()?, path)? {
                    Some(blob) => blob,
                    None => return Ok(None),
                }
            }
        };

        match self.repository.find_blob(blob) {
            Ok(blob) => Ok(Some(blob.content().to_vec())),
            Err(err) if err.code() == ErrorCode::NotFound => Err(GitError::ObjectNotFound {
                oid: blob.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn resolve_ref(&self, reference: &str) -> Result<String> {
        Ok(self.resolve_oid(reference)?.to_string())
    }

    pub fn is_descendent(&self, oid: &str, ancestor: &str, depth: Option<usize>) -> Result<bool> {
        let ancestor = Oid::from_str(ancestor)?;
        let depth = depth.unwrap_or(usize::MAX);
        let mut seen = HashSet::new();
        let mut pending = VecDeque::new();
        pending.push_back((Oid::from_str(oid)?, 0usize));

        // Use BFS to walk ancestry up to depth.
        while let Some((current, level)) = pending.pop_front() {
            if level >= depth {
                continue;
            }
            for parent in self.repository.find_commit(current)?.parent_ids() {
                if parent == ancestor {
                    return Ok(true);
                }
                if seen.insert(parent) {
                    pending.push_back((parent, level + 1));
                }
            }
        }

        Ok(false)
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = self.repository.find_reference("HEAD")?;
        Ok(head
            .symbolic_target()
            .map(|target| target.strip_prefix("refs/heads/").unwrap_or(target).to_string()))
    }

    #[instrument(skip(self, message, tagger), level = "debug")]
    pub fn annotated_tag(
        &self,
        name: &str,
        message: &str,
        object: Option<&str>,
        tagger: &Signature,
    ) -> Result<String> {
        let target = self
            .repository
            .find_object(self.resolve_oid(object.unwrap_or("HEAD"))?, None)?;
        let signature = git2::Signature::now(&tagger.name, &tagger.email)?;

        match self.repository.tag(name, &target, &signature, message, false) {
            Ok(oid) => Ok(oid.to_string()),
            Err(err) if err.code() == ErrorCode::Exists => Err(GitError::TagExists {
                name: name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        let names = self.repository.tag_names(None)?;
        let mut tags = names.iter().flatten().map(str::to_string).collect::<Vec<_>>();
        tags.sort();
        Ok(tags)
    }

    pub fn read_tag(&self, oid: &str) -> Result<TagInfo> {
        let tag = self.repository.find_tag(Oid::from_str(oid)?)?;
        let tagger = tag.tagger();
        let message = tag.message().unwrap_or_default();

        Ok(TagInfo {
            oid: tag.id().to_string(),
            name: tag.name().unwrap_or_default().to_string(),
            object: tag.target_id().to_string(),
            tagger: tagger
                .as_ref()
                .map(|who| Signature::new(who.name().unwrap_or_default(), who.email().unwrap_or_default()))
                .unwrap_or_default(),
            timestamp: tagger.map(|who| who.when().seconds()).unwrap_or_default(),
            message: message.strip_suffix('\n').unwrap_or(message).to_string(),
        })
    }

    pub fn add_remote(&self, remote: &str, url: &str) -> Result<()> {
        self.repository.remote(remote, url)?;
        Ok(())
    }

    pub fn remove_remote(&self, remote: &str) -> Result<()> {
        self.repository.remote_delete(remote)?;
        Ok(())
    }

    pub fn list_remotes(&self) -> Result<Vec<RemoteInfo>> {
        let mut remotes = Vec::new();
        for name in self.repository.remotes()?.iter().flatten() {
            let remote = self.repository.find_remote(name)?;
            remotes.push(RemoteInfo {
                remote: name.to_string(),
                url: remote.url().unwrap_or_default().to_string(),
            });
        }

        Ok(remotes)
    }

    fn authenticator(token: Option<&str>) -> GitAuthenticator {
        let authenticator = GitAuthenticator::default();
        match token {
            Some(token) => authenticator.add_plaintext_credentials("*", TOKEN_USERNAME, token),
            None => authenticator,
        }
    }

    #[instrument(skip(self, token), level = "debug")]
    pub fn fetch(&self, remote: &str, branch: &str, token: Option<&str>) -> Result<Option<String>> {
        let authenticator = Self::authenticator(token);
        let config = self.repository.config()?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);

        let refspec = format!("refs/heads/{branch}:refs/remotes/{remote}/{branch}");
        self.repository
            .find_remote(remote)?
            .fetch(&[refspec], Some(&mut fo), None)?;
        info!("fetched {branch} from {remote}");

        match self
            .repository
            .find_reference(&format!("refs/remotes/{remote}/{branch}"))
        {
            Ok(reference) => Ok(reference.target().map(|oid| oid.to_string())),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, token), level = "debug")]
    pub fn push(&self, remote: &str, branch: &str, token: Option<&str>) -> Result<()> {
        let authenticator = Self::authenticator(token);
        let config = self.repository.config()?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));

        let mut po = PushOptions::new();
        po.remote_callbacks(rc);

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.repository
            .find_remote(remote)?
            .push(&[refspec], Some(&mut po))?;
        info!("pushed {branch} to {remote}");

        Ok(())
    }

    /// Fetch and integrate `branch` from `remote`.
    ///
    /// Conflicts are reported as [`PullOutcome::Conflicts`], leaving the
    /// conflicted merge state in place for the caller to resolve.
    #[instrument(skip(self, author, token), level = "debug")]
    pub fn pull(
        &self,
        remote: &str,
        branch: &str,
        author: &Signature,
        token: Option<&str>,
    ) -> Result<PullOutcome> {
        if self.fetch(remote, branch, token)?.is_none() {
            warn!("remote {remote} has no branch {branch}");
            return Ok(PullOutcome::UpToDate);
        }

        let fetched = self
            .repository
            .find_reference(&format!("refs/remotes/{remote}/{branch}"))?;
        let fetched = self.repository.reference_to_annotated_commit(&fetched)?;
        let (analysis, _) = self.repository.merge_analysis(&[&fetched])?;

        if analysis.is_up_to_date() {
            return Ok(PullOutcome::UpToDate);
        }

        if analysis.is_fast_forward() || analysis.is_unborn() {
            return self.fast_forward(branch, &fetched);
        }

        self.merge(remote, branch, author, &fetched)
    }

    fn fast_forward(&self, branch: &str, fetched: &AnnotatedCommit<'_>) -> Result<PullOutcome> {
        let refname = format!("refs/heads/{branch}");
        let target = fetched.id();
        match self.repository.find_reference(&refname) {
            Ok(mut reference) => {
                reference.set_target(target, "pull: fast-forward")?;
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                self.repository
                    .reference(&refname, target, true, "pull: fast-forward")?;
            }
            Err(err) => return Err(err.into()),
        }
        self.repository.set_head(&refname)?;

        let conflicts = RefCell::new(Vec::new());
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        checkout.notify_on(CheckoutNotificationType::CONFLICT);
        checkout.notify(|_, path, _, _, _| {
            if let Some(path) = path {
                conflicts.borrow_mut().push(slash_path(path));
            }
            true
        });

        let result = self.repository.checkout_head(Some(&mut checkout));
        drop(checkout);
        let conflicts = conflicts.into_inner();
        if !conflicts.is_empty() {
            return Ok(PullOutcome::Conflicts { paths: conflicts });
        }
        result?;

        Ok(PullOutcome::FastForward {
            oid: target.to_string(),
        })
    }

    fn merge(
        &self,
        remote: &str,
        branch: &str,
        author: &Signature,
        fetched: &AnnotatedCommit<'_>,
    ) -> Result<PullOutcome> {
        self.repository.merge(&[fetched], None, None)?;

        let mut index = self.repository.index()?;
        if index.has_conflicts() {
            let mut paths = BTreeSet::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    paths.insert(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            warn!("pull from {remote} produced {} conflicts", paths.len());
            return Ok(PullOutcome::Conflicts {
                paths: paths.into_iter().collect(),
            });
        }

        let tree = self.repository.find_tree(index.write_tree()?)?;
        let signature = git2::Signature::now(&author.name, &author.email)?;
        let head = self
            .head_commit()?
            .ok_or_else(|| GitError::RefNotFound {
                reference: "HEAD".into(),
            })?;
        let theirs = self.repository.find_commit(fetched.id())?;
        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge {remote}/{branch}"),
            &tree,
            &[&head, &theirs],
        )?;
        self.repository.cleanup_state()?;

        Ok(PullOutcome::Merged {
            oid: oid.to_string(),
        })
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn matches_filter(path: &str, filepaths: &[String]) -> bool {
    filepaths.is_empty()
        || filepaths.iter().any(|filter| {
            let filter = filter.trim_end_matches('/');
            filter.is_empty() || filter == "." || path == filter || path.starts_with(&format!("{filter}/"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, path: &str, contents: &str) -> anyhow::Result<()> {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    #[test]
    fn status_matrix_matches_isomorphic_codes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Git2Repo::init(dir.path(), "main")?;
        write(dir.path(), "requirements/REQ-001.md", "one\n")?;

        let rows = repo.status_matrix(&[])?;
        assert_eq!(rows[0].codes(), (0, 2, 0));

        repo.add("requirements")?;
        assert_eq!(repo.status("requirements/REQ-001.md")?, FileStatus::Added);

        let first = repo.commit("add REQ-001", &Signature::fallback())?;
        assert!(repo.status_matrix(&[])?.iter().all(StatusRow::is_clean));

        write(dir.path(), "requirements/REQ-001.md", "two\n")?;
        assert_eq!(repo.status_matrix(&[])?[0].codes(), (1, 2, 1));
        repo.add("requirements/REQ-001.md")?;
        let second = repo.commit("update REQ-001", &Signature::fallback())?;

        let history = repo.log(&LogQuery::for_path("requirements/REQ-001.md", 100))?;
        let hashes = history.iter().map(|entry| entry.hash.clone()).collect::<Vec<_>>();
        assert_eq!(hashes, vec![second.clone(), first.clone()]);
        assert_eq!(history[0].message, "update REQ-001");
        assert!(repo.is_descendent(&second, &first, None)?);

        let old = repo.read_blob(&first, Some("requirements/REQ-001.md"))?;
        assert_eq!(old, Some(b"one\n".to_vec()));
        assert_eq!(repo.read_blob(&first, Some("missing.md"))?, None);

        Ok(())
    }

    #[test]
    fn init_is_idempotent_and_tags_work() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Git2Repo::init(dir.path(), "main")?;
        assert_eq!(repo.current_branch()?.as_deref(), Some("main"));
        write(dir.path(), "README.md", "hi\n")?;
        repo.add("README.md")?;
        let head = repo.commit("init", &Signature::fallback())?;

        let repo = Git2Repo::init(dir.path(), "main")?;
        assert_eq!(repo.resolve_ref("HEAD")?, head);

        let tag = repo.annotated_tag("baseline-01", "first", None, &Signature::fallback())?;
        assert_eq!(repo.list_tags()?, vec!["baseline-01"]);
        assert_eq!(repo.read_tag(&tag)?.object, head);
        assert!(matches!(
            repo.annotated_tag("baseline-01", "again", None, &Signature::fallback()),
            Err(GitError::TagExists { .. })
        ));

        Ok(())
    }

    #[test]
    fn open_reports_missing_repository() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            Git2Repo::open(dir.path().join("nope")),
            Err(GitError::NotInitialized { .. })
        ));

        Ok(())
    }
}
