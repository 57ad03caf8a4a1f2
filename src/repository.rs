// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git backed record repository.
//!
//! A [`RepositoryService`] owns one repository directory. Saving a record
//! only writes its Markdown file; nothing is committed until the caller asks
//! for it, so uncommitted edits show up as pending changes derived from the
//! status matrix.
//!
//! Concurrent saves of the same record are not serialized. The last write
//! wins, and a commit racing a save may capture either version.

use crate::{
    codec::{artifact_to_markdown, markdown_to_artifact, Record},
    fs::{self, FileSystem, FsError},
    git::{
        CommitInfo, GitBackend, GitError, LogQuery, PullOutcome, RemoteInfo, Signature,
        StatusRow, TagInfo, DEFAULT_BRANCH,
    },
    ids::{IdAllocator, IdError},
    model::{ArtifactKind, RecordKind},
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, info, instrument, warn};

/// Default number of commits returned by history queries.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Lifecycle of a repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryState {
    Uninitialized,

    /// Repository exists but HEAD points at an unborn branch.
    Initialized,
    HasCommits { head: String },
}

/// How a pending path differs from HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// New file that is staged.
    Added,
    Modified,
    Deleted,

    /// New file nobody staged yet.
    Untracked,
}

impl ChangeKind {
    pub fn from_row(row: &StatusRow) -> Self {
        match (row.head, row.workdir, row.stage) {
            (0, _, 0) => Self::Untracked,
            (0, _, _) => Self::Added,
            (_, 0, _) => Self::Deleted,
            _ => Self::Modified,
        }
    }
}

impl Display for ChangeKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Untracked => "untracked",
        };
        fmt.write_str(name)
    }
}

/// Path that is not clean, with the record it belongs to when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub path: String,
    pub kind: Option<RecordKind>,
    pub id: Option<String>,
    pub change: ChangeKind,
}

impl PendingChange {
    pub fn from_row(row: &StatusRow) -> Self {
        let id = fs::file_name(&row.path)
            .strip_suffix(".md")
            .map(str::to_string);
        let kind = match row.path.as_str() {
            "project.md" => Some(RecordKind::Project),
            _ => id.as_deref().and_then(RecordKind::from_id),
        };
        let id = kind.and(id);

        Self {
            path: row.path.clone(),
            kind,
            id,
            change: ChangeKind::from_row(row),
        }
    }
}

/// Records of one git repository.
#[derive(Debug, Clone)]
pub struct RepositoryService<F: FileSystem, G: GitBackend> {
    fs: F,
    git: G,
    dir: String,
    default_branch: String,
    author: Signature,
    history_depth: usize,
    ids: IdAllocator<F>,
}

impl<F: FileSystem, G: GitBackend> RepositoryService<F, G> {
    pub fn new(fs: F, git: G, dir: impl Into<String>) -> Self {
        let dir = fs::normalize(&dir.into());
        Self {
            ids: IdAllocator::new(fs.clone(), dir.clone()),
            fs,
            git,
            dir,
            default_branch: DEFAULT_BRANCH.to_string(),
            author: Signature::fallback(),
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }

    pub fn with_author(mut self, author: Signature) -> Self {
        self.author = author;
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn ids(&self) -> &IdAllocator<F> {
        &self.ids
    }

    fn abs(&self, rel: &str) -> String {
        fs::join(&self.dir, rel)
    }

    /// Initialize repository and scaffold record directories.
    ///
    /// # Invariants
    ///
    /// - Idempotent: an existing repository keeps its history.
    #[instrument(skip(self), level = "debug")]
    pub async fn init(&self) -> Result<()> {
        self.git.init(&self.dir, &self.default_branch).await?;
        for kind in ArtifactKind::ALL {
            self.fs.mkdir(&self.abs(kind.dir()), true).await?;
        }
        for kind in [RecordKind::Link, RecordKind::SavedFilter, RecordKind::Baseline] {
            self.fs.mkdir(&self.abs(kind.dir()), true).await?;
        }
        self.fs.mkdir(&self.abs("counters"), true).await?;
        info!("repository ready at {}", self.dir);

        Ok(())
    }

    pub async fn state(&self) -> Result<RepositoryState> {
        if !self.fs.exists(&self.abs(".git")).await {
            return Ok(RepositoryState::Uninitialized);
        }

        match self.head().await? {
            Some(head) => Ok(RepositoryState::HasCommits { head }),
            None => Ok(RepositoryState::Initialized),
        }
    }

    /// Current HEAD commit, `None` on an unborn branch.
    pub async fn head(&self) -> Result<Option<String>> {
        match self.git.resolve_ref(&self.dir, "HEAD").await {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write record file without committing it.
    ///
    /// - Return [`RepositoryError::Mismatch`] if `kind` and `id` do not
    ///   describe `record`.
    #[instrument(skip(self, record), level = "debug")]
    pub async fn save_artifact(&self, kind: RecordKind, id: &str, record: &Record) -> Result<String> {
        if record.kind() != kind || record.id() != id {
            return Err(RepositoryError::Mismatch {
                expected: id.to_string(),
                found: record.id().to_string(),
            });
        }

        let rel = kind.path(id);
        self.fs
            .write_file(&self.abs(&rel), artifact_to_markdown(record).as_bytes())
            .await?;
        debug!("saved {rel}");

        Ok(rel)
    }

    /// Write any record at its own path.
    pub async fn save(&self, record: &Record) -> Result<String> {
        self.save_artifact(record.kind(), record.id(), record).await
    }

    pub async fn load_artifact(&self, kind: RecordKind, id: &str) -> Result<Option<Record>> {
        let rel = kind.path(id);
        let Some(bytes) = self.fs.read_optional(&self.abs(&rel)).await? else {
            return Ok(None);
        };

        let text = String::from_utf8_lossy(&bytes);
        match markdown_to_artifact(&text) {
            Some(record) if record.kind() == kind => Ok(Some(record)),
            Some(record) => {
                warn!("{rel} holds {} instead of {id}", record.id());
                Ok(None)
            }
            None => {
                warn!("{rel} is not a readable record");
                Ok(None)
            }
        }
    }

    /// Load every record of `kind`, skipping files that do not decode.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_records(&self, kind: RecordKind) -> Result<Vec<Record>> {
        if kind == RecordKind::Project {
            let project = self.fs.read_optional(&self.abs("project.md")).await?;
            let record = project.and_then(|bytes| markdown_to_artifact(&String::from_utf8_lossy(&bytes)));
            return Ok(record.into_iter().collect());
        }

        let dir = self.abs(kind.dir());
        let mut names = self.fs.list_files_or_empty(&dir).await?;
        names.sort();

        let mut records = Vec::new();
        for name in names.iter().filter(|name| name.ends_with(".md")) {
            let path = fs::join(&dir, name);
            let text = match self.fs.read_to_string(&path).await {
                Ok(text) => text,
                Err(err) => {
                    warn!("skipping {path}: {err}");
                    continue;
                }
            };

            match markdown_to_artifact(&text) {
                Some(record) if record.kind() == kind => records.push(record),
                Some(_) | None => warn!("skipping unreadable record {path}"),
            }
        }

        Ok(records)
    }

    /// Stage one record path, or its removal, and commit it.
    #[instrument(skip(self), level = "debug")]
    pub async fn commit_artifact(&self, kind: RecordKind, id: &str, message: &str) -> Result<String> {
        self.commit_paths(&[kind.path(id)], message).await
    }

    /// Stage exactly `rels`, or their removal, and commit them together.
    pub async fn commit_paths(&self, rels: &[String], message: &str) -> Result<String> {
        for rel in rels {
            self.stage(rel).await?;
        }
        let oid = self.git.commit(&self.dir, message, &self.author).await?;
        info!("committed {} paths as {oid}", rels.len());

        Ok(oid)
    }

    async fn stage(&self, rel: &str) -> Result<()> {
        if self.fs.exists(&self.abs(rel)).await {
            self.git.add(&self.dir, rel).await?;
        } else {
            self.git.remove(&self.dir, rel).await?;
        }

        Ok(())
    }

    /// Stage every pending path and commit.
    ///
    /// - Return [`RepositoryError::NothingToCommit`] if the tree is clean.
    #[instrument(skip(self, author), level = "debug")]
    pub async fn commit(&self, message: &str, author: Option<&Signature>) -> Result<String> {
        let pending = self.get_pending_changes().await?;
        if pending.is_empty() {
            return Err(RepositoryError::NothingToCommit {
                dir: self.dir.clone(),
            });
        }

        for change in &pending {
            match change.change {
                ChangeKind::Deleted => self.git.remove(&self.dir, &change.path).await?,
                _ => self.git.add(&self.dir, &change.path).await?,
            }
        }

        let author = author.unwrap_or(&self.author);
        let oid = self.git.commit(&self.dir, message, author).await?;
        info!("committed {} pending changes as {oid}", pending.len());

        Ok(oid)
    }

    pub async fn get_status(&self) -> Result<Vec<StatusRow>> {
        Ok(self.git.status_matrix(&self.dir, &[]).await?)
    }

    pub async fn get_pending_changes(&self) -> Result<Vec<PendingChange>> {
        let rows = self.get_status().await?;
        Ok(rows
            .iter()
            .filter(|row| !row.is_clean())
            .map(PendingChange::from_row)
            .collect())
    }

    /// Commits that touched record, most recent first.
    ///
    /// An unborn branch has no history.
    pub async fn get_artifact_history(
        &self,
        kind: RecordKind,
        id: &str,
        depth: Option<usize>,
    ) -> Result<Vec<CommitInfo>> {
        self.file_history(&kind.path(id), depth).await
    }

    pub async fn file_history(&self, rel: &str, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        if self.head().await?.is_none() {
            return Ok(Vec::new());
        }

        self.file_history_from(rel, "HEAD", depth).await
    }

    /// Commits that touched `rel`, walking back from `reference`.
    pub async fn file_history_from(
        &self,
        rel: &str,
        reference: &str,
        depth: Option<usize>,
    ) -> Result<Vec<CommitInfo>> {
        let mut query = LogQuery::for_path(rel, depth.unwrap_or(self.history_depth));
        query.reference = reference.to_string();
        Ok(self.git.log(&self.dir, &query).await?)
    }

    /// Content of `rel` as of `commit`, `None` if absent there.
    pub async fn read_file_at_commit(&self, rel: &str, commit: &str) -> Result<Option<String>> {
        let blob = self.git.read_blob(&self.dir, commit, Some(rel)).await?;
        Ok(blob.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Record as of `commit`, `None` if absent or unreadable there.
    pub async fn load_at_commit(&self, kind: RecordKind, id: &str, commit: &str) -> Result<Option<Record>> {
        let text = self.read_file_at_commit(&kind.path(id), commit).await?;
        Ok(text.and_then(|text| markdown_to_artifact(&text)))
    }

    /// Remove record file and stage the removal.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_artifact_file(&self, kind: RecordKind, id: &str) -> Result<()> {
        let rel = kind.path(id);
        match self.fs.delete_file(&self.abs(&rel)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => debug!("{rel} already gone"),
            Err(err) => return Err(err.into()),
        }
        self.git.remove(&self.dir, &rel).await?;
        info!("deleted {rel}");

        Ok(())
    }

    /// Annotate HEAD with a tag.
    pub async fn tag(&self, name: &str, message: &str) -> Result<String> {
        Ok(self
            .git
            .annotated_tag(&self.dir, name, message, None, &self.author)
            .await?)
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self.git.list_tags(&self.dir).await?)
    }

    pub async fn read_tag(&self, name: &str) -> Result<TagInfo> {
        let oid = self.git.resolve_ref(&self.dir, &format!("refs/tags/{name}")).await?;
        Ok(self.git.read_tag(&self.dir, &oid).await?)
    }

    pub async fn add_remote(&self, remote: &str, url: &str) -> Result<()> {
        Ok(self.git.add_remote(&self.dir, remote, url).await?)
    }

    pub async fn remove_remote(&self, remote: &str) -> Result<()> {
        Ok(self.git.remove_remote(&self.dir, remote).await?)
    }

    pub async fn list_remotes(&self) -> Result<Vec<RemoteInfo>> {
        Ok(self.git.list_remotes(&self.dir).await?)
    }

    /// Pull then push current branch.
    ///
    /// Conflicts stop the sync before anything is pushed.
    #[instrument(skip(self), level = "debug")]
    pub async fn sync(&self, remote: &str) -> Result<PullOutcome> {
        let branch = self
            .git
            .current_branch(&self.dir)
            .await?
            .unwrap_or_else(|| self.default_branch.clone());

        let outcome = self.git.pull(&self.dir, remote, &branch, &self.author).await?;
        if outcome.is_conflict() {
            warn!("sync of {} stopped on conflicts", self.dir);
            return Ok(outcome);
        }

        self.git.push(&self.dir, remote, &branch).await?;
        info!("synced {} with {remote}/{branch}", self.dir);

        Ok(outcome)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record {found:?} cannot be saved as {expected:?}")]
    Mismatch { expected: String, found: String },

    #[error("nothing to commit in {dir:?}")]
    NothingToCommit { dir: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Id(#[from] IdError),
}

/// Friendly result alias :3
pub type Result<T, E = RepositoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{MemoryFs, MemoryStore},
        git::EmbeddedGit,
        model::{Artifact, Requirement},
    };
    use pretty_assertions::assert_eq;

    type Service = RepositoryService<MemoryFs, EmbeddedGit<MemoryFs>>;

    async fn service() -> anyhow::Result<Service> {
        let fs = MemoryFs::new(MemoryStore::new());
        let repo = RepositoryService::new(fs.clone(), EmbeddedGit::new(fs), "/repo");
        repo.init().await?;
        Ok(repo)
    }

    fn requirement(id: &str, revision: &str) -> Record {
        let mut artifact = Artifact::new(ArtifactKind::Requirement, id, "Login");
        artifact.header_mut().revision = revision.to_string();
        artifact.into()
    }

    const REQ: RecordKind = RecordKind::Artifact(ArtifactKind::Requirement);

    #[tokio::test]
    async fn state_follows_lifecycle() -> anyhow::Result<()> {
        let fs = MemoryFs::new(MemoryStore::new());
        let repo = RepositoryService::new(fs.clone(), EmbeddedGit::new(fs), "/repo");
        assert_eq!(repo.state().await?, RepositoryState::Uninitialized);

        repo.init().await?;
        assert_eq!(repo.state().await?, RepositoryState::Initialized);

        repo.save(&requirement("REQ-001", "01")).await?;
        let oid = repo.commit_artifact(REQ, "REQ-001", "add REQ-001").await?;
        assert_eq!(repo.state().await?, RepositoryState::HasCommits { head: oid });

        Ok(())
    }

    #[tokio::test]
    async fn save_then_load() -> anyhow::Result<()> {
        let repo = service().await?;
        let record = requirement("REQ-001", "01");
        assert_eq!(repo.save(&record).await?, "requirements/REQ-001.md");
        assert_eq!(repo.load_artifact(REQ, "REQ-001").await?, Some(record));
        assert_eq!(repo.load_artifact(REQ, "REQ-404").await?, None);

        let mismatch = repo.save_artifact(REQ, "REQ-002", &requirement("REQ-001", "01")).await;
        assert!(matches!(mismatch, Err(RepositoryError::Mismatch { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn list_records_skips_garbage() -> anyhow::Result<()> {
        let repo = service().await?;
        repo.save(&requirement("REQ-002", "01")).await?;
        repo.save(&requirement("REQ-001", "01")).await?;
        repo.filesystem()
            .write_file("/repo/requirements/REQ-003.md", b"no frontmatter")
            .await?;

        let ids = repo
            .list_records(REQ)
            .await?
            .iter()
            .map(|record| record.id().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["REQ-001", "REQ-002"]);

        Ok(())
    }

    #[tokio::test]
    async fn pending_changes_partition_on_clean_rows() -> anyhow::Result<()> {
        let repo = service().await?;
        repo.save(&requirement("REQ-001", "01")).await?;
        repo.save(&requirement("REQ-002", "01")).await?;
        repo.commit("initial", None).await?;
        assert!(repo.get_pending_changes().await?.is_empty());

        repo.save(&requirement("REQ-001", "02")).await?;
        repo.save(&requirement("REQ-003", "01")).await?;
        repo.filesystem().delete_file("/repo/requirements/REQ-002.md").await?;

        let changes = repo
            .get_pending_changes()
            .await?
            .into_iter()
            .map(|change| (change.id.unwrap_or_default(), change.change))
            .collect::<Vec<_>>();
        assert_eq!(
            changes,
            vec![
                ("REQ-001".to_string(), ChangeKind::Modified),
                ("REQ-002".to_string(), ChangeKind::Deleted),
                ("REQ-003".to_string(), ChangeKind::Untracked),
            ]
        );

        let rows = repo.get_status().await?;
        assert_eq!(rows.iter().filter(|row| row.is_clean()).count(), 0);

        repo.commit("second", Some(&Signature::new("Ana", "ana@example.com"))).await?;
        assert!(repo.get_pending_changes().await?.is_empty());
        assert!(matches!(
            repo.commit("empty", None).await,
            Err(RepositoryError::NothingToCommit { .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn history_reads_revision_at_each_commit() -> anyhow::Result<()> {
        let repo = service().await?;
        assert!(repo.get_artifact_history(REQ, "REQ-001", None).await?.is_empty());

        let mut hashes = Vec::new();
        for revision in ["01", "02", "03"] {
            repo.save(&requirement("REQ-001", revision)).await?;
            hashes.push(
                repo.commit_artifact(REQ, "REQ-001", &format!("REQ-001 rev {revision}"))
                    .await?,
            );
        }

        let history = repo.get_artifact_history(REQ, "REQ-001", None).await?;
        let logged = history.iter().map(|info| info.hash.clone()).collect::<Vec<_>>();
        hashes.reverse();
        assert_eq!(logged, hashes);
        assert_eq!(history[0].message, "REQ-001 rev 03");

        let Some(Record::Artifact(Artifact::Requirement(Requirement { header, .. }))) =
            repo.load_at_commit(REQ, "REQ-001", &hashes[2]).await?
        else {
            panic!("first revision not readable");
        };
        assert_eq!(header.revision, "01");
        assert_eq!(
            repo.read_file_at_commit("requirements/REQ-404.md", &hashes[0]).await?,
            None
        );

        Ok(())
    }

    #[tokio::test]
    async fn permanent_delete_stages_removal() -> anyhow::Result<()> {
        let repo = service().await?;
        repo.save(&requirement("REQ-001", "01")).await?;
        let first = repo.commit_artifact(REQ, "REQ-001", "add").await?;

        repo.delete_artifact_file(REQ, "REQ-001").await?;
        let second = repo.commit_artifact(REQ, "REQ-001", "remove").await?;
        assert_ne!(first, second);
        assert_eq!(repo.load_artifact(REQ, "REQ-001").await?, None);
        assert_eq!(repo.get_artifact_history(REQ, "REQ-001", None).await?.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn tags_annotate_head() -> anyhow::Result<()> {
        let repo = service().await?;
        repo.save(&requirement("REQ-001", "01")).await?;
        let head = repo.commit("initial", None).await?;

        repo.tag("baseline-01", "Release").await?;
        assert_eq!(repo.list_tags().await?, vec!["baseline-01"]);
        let tag = repo.read_tag("baseline-01").await?;
        assert_eq!(tag.object, head);
        assert_eq!(tag.message, "Release");

        Ok(())
    }
}
