// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git backends.
//!
//! Every repository reqtrace manages is an ordinary git repository that any
//! standard git tooling can inspect out-of-band. The [`GitBackend`] trait is
//! the narrow surface the rest of the crate uses to talk to one. It mirrors
//! the per-directory request surface of the desktop bridge: each call names
//! the repository directory it acts on.
//!
//! Three implementations exist:
//!
//! - [`EmbeddedGit`], a pure implementation of the loose object format that
//!   writes through any [`FileSystem`](crate::fs::FileSystem).
//! - [`Git2Repo`], blocking libgit2 access to a repository on the native
//!   disk. Only the bridge host uses it.
//! - [`BridgedGit`], which forwards every call to the host over the `git:*`
//!   bridge channels.
//!
//! # Status Matrix
//!
//! File state is reported as a [`StatusRow`] holding three integer codes for
//! HEAD, working directory, and stage. The codes follow the isomorphic-git
//! convention exactly, because callers branch on the raw integers:
//!
//! | column | 0 | 1 | 2 | 3 |
//! |---|---|---|---|---|
//! | HEAD | absent | present | | |
//! | WORKDIR | absent | same as HEAD | differs from HEAD | |
//! | STAGE | absent | same as HEAD | same as WORKDIR | differs from both |
//!
//! A file is clean iff its row is `(1, 1, 1)`.

pub mod bridged;
pub mod embedded;
pub mod index;
pub mod native;
pub mod object;

pub use bridged::BridgedGit;
pub use embedded::EmbeddedGit;
pub use native::Git2Repo;

use crate::{bridge::BridgeError, fs::FsError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Default branch name of new repositories.
pub const DEFAULT_BRANCH: &str = "main";

/// Name and email of a commit author or tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Identity used when caller supplies none.
    pub fn fallback() -> Self {
        Self::new("ReqTrace User", "user@reqtrace.local")
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::fallback()
    }
}

impl Display for Signature {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} <{}>", self.name, self.email)
    }
}

/// One entry of a commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author: Signature,

    /// Author time in seconds since the epoch.
    pub timestamp: i64,
}

/// Commit log query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Reference to start walking from.
    #[serde(rename = "ref", default = "head_ref")]
    pub reference: String,

    /// Only report commits that changed this path.
    #[serde(default)]
    pub filepath: Option<String>,

    /// Maximum number of commits to report.
    #[serde(default)]
    pub depth: Option<usize>,
}

fn head_ref() -> String {
    "HEAD".to_string()
}

impl LogQuery {
    pub fn for_path(filepath: impl Into<String>, depth: usize) -> Self {
        Self {
            filepath: Some(filepath.into()),
            depth: Some(depth),
            ..Default::default()
        }
    }
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            reference: head_ref(),
            filepath: None,
            depth: None,
        }
    }
}

/// One row of the status matrix.
///
/// Serialized in the `[path, head, workdir, stage]` tuple form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u8, u8, u8)", into = "(String, u8, u8, u8)")]
pub struct StatusRow {
    pub path: String,
    pub head: u8,
    pub workdir: u8,
    pub stage: u8,
}

impl StatusRow {
    /// Derive status codes from the blob ids found in each tree.
    pub fn from_oids(
        path: impl Into<String>,
        head: Option<&str>,
        workdir: Option<&str>,
        stage: Option<&str>,
    ) -> Self {
        let head_code = u8::from(head.is_some());
        let workdir_code = match workdir {
            None => 0,
            Some(oid) if Some(oid) == head => 1,
            Some(_) => 2,
        };
        let stage_code = match stage {
            None => 0,
            Some(oid) if Some(oid) == head => 1,
            Some(oid) if Some(oid) == workdir => 2,
            Some(_) => 3,
        };

        Self {
            path: path.into(),
            head: head_code,
            workdir: workdir_code,
            stage: stage_code,
        }
    }

    pub fn is_clean(&self) -> bool {
        (self.head, self.workdir, self.stage) == (1, 1, 1)
    }

    pub fn codes(&self) -> (u8, u8, u8) {
        (self.head, self.workdir, self.stage)
    }
}

impl From<(String, u8, u8, u8)> for StatusRow {
    fn from((path, head, workdir, stage): (String, u8, u8, u8)) -> Self {
        Self {
            path,
            head,
            workdir,
            stage,
        }
    }
}

impl From<StatusRow> for (String, u8, u8, u8) {
    fn from(row: StatusRow) -> Self {
        (row.path, row.head, row.workdir, row.stage)
    }
}

/// Human readable status of a single file.
///
/// Names with a leading `*` mark states where the stage does not match the
/// working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    #[serde(rename = "ignored")]
    Ignored,
    #[serde(rename = "unmodified")]
    Unmodified,
    #[serde(rename = "*modified")]
    WorkdirModified,
    #[serde(rename = "*deleted")]
    WorkdirDeleted,
    #[serde(rename = "*added")]
    WorkdirAdded,
    #[serde(rename = "absent")]
    Absent,
    #[serde(rename = "modified")]
    Modified,
    #[serde(rename = "deleted")]
    Deleted,
    #[serde(rename = "added")]
    Added,
    #[serde(rename = "*unmodified")]
    StagedUnmodified,
    #[serde(rename = "*absent")]
    StagedAbsent,
    #[serde(rename = "*undeleted")]
    Undeleted,
    #[serde(rename = "*undeletemodified")]
    UndeleteModified,
}

impl FileStatus {
    /// Map status matrix row to named status.
    pub fn from_row(row: &StatusRow) -> Self {
        match row.codes() {
            (0, 0, 0) => Self::Absent,
            (0, 0, _) => Self::StagedAbsent,
            (0, _, 2) => Self::Added,
            (0, _, _) => Self::WorkdirAdded,
            (_, 0, 0) => Self::Deleted,
            (_, 0, _) => Self::WorkdirDeleted,
            (_, 1, 0) => Self::Undeleted,
            (_, _, 0) => Self::UndeleteModified,
            (_, 1, 1) => Self::Unmodified,
            (_, 1, _) => Self::StagedUnmodified,
            (_, _, 2) => Self::Modified,
            (_, _, _) => Self::WorkdirModified,
        }
    }
}

/// Annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Id of the tag object itself.
    pub oid: String,
    pub name: String,

    /// Id of the tagged object.
    pub object: String,
    pub tagger: Signature,
    pub timestamp: i64,
    pub message: String,
}

/// Configured remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub remote: String,
    pub url: String,
}

/// Outcome of a pull.
///
/// Conflicts are a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PullReport", into = "PullReport")]
pub enum PullOutcome {
    UpToDate,
    FastForward { oid: String },
    Merged { oid: String },
    Conflicts { paths: Vec<String> },
}

impl PullOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflicts { .. })
    }
}

/// Wire form of [`PullOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub ok: bool,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl From<PullOutcome> for PullReport {
    fn from(outcome: PullOutcome) -> Self {
        let (ok, status, oid, conflicts) = match outcome {
            PullOutcome::UpToDate => (true, "up-to-date", None, Vec::new()),
            PullOutcome::FastForward { oid } => (true, "fast-forward", Some(oid), Vec::new()),
            PullOutcome::Merged { oid } => (true, "merged", Some(oid), Vec::new()),
            PullOutcome::Conflicts { paths } => (false, "conflicts", None, paths),
        };

        Self {
            ok,
            status: status.to_string(),
            oid,
            conflicts,
        }
    }
}

impl From<PullReport> for PullOutcome {
    fn from(report: PullReport) -> Self {
        match (report.ok, report.status.as_str(), report.oid) {
            (false, _, _) => Self::Conflicts {
                paths: report.conflicts,
            },
            (true, "fast-forward", Some(oid)) => Self::FastForward { oid },
            (true, "merged", Some(oid)) => Self::Merged { oid },
            _ => Self::UpToDate,
        }
    }
}

/// Per-directory git operations.
///
/// Handles are cheap to clone. Every method receives the repository's
/// working directory and paths relative to it.
#[async_trait]
pub trait GitBackend: Clone + Send + Sync + 'static {
    /// Initialize repository at `dir`.
    ///
    /// Calling this on an initialized repository does nothing.
    async fn init(&self, dir: &str, default_branch: &str) -> Result<()>;

    /// Stage file or directory at `filepath`.
    async fn add(&self, dir: &str, filepath: &str) -> Result<()>;

    /// Remove `filepath` from the stage, leaving the working tree alone.
    async fn remove(&self, dir: &str, filepath: &str) -> Result<()>;

    /// Commit stage onto current branch, returning the new commit id.
    async fn commit(&self, dir: &str, message: &str, author: &Signature) -> Result<String>;

    /// Walk commit log newest first.
    async fn log(&self, dir: &str, query: &LogQuery) -> Result<Vec<CommitInfo>>;

    async fn status(&self, dir: &str, filepath: &str) -> Result<FileStatus>;

    /// Status of every file, or only those at or below `filepaths`.
    async fn status_matrix(&self, dir: &str, filepaths: &[String]) -> Result<Vec<StatusRow>>;

    /// Files in the stage, or in the tree of `reference` when given.
    async fn list_files(&self, dir: &str, reference: Option<&str>) -> Result<Vec<String>>;

    /// Read blob contents.
    ///
    /// With a `filepath`, `oid` names a commit and the blob is looked up in
    /// its tree. Yield `None` when the path does not exist there.
    async fn read_blob(&self, dir: &str, oid: &str, filepath: Option<&str>) -> Result<Option<Vec<u8>>>;

    async fn resolve_ref(&self, dir: &str, reference: &str) -> Result<String>;

    async fn is_descendent(
        &self,
        dir: &str,
        oid: &str,
        ancestor: &str,
        depth: Option<usize>,
    ) -> Result<bool>;

    /// Current branch name, `None` on detached HEAD.
    async fn current_branch(&self, dir: &str) -> Result<Option<String>>;

    /// Create annotated tag `name` on `object` (HEAD by default).
    async fn annotated_tag(
        &self,
        dir: &str,
        name: &str,
        message: &str,
        object: Option<&str>,
        tagger: &Signature,
    ) -> Result<String>;

    async fn list_tags(&self, dir: &str) -> Result<Vec<String>>;

    async fn read_tag(&self, dir: &str, oid: &str) -> Result<TagInfo>;

    async fn add_remote(&self, _dir: &str, _remote: &str, _url: &str) -> Result<()> {
        Err(GitError::Unsupported { operation: "addRemote" })
    }

    async fn remove_remote(&self, _dir: &str, _remote: &str) -> Result<()> {
        Err(GitError::Unsupported { operation: "removeRemote" })
    }

    async fn list_remotes(&self, _dir: &str) -> Result<Vec<RemoteInfo>> {
        Err(GitError::Unsupported { operation: "listRemotes" })
    }

    /// Fetch `branch` from `remote`, yielding the fetched head.
    async fn fetch(&self, _dir: &str, _remote: &str, _branch: &str) -> Result<Option<String>> {
        Err(GitError::Unsupported { operation: "fetch" })
    }

    async fn push(&self, _dir: &str, _remote: &str, _branch: &str) -> Result<()> {
        Err(GitError::Unsupported { operation: "push" })
    }

    async fn pull(
        &self,
        _dir: &str,
        _remote: &str,
        _branch: &str,
        _author: &Signature,
    ) -> Result<PullOutcome> {
        Err(GitError::Unsupported { operation: "pull" })
    }
}

/// Git error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// No repository exists at target directory.
    #[error("no git repository at {dir:?}")]
    NotInitialized { dir: String },

    /// Reference does not resolve to anything.
    #[error("could not resolve reference {reference:?}")]
    RefNotFound { reference: String },

    /// Object is missing from object store.
    #[error("object {oid} not found")]
    ObjectNotFound { oid: String },

    /// Object store or index content is malformed.
    #[error("corrupt git data: {0}")]
    Corrupt(String),

    /// Backend does not implement requested operation.
    #[error("{operation} is not supported by this git backend")]
    Unsupported { operation: &'static str },

    /// Tag name is already taken.
    #[error("tag {name:?} already exists")]
    TagExists { name: String },

    /// Filesystem access fails.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Ignore rule parsing fails.
    #[error(transparent)]
    Ignore(#[from] ignore::Error),

    /// Libgit2 operations fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Bridge round trip fails.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Native I/O fails.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simple_test_case::test_case;

    #[test_case(Some("a"), Some("a"), Some("a"), (1, 1, 1); "unmodified")]
    #[test_case(None, Some("a"), None, (0, 2, 0); "new untracked")]
    #[test_case(None, Some("a"), Some("a"), (0, 2, 2); "added")]
    #[test_case(None, Some("b"), Some("a"), (0, 2, 3); "added then modified")]
    #[test_case(Some("a"), Some("b"), Some("a"), (1, 2, 1); "modified unstaged")]
    #[test_case(Some("a"), Some("b"), Some("b"), (1, 2, 2); "modified staged")]
    #[test_case(Some("a"), Some("b"), Some("c"), (1, 2, 3); "modified partially staged")]
    #[test_case(Some("a"), None, Some("a"), (1, 0, 1); "deleted unstaged")]
    #[test_case(Some("a"), None, None, (1, 0, 0); "deleted staged")]
    #[test]
    fn status_codes(
        head: Option<&str>,
        workdir: Option<&str>,
        stage: Option<&str>,
        expect: (u8, u8, u8),
    ) {
        let row = StatusRow::from_oids("file.md", head, workdir, stage);
        assert_eq!(row.codes(), expect);
        assert_eq!(row.is_clean(), expect == (1, 1, 1));
    }

    #[test]
    fn file_status_names() -> anyhow::Result<()> {
        let names = [
            ((1, 1, 1), "unmodified"),
            ((0, 2, 0), "*added"),
            ((0, 2, 2), "added"),
            ((1, 2, 1), "*modified"),
            ((1, 2, 2), "modified"),
            ((1, 0, 1), "*deleted"),
            ((1, 0, 0), "deleted"),
            ((1, 1, 0), "*undeleted"),
            ((1, 2, 0), "*undeletemodified"),
            ((1, 1, 3), "*unmodified"),
            ((0, 0, 3), "*absent"),
        ];

        for ((head, workdir, stage), name) in names {
            let row = StatusRow {
                path: "f".into(),
                head,
                workdir,
                stage,
            };
            assert_eq!(serde_json::to_value(FileStatus::from_row(&row))?, json!(name));
        }

        Ok(())
    }

    #[test]
    fn status_row_serializes_as_tuple() -> anyhow::Result<()> {
        let row = StatusRow::from_oids("requirements/REQ-001.md", None, Some("a"), None);
        assert_eq!(serde_json::to_value(&row)?, json!(["requirements/REQ-001.md", 0, 2, 0]));

        Ok(())
    }

    #[test]
    fn pull_conflicts_report_not_ok() -> anyhow::Result<()> {
        let outcome = PullOutcome::Conflicts {
            paths: vec!["requirements/REQ-001.md".into()],
        };
        let value = serde_json::to_value(&outcome)?;
        assert_eq!(
            value,
            json!({"ok": false, "status": "conflicts", "conflicts": ["requirements/REQ-001.md"]})
        );
        assert_eq!(serde_json::from_value::<PullOutcome>(value)?, outcome);

        Ok(())
    }
}
