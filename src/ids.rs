// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Id and revision allocation.

use crate::{
    fs::{self, FileSystem, FsError},
    model::RecordKind,
};

use tracing::{debug, instrument, warn};

/// Revision of a freshly created artifact.
pub const INITIAL_REVISION: &str = "01";

/// Numeric part of `id` when it carries `prefix`.
pub fn id_number(prefix: &str, id: &str) -> Option<u32> {
    id.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()
}

/// Next id after the highest number used with `prefix`.
///
/// Ids that carry another prefix, or no number, are ignored.
pub fn generate_next_id<'a>(prefix: &str, used: impl IntoIterator<Item = &'a str>) -> String {
    let highest = used
        .into_iter()
        .filter_map(|id| id_number(prefix, id))
        .max()
        .unwrap_or(0);
    format_id(prefix, highest + 1)
}

pub fn format_id(prefix: &str, number: u32) -> String {
    format!("{prefix}-{number:03}")
}

/// Bump revision by one, keeping at least two digits.
///
/// An unparseable revision restarts the sequence.
pub fn increment_revision(revision: &str) -> String {
    match revision.trim().parse::<u32>() {
        Ok(number) => format!("{:02}", number.saturating_add(1)),
        Err(_) => {
            warn!("revision {revision:?} is not a number, restarting at {INITIAL_REVISION}");
            INITIAL_REVISION.to_string()
        }
    }
}

/// Hands out ids for one repository.
///
/// Combines the persisted counter at `counters/{type}.md` with the numbers
/// found on disk. The counter only ever grows, so numbers freed by a
/// permanent delete are not handed out again.
#[derive(Debug, Clone)]
pub struct IdAllocator<F: FileSystem> {
    fs: F,
    root: String,
}

impl<F: FileSystem> IdAllocator<F> {
    pub fn new(fs: F, root: impl Into<String>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    fn counter_path(&self, kind: RecordKind) -> String {
        fs::join(&self.root, &format!("counters/{}.md", kind.counter()))
    }

    /// Next number the counter would hand out, 1 for a missing counter.
    pub async fn peek(&self, kind: RecordKind) -> Result<u32> {
        let path = self.counter_path(kind);
        let Some(bytes) = self.fs.read_optional(&path).await? else {
            return Ok(1);
        };

        let text = String::from_utf8_lossy(&bytes);
        match text.trim().parse::<u32>() {
            Ok(number) => Ok(number.max(1)),
            Err(_) => {
                warn!("counter {path} is corrupt, rescanning from files");
                Ok(1)
            }
        }
    }

    /// Allocate the next id of `kind`.
    ///
    /// Ids in `extra` count as used on top of the files found inside the
    /// kind's directory. Project ids live outside this repository, so their
    /// callers pass them here.
    #[instrument(skip(self, extra), level = "debug")]
    pub async fn allocate(&self, kind: RecordKind, extra: &[String]) -> Result<String> {
        let prefix = kind.prefix();
        let mut highest = extra
            .iter()
            .filter_map(|id| id_number(prefix, id))
            .max()
            .unwrap_or(0);

        if kind != RecordKind::Project {
            let dir = fs::join(&self.root, kind.dir());
            for name in self.fs.list_files_or_empty(&dir).await? {
                if let Some(number) = name.strip_suffix(".md").and_then(|id| id_number(prefix, id)) {
                    highest = highest.max(number);
                }
            }
        }

        let number = self.peek(kind).await?.max(highest + 1);
        let next = number
            .checked_add(1)
            .ok_or(IdError::Exhausted { prefix })?;
        self.fs
            .write_file(&self.counter_path(kind), next.to_string().as_bytes())
            .await?;

        let id = format_id(prefix, number);
        debug!("allocated {id}");
        Ok(id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("no ids left for prefix {prefix}")]
    Exhausted { prefix: &'static str },

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Friendly result alias :3
pub type Result<T, E = IdError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{MemoryFs, MemoryStore},
        model::ArtifactKind,
    };
    use simple_test_case::test_case;

    #[test_case("01", "02"; "first edit")]
    #[test_case("09", "10"; "carries into tens")]
    #[test_case("98", "99"; "last two digit")]
    #[test_case("99", "100"; "widens past two digits")]
    #[test_case("7", "08"; "pads single digit")]
    #[test_case("v2", "01"; "unparseable restarts")]
    #[test_case("", "01"; "empty restarts")]
    #[test]
    fn revision_increments(revision: &str, expect: &str) {
        assert_eq!(increment_revision(revision), expect);
    }

    #[test_case(&[], "REQ-001"; "empty set")]
    #[test_case(&["REQ-001", "REQ-002"], "REQ-003"; "dense set")]
    #[test_case(&["REQ-001", "REQ-007"], "REQ-008"; "gap is not reused")]
    #[test_case(&["UC-009", "REQ-002", "REQ-x"], "REQ-003"; "foreign ids ignored")]
    #[test_case(&["REQ-999"], "REQ-1000"; "widens past three digits")]
    #[test]
    fn next_id_follows_highest(used: &[&str], expect: &str) {
        assert_eq!(generate_next_id("REQ", used.iter().copied()), expect);
    }

    #[tokio::test]
    async fn allocator_never_reuses_deleted_numbers() -> anyhow::Result<()> {
        let fs = MemoryFs::new(MemoryStore::new());
        let ids = IdAllocator::new(fs.clone(), "/repo");
        let kind = RecordKind::Artifact(ArtifactKind::Requirement);

        let first = ids.allocate(kind, &[]).await?;
        fs.write_file(&format!("/repo/requirements/{first}.md"), b"").await?;
        let second = ids.allocate(kind, &[]).await?;
        fs.write_file(&format!("/repo/requirements/{second}.md"), b"").await?;
        assert_eq!((first.as_str(), second.as_str()), ("REQ-001", "REQ-002"));

        fs.delete_file("/repo/requirements/REQ-002.md").await?;
        assert_eq!(ids.allocate(kind, &[]).await?, "REQ-003");
        assert_eq!(fs.read_to_string("/repo/counters/requirement.md").await?, "4");

        Ok(())
    }

    #[tokio::test]
    async fn allocator_catches_up_with_files_on_disk() -> anyhow::Result<()> {
        let fs = MemoryFs::new(MemoryStore::new());
        fs.write_file("/repo/risks/RISK-041.md", b"").await?;
        fs.write_file("/repo/counters/risk.md", b"garbage").await?;

        let ids = IdAllocator::new(fs, "/repo");
        assert_eq!(
            ids.allocate(RecordKind::Artifact(ArtifactKind::Risk), &[]).await?,
            "RISK-042"
        );

        Ok(())
    }

    #[tokio::test]
    async fn project_ids_count_extra_ids() -> anyhow::Result<()> {
        let ids = IdAllocator::new(MemoryFs::new(MemoryStore::new()), "/global");
        let used = vec!["PROJ-002".to_string()];
        assert_eq!(ids.allocate(RecordKind::Project, &used).await?, "PROJ-003");

        Ok(())
    }
}
