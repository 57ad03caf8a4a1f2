// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Baseline comparison and revision reconstruction.
//!
//! A baseline freezes which commit every member of a project was at. Two
//! baselines of the same project are compared by id: members only in the
//! newer one were added, members only in the older one were removed, and
//! members whose commit changed were modified. The first baseline of a
//! project has nothing to compare against, which is reported as
//! [`BaselineDiff::First`] rather than as an empty comparison.

use crate::{
    codec::Record,
    fs::FileSystem,
    git::{CommitInfo, GitBackend},
    ids::INITIAL_REVISION,
    model::{ArtifactCommit, ArtifactKind, ProjectBaseline, RecordKind},
    repository::{RepositoryService, Result},
};

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Member whose commit moved between two baselines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedArtifact {
    pub id: String,
    pub kind: ArtifactKind,

    /// Commit recorded by the older baseline.
    pub from: String,

    /// Commit recorded by the newer baseline.
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum BaselineDiff {
    /// Nothing came before, every member is listed as is.
    First { artifacts: Vec<String> },
    Compared {
        added: Vec<String>,
        removed: Vec<String>,
        modified: Vec<ModifiedArtifact>,
    },
}

impl BaselineDiff {
    pub fn is_first(&self) -> bool {
        matches!(self, Self::First { .. })
    }
}

/// Compare `current` against the baseline that came before it.
pub fn diff_baselines(current: &ProjectBaseline, previous: Option<&ProjectBaseline>) -> BaselineDiff {
    let Some(previous) = previous else {
        return BaselineDiff::First {
            artifacts: current.artifact_commits.keys().cloned().collect(),
        };
    };

    let (added, removed) = membership_delta(&current.artifact_commits, &previous.artifact_commits);
    let modified = current
        .artifact_commits
        .iter()
        .filter_map(|(id, now)| {
            let before = previous.artifact_commits.get(id)?;
            (before.commit_hash != now.commit_hash).then(|| ModifiedArtifact {
                id: id.clone(),
                kind: now.kind,
                from: before.commit_hash.clone(),
                to: now.commit_hash.clone(),
            })
        })
        .collect();

    BaselineDiff::Compared {
        added,
        removed,
        modified,
    }
}

/// Ids only in `current`, and ids only in `previous`.
pub fn membership_delta(
    current: &BTreeMap<String, ArtifactCommit>,
    previous: &BTreeMap<String, ArtifactCommit>,
) -> (Vec<String>, Vec<String>) {
    let added = current
        .keys()
        .filter(|id| !previous.contains_key(*id))
        .cloned()
        .collect();
    let removed = previous
        .keys()
        .filter(|id| !current.contains_key(*id))
        .cloned()
        .collect();

    (added, removed)
}

/// Baseline of the same project with the greatest version strictly below
/// `current`'s.
pub fn previous_baseline<'a>(
    baselines: &'a [ProjectBaseline],
    current: &ProjectBaseline,
) -> Option<&'a ProjectBaseline> {
    let version = current.version_number();
    baselines
        .iter()
        .filter(|baseline| baseline.project_id == current.project_id)
        .filter(|baseline| baseline.version_number() < version)
        .max_by_key(|baseline| baseline.version_number())
}

/// Version following the highest one in `baselines`.
pub fn next_version(baselines: &[ProjectBaseline]) -> String {
    baselines
        .iter()
        .map(ProjectBaseline::version_number)
        .max()
        .map(|version| format!("{:02}", version + 1))
        .unwrap_or_else(|| INITIAL_REVISION.to_string())
}

/// Tag name marking baseline `version`.
pub fn tag_name(version: &str) -> String {
    format!("baseline-{version}")
}

/// One commit in an artifact's history with the revision it carried then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionPoint {
    pub commit: CommitInfo,

    /// `None` when the file was absent or unreadable at that commit.
    pub revision: Option<String>,
}

/// History of one modified member between two baselines, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRevisions {
    pub id: String,
    pub kind: ArtifactKind,
    pub points: Vec<RevisionPoint>,
}

/// Resolve the revision of every modified member at every commit between the
/// two baselines.
///
/// # Invariants
///
/// - Revisions come from the file as it existed at each commit, never from
///   the current working tree.
#[instrument(skip(diff, repo), level = "debug")]
pub async fn reconstruct_revisions<F, G>(
    diff: &BaselineDiff,
    repo: &RepositoryService<F, G>,
) -> Result<Vec<ArtifactRevisions>>
where
    F: FileSystem,
    G: GitBackend,
{
    let BaselineDiff::Compared { modified, .. } = diff else {
        return Ok(Vec::new());
    };

    let mut reconstructed = Vec::with_capacity(modified.len());
    for artifact in modified {
        let kind = RecordKind::Artifact(artifact.kind);
        let rel = kind.path(&artifact.id);

        let mut points = Vec::new();
        for commit in repo.file_history_from(&rel, &artifact.to, None).await? {
            if commit.hash == artifact.from {
                break;
            }

            let revision = match repo.load_at_commit(kind, &artifact.id, &commit.hash).await? {
                Some(Record::Artifact(record)) => Some(record.header().revision.clone()),
                Some(_) | None => {
                    debug!("{} unreadable at {}", artifact.id, commit.hash);
                    None
                }
            };
            points.push(RevisionPoint { commit, revision });
        }

        if points.is_empty() {
            warn!("no commits found for {} between baselines", artifact.id);
        }

        reconstructed.push(ArtifactRevisions {
            id: artifact.id.clone(),
            kind: artifact.kind,
            points,
        });
    }

    Ok(reconstructed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{MemoryFs, MemoryStore},
        git::EmbeddedGit,
        model::Artifact,
    };
    use pretty_assertions::assert_eq;

    fn baseline(version: &str, commits: &[(&str, &str)]) -> ProjectBaseline {
        ProjectBaseline {
            id: format!("BL-0{version}"),
            project_id: "PROJ-001".into(),
            name: format!("v{version}"),
            description: String::new(),
            timestamp: 0,
            version: version.into(),
            artifact_commits: commits
                .iter()
                .map(|(id, hash)| {
                    (
                        id.to_string(),
                        ArtifactCommit {
                            commit_hash: hash.to_string(),
                            kind: ArtifactKind::Requirement,
                        },
                    )
                })
                .collect(),
            added_artifacts: Vec::new(),
            removed_artifacts: Vec::new(),
        }
    }

    #[test]
    fn diff_reports_added_removed_modified() {
        let b1 = baseline("01", &[("REQ-001", "A"), ("REQ-003", "X")]);
        let b2 = baseline("02", &[("REQ-001", "B"), ("REQ-002", "N")]);

        assert_eq!(
            diff_baselines(&b2, Some(&b1)),
            BaselineDiff::Compared {
                added: vec!["REQ-002".into()],
                removed: vec!["REQ-003".into()],
                modified: vec![ModifiedArtifact {
                    id: "REQ-001".into(),
                    kind: ArtifactKind::Requirement,
                    from: "A".into(),
                    to: "B".into(),
                }],
            }
        );
    }

    #[test]
    fn first_baseline_is_not_an_empty_diff() {
        let b1 = baseline("01", &[("REQ-001", "A")]);
        let first = diff_baselines(&b1, None);
        assert!(first.is_first());
        assert_ne!(
            first,
            BaselineDiff::Compared {
                added: vec![],
                removed: vec![],
                modified: vec![],
            }
        );

        let same = diff_baselines(&b1, Some(&b1));
        assert!(!same.is_first());
    }

    #[test]
    fn previous_is_greatest_version_below() {
        let baselines = vec![
            baseline("01", &[]),
            baseline("03", &[]),
            baseline("02", &[]),
            baseline("05", &[]),
        ];
        let current = baseline("04", &[]);
        let previous = previous_baseline(&baselines, &current);
        assert_eq!(previous.map(|baseline| baseline.version.as_str()), Some("03"));
        assert_eq!(previous_baseline(&baselines, &baselines[0]), None);

        assert_eq!(next_version(&baselines), "06");
        assert_eq!(next_version(&[]), "01");
    }

    #[tokio::test]
    async fn revisions_come_from_each_commit() -> anyhow::Result<()> {
        let fs = MemoryFs::new(MemoryStore::new());
        let repo = RepositoryService::new(fs.clone(), EmbeddedGit::new(fs.clone()), "/global");
        repo.init().await?;

        let kind = RecordKind::Artifact(ArtifactKind::Requirement);
        let mut artifact = Artifact::new(ArtifactKind::Requirement, "REQ-001", "Login");
        let mut hashes = Vec::new();
        for revision in ["01", "02", "03"] {
            artifact.header_mut().revision = revision.into();
            repo.save(&artifact.clone().into()).await?;
            hashes.push(repo.commit_artifact(kind, "REQ-001", revision).await?);
        }

        // Working tree drifts past the last baseline.
        artifact.header_mut().revision = "09".into();
        repo.save(&artifact.into()).await?;

        let b1 = baseline("01", &[("REQ-001", hashes[0].as_str())]);
        let b2 = baseline("02", &[("REQ-001", hashes[2].as_str())]);
        let diff = diff_baselines(&b2, Some(&b1));
        let revisions = reconstruct_revisions(&diff, &repo).await?;

        let points = revisions[0]
            .points
            .iter()
            .map(|point| (point.commit.hash.as_str(), point.revision.as_deref()))
            .collect::<Vec<_>>();
        assert_eq!(
            points,
            vec![
                (hashes[2].as_str(), Some("03")),
                (hashes[1].as_str(), Some("02")),
            ]
        );

        Ok(())
    }
}
