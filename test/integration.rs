// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{options, HostFixture};

use reqtrace::{
    baseline::BaselineDiff,
    bridge::vault::{TokenClient, GIT_TOKEN_KEY},
    fs::FileSystem,
    git::{BridgedGit, EmbeddedGit, GitBackend, StatusRow},
    model::{ArtifactKind, LinkType},
};

use anyhow::Result;
use git2::Repository;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn head_message(path: impl AsRef<std::path::Path>) -> Result<String> {
    let repo = Repository::open(path)?;
    let head = repo.head()?.peel_to_commit()?;
    Ok(head.message().unwrap_or_default().trim_end().to_string())
}

#[tokio::test]
async fn workspace_runs_over_native_host() -> Result<()> {
    let host = HostFixture::new()?;
    let ws = host.workspace();
    ws.init().await?;

    let project = ws.create_project("Checkout", "Web shop checkout").await?;
    let req = ws
        .create_artifact(ArtifactKind::Requirement, "Pay by card", "Card payments work.", Some(&project.id))
        .await?;
    let test = ws
        .create_artifact(ArtifactKind::TestCase, "Card payment", "", Some(&project.id))
        .await?;
    ws.create_link(test.id(), req.id(), LinkType::Verifies, &[]).await?;

    let first = ws.create_baseline(&project.id, "Alpha", "").await?;
    assert_eq!(first.artifact_commits.len(), 2);

    let mut edited = req.clone();
    edited.set_body("Card and wallet payments work.");
    let edited = ws.update_artifact(edited).await?;
    assert_eq!(edited.header().revision, "02");

    ws.create_baseline(&project.id, "Beta", "").await?;
    let comparison = ws.compare_baselines(&project.id, None).await?;
    let BaselineDiff::Compared { modified, added, removed } = &comparison.diff else {
        panic!("second baseline compared as first");
    };
    assert!(added.is_empty() && removed.is_empty());
    assert_eq!(modified.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["REQ-001"]);
    let revisions = comparison.revisions[0]
        .points
        .iter()
        .map(|point| point.revision.as_deref())
        .collect::<Vec<_>>();
    assert_eq!(revisions, vec![Some("02")]);

    let on_disk = std::fs::read_to_string(host.path().join("ws/global/requirements/REQ-001.md"))?;
    assert!(on_disk.starts_with("---\n"));
    assert!(on_disk.contains("Card and wallet payments work."));
    assert_eq!(head_message(host.path().join("ws/global"))?, "Update REQ-001 (rev 02)");

    let tags = Repository::open(host.path().join("ws/projects").join(&project.id))?
        .tag_names(None)?
        .iter()
        .flatten()
        .map(str::to_string)
        .collect::<Vec<_>>();
    assert_eq!(tags, vec!["baseline-01", "baseline-02"]);
    assert!(ws.pending_changes().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn embedded_commits_are_readable_by_libgit2() -> Result<()> {
    let host = HostFixture::new()?;
    let fs = host.fs();
    let git = EmbeddedGit::new(fs.clone());
    let dir = host.abs("repo");
    let author = options().author;

    git.init(&dir, "main").await?;
    fs.write_file(&format!("{dir}/a.md"), b"first\n").await?;
    git.add(&dir, "a.md").await?;
    let first = git.commit(&dir, "Add a", &author).await?;

    fs.write_file(&format!("{dir}/b.md"), b"second\n").await?;
    git.add(&dir, "b.md").await?;
    let second = git.commit(&dir, "Add b", &author).await?;
    assert_ne!(first, second);

    let objects = host.loose_objects("repo")?;
    assert!(objects.len() >= 6, "only {} loose objects", objects.len());
    assert_eq!(objects.iter().collect::<BTreeSet<_>>().len(), objects.len());

    let repo = Repository::open(host.path().join("repo"))?;
    let head = repo.head()?.peel_to_commit()?;
    assert_eq!(head.id().to_string(), second);
    assert_eq!(head.parent_id(0)?.to_string(), first);
    assert_eq!(head.author().name(), Some("John Doe"));

    let tree = head.tree()?;
    let blob = tree
        .get_name("a.md")
        .map(|entry| entry.id())
        .ok_or_else(|| anyhow::anyhow!("a.md missing from tree"))?;
    assert_eq!(repo.find_blob(blob)?.content(), b"first\n");
    assert!(tree.get_name("b.md").is_some());

    Ok(())
}

async fn status_walk<G: GitBackend>(host: &HostFixture, git: &G, rel: &str) -> Result<Vec<Vec<StatusRow>>> {
    let fs = host.fs();
    let dir = host.abs(rel);
    let author = options().author;
    let mut snapshots = Vec::new();

    git.init(&dir, "main").await?;
    fs.write_file(&format!("{dir}/notes.md"), b"hello\n").await?;
    snapshots.push(git.status_matrix(&dir, &[]).await?);

    git.add(&dir, "notes.md").await?;
    snapshots.push(git.status_matrix(&dir, &[]).await?);

    git.commit(&dir, "Add notes", &author).await?;
    snapshots.push(git.status_matrix(&dir, &[]).await?);

    Ok(snapshots)
}

#[tokio::test]
async fn status_matrix_agrees_between_engines() -> Result<()> {
    let host = HostFixture::new()?;
    let embedded = status_walk(&host, &EmbeddedGit::new(host.fs()), "embedded").await?;
    let native = status_walk(&host, &BridgedGit::new(host.bridge()), "native").await?;
    assert_eq!(embedded, native);

    let codes = embedded
        .iter()
        .map(|rows| rows.iter().map(StatusRow::codes).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(codes, vec![vec![(0, 2, 0)], vec![(0, 2, 2)], vec![(1, 1, 1)]]);

    Ok(())
}

#[tokio::test]
async fn embedded_workspace_history_is_plain_git() -> Result<()> {
    let host = HostFixture::new()?;
    let ws = host.embedded_workspace();
    ws.init().await?;

    let risk = ws.create_artifact(ArtifactKind::Risk, "Vendor outage", "", None).await?;
    ws.soft_delete(risk.id()).await?;

    assert_eq!(head_message(host.path().join("ws/global"))?, "Delete RISK-001");
    assert_eq!(ws.history(risk.id(), None).await?.len(), 2);
    assert!(ws.list_artifacts(ArtifactKind::Risk, None, false).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn tokens_stay_on_host() -> Result<()> {
    let host = HostFixture::new()?;
    let tokens = TokenClient::new(host.bridge());

    assert_eq!(tokens.get_token(GIT_TOKEN_KEY).await?, None);
    tokens.set_token(GIT_TOKEN_KEY, "ghp_secret").await?;
    assert_eq!(tokens.get_token(GIT_TOKEN_KEY).await?.as_deref(), Some("ghp_secret"));
    tokens.remove_token(GIT_TOKEN_KEY).await?;
    assert_eq!(tokens.get_token(GIT_TOKEN_KEY).await?, None);

    Ok(())
}
