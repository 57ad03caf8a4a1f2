// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Global library plus per project repositories.
//!
//! A workspace root holds one global repository with every artifact and
//! link, and one repository per project:
//!
//! ```text
//! {root}/
//! ├── global/
//! │   ├── requirements/REQ-001.md
//! │   ├── links/LINK-001.md
//! │   └── counters/
//! └── projects/
//!     └── PROJ-001/
//!         ├── project.md
//!         ├── saved-filters/FILTER-001.md
//!         └── baselines/BL-001.md
//! ```
//!
//! Projects reference artifacts by id. Deleting an artifact from a project
//! only drops the membership, while the artifact itself stays in the global
//! library until deleted there.

use crate::{
    baseline::{
        diff_baselines, membership_delta, next_version, previous_baseline,
        reconstruct_revisions, tag_name, ArtifactRevisions, BaselineDiff,
    },
    codec::Record,
    fs::{self, FileSystem, FsError},
    git::{CommitInfo, GitBackend, PullOutcome, RemoteInfo, Signature, DEFAULT_BRANCH},
    ids::{increment_revision, IdError},
    model::{
        now_ms, Artifact, ArtifactCommit, ArtifactKind, Link, LinkType, Project, ProjectBaseline,
        RecordKind, SavedFilter,
    },
    repository::{PendingChange, RepositoryError, RepositoryService, DEFAULT_HISTORY_DEPTH},
};

use futures::future::try_join_all;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{info, instrument, warn};

/// Repository a workspace operation targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Global,
    Project(String),
}

impl Display for Scope {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Global => fmt.write_str("global"),
            Self::Project(id) => fmt.write_str(id),
        }
    }
}

impl From<Option<&str>> for Scope {
    fn from(project: Option<&str>) -> Self {
        match project {
            None => Self::Global,
            Some(id) => Self::Project(id.to_string()),
        }
    }
}

/// Knobs shared by every repository of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceOptions {
    pub default_branch: String,
    pub author: Signature,
    pub history_depth: usize,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_BRANCH.to_string(),
            author: Signature::fallback(),
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

/// Result of comparing a baseline against the one before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineComparison {
    pub current: ProjectBaseline,
    pub previous: Option<ProjectBaseline>,
    pub diff: BaselineDiff,
    pub revisions: Vec<ArtifactRevisions>,
}

#[derive(Debug, Clone)]
pub struct Workspace<F: FileSystem, G: GitBackend> {
    fs: F,
    git: G,
    root: String,
    options: WorkspaceOptions,
    global: RepositoryService<F, G>,
}

impl<F: FileSystem, G: GitBackend> Workspace<F, G> {
    pub fn new(fs: F, git: G, root: impl Into<String>, options: WorkspaceOptions) -> Self {
        let root = fs::normalize(&root.into());
        let global = Self::service(&fs, &git, &options, fs::join(&root, "global"));
        Self {
            fs,
            git,
            root,
            options,
            global,
        }
    }

    fn service(fs: &F, git: &G, options: &WorkspaceOptions, dir: String) -> RepositoryService<F, G> {
        RepositoryService::new(fs.clone(), git.clone(), dir)
            .with_author(options.author.clone())
            .with_default_branch(options.default_branch.clone())
            .with_history_depth(options.history_depth)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn global(&self) -> &RepositoryService<F, G> {
        &self.global
    }

    fn projects_dir(&self) -> String {
        fs::join(&self.root, "projects")
    }

    /// Repository of project `id`, whether or not it exists yet.
    pub fn project_repo(&self, id: &str) -> RepositoryService<F, G> {
        let dir = fs::join(&self.projects_dir(), id);
        Self::service(&self.fs, &self.git, &self.options, dir)
    }

    pub fn repo(&self, scope: &Scope) -> RepositoryService<F, G> {
        match scope {
            Scope::Global => self.global.clone(),
            Scope::Project(id) => self.project_repo(id),
        }
    }

    /// Initialize global repository and projects directory.
    #[instrument(skip(self), level = "debug")]
    pub async fn init(&self) -> Result<()> {
        self.global.init().await?;
        self.fs.mkdir(&self.projects_dir(), true).await?;
        info!("workspace ready at {}", self.root);

        Ok(())
    }

    /// Create artifact in the global library and commit it.
    ///
    /// The artifact is added to `project` as well when one is given.
    #[instrument(skip(self, body), level = "debug")]
    pub async fn create_artifact(
        &self,
        kind: ArtifactKind,
        title: &str,
        body: &str,
        project: Option<&str>,
    ) -> Result<Artifact> {
        if let Some(project) = project {
            self.require_project(project).await?;
        }

        let id = self.global.ids().allocate(kind.into(), &[]).await?;
        let mut artifact = Artifact::new(kind, &id, title);
        artifact.set_body(body);

        let rel = self.global.save(&artifact.clone().into()).await?;
        let counter = format!("counters/{}.md", kind.as_str());
        self.global
            .commit_paths(
                &[rel, counter],
                &format!("Create {id}: {title} (rev {})", artifact.header().revision),
            )
            .await?;

        if let Some(project) = project {
            self.add_to_project(project, &id).await?;
        }
        info!("created {id}");

        Ok(artifact)
    }

    /// Save edited artifact as the next revision and commit it.
    ///
    /// Creation time and revision are taken from the stored copy, not from
    /// `artifact`.
    #[instrument(skip(self, artifact), level = "debug")]
    pub async fn update_artifact(&self, mut artifact: Artifact) -> Result<Artifact> {
        let id = artifact.id().to_string();
        let stored = self.require_artifact(&id).await?;

        let header = artifact.header_mut();
        header.revision = increment_revision(&stored.header().revision);
        header.date_created = stored.header().date_created;
        header.last_modified = now_ms();
        let revision = header.revision.clone();

        self.global.save(&artifact.clone().into()).await?;
        self.global
            .commit_artifact(artifact.kind().into(), &id, &format!("Update {id} (rev {revision})"))
            .await?;

        Ok(artifact)
    }

    pub async fn get_artifact(&self, id: &str) -> Result<Option<Artifact>> {
        let kind = artifact_kind(id)?;
        match self.global.load_artifact(kind.into(), id).await? {
            Some(Record::Artifact(artifact)) => Ok(Some(artifact)),
            Some(_) | None => Ok(None),
        }
    }

    async fn require_artifact(&self, id: &str) -> Result<Artifact> {
        self.get_artifact(id)
            .await?
            .ok_or_else(|| WorkspaceError::UnknownArtifact { id: id.to_string() })
    }

    /// Artifacts of `kind`, restricted to `project` members when given.
    pub async fn list_artifacts(
        &self,
        kind: ArtifactKind,
        project: Option<&str>,
        include_deleted: bool,
    ) -> Result<Vec<Artifact>> {
        let members = match project {
            Some(project) => Some(
                self.require_project(project)
                    .await?
                    .members(kind)
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<_>>(),
            ),
            None => None,
        };

        Ok(self
            .global
            .list_records(kind.into())
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Artifact(artifact) => Some(artifact),
                _ => None,
            })
            .filter(|artifact| include_deleted || !artifact.header().is_deleted)
            .filter(|artifact| {
                members
                    .as_ref()
                    .is_none_or(|members| members.contains(artifact.id()))
            })
            .collect())
    }

    /// Mark artifact deleted, keeping its file and history.
    pub async fn soft_delete(&self, id: &str) -> Result<Artifact> {
        self.set_deleted(id, true).await
    }

    pub async fn restore(&self, id: &str) -> Result<Artifact> {
        self.set_deleted(id, false).await
    }

    async fn set_deleted(&self, id: &str, deleted: bool) -> Result<Artifact> {
        let mut artifact = self.require_artifact(id).await?;
        let now = now_ms();
        let header = artifact.header_mut();
        header.is_deleted = deleted;
        header.deleted_at = deleted.then_some(now);
        header.last_modified = now;

        self.global.save(&artifact.clone().into()).await?;
        let verb = if deleted { "Delete" } else { "Restore" };
        self.global
            .commit_artifact(artifact.kind().into(), id, &format!("{verb} {id}"))
            .await?;

        Ok(artifact)
    }

    /// Remove artifact file, every link touching it, and every membership.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_permanently(&self, id: &str) -> Result<()> {
        let kind = artifact_kind(id)?;
        self.require_artifact(id).await?;

        let mut removed = vec![RecordKind::from(kind).path(id)];
        for link in self.list_links(None).await? {
            if link.touches(id) {
                self.global.delete_artifact_file(RecordKind::Link, &link.id).await?;
                removed.push(RecordKind::Link.path(&link.id));
            }
        }
        self.global.delete_artifact_file(kind.into(), id).await?;
        self.global
            .commit_paths(&removed, &format!("Permanently delete {id}"))
            .await?;

        for mut project in self.list_projects().await? {
            if project.remove_member(id) {
                self.save_project(&mut project, &format!("Remove {id} from project")).await?;
            }
        }
        warn!("permanently deleted {id}");

        Ok(())
    }

    pub async fn history(&self, id: &str, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        let kind = artifact_kind(id)?;
        Ok(self.global.get_artifact_history(kind.into(), id, depth).await?)
    }

    /// Pending changes of every repository in the workspace.
    pub async fn pending_changes(&self) -> Result<Vec<(Scope, PendingChange)>> {
        let mut scopes = vec![Scope::Global];
        scopes.extend(self.project_ids().await?.into_iter().map(Scope::Project));

        let pending = try_join_all(scopes.iter().map(|scope| async move {
            let changes = self.repo(scope).get_pending_changes().await?;
            Ok::<_, WorkspaceError>(changes.into_iter().map(move |change| (scope.clone(), change)))
        }))
        .await?;

        Ok(pending.into_iter().flatten().collect())
    }

    /// Commit pending changes of every repository that has some.
    #[instrument(skip(self), level = "debug")]
    pub async fn commit_all(&self, message: &str) -> Result<Vec<(Scope, String)>> {
        let scopes = self
            .pending_changes()
            .await?
            .into_iter()
            .map(|(scope, _)| scope)
            .collect::<BTreeSet<_>>();

        let mut commits = Vec::new();
        for scope in scopes {
            let oid = self.repo(&scope).commit(message, None).await?;
            commits.push((scope, oid));
        }

        Ok(commits)
    }

    /// Create repository and scaffolding for project `id`.
    pub async fn create_project_directory(&self, id: &str) -> Result<RepositoryService<F, G>> {
        let repo = self.project_repo(id);
        repo.init().await?;
        Ok(repo)
    }

    #[instrument(skip(self, description), level = "debug")]
    pub async fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        let used = self.project_ids().await?;
        let id = self.global.ids().allocate(RecordKind::Project, &used).await?;
        self.global
            .commit_paths(&["counters/project.md".to_string()], &format!("Allocate {id}"))
            .await?;

        self.create_project_directory(&id).await?;
        let mut project = Project::new(&id, name, description);
        self.save_project(&mut project, &format!("Create project {id}: {name}"))
            .await?;
        info!("created project {id}");

        Ok(project)
    }

    async fn save_project(&self, project: &mut Project, message: &str) -> Result<()> {
        project.last_modified = now_ms();
        let repo = self.project_repo(&project.id);
        repo.save(&Record::Project(project.clone())).await?;
        repo.commit_artifact(RecordKind::Project, &project.id, message)
            .await?;
        Ok(())
    }

    /// Ids of every project directory, sorted.
    pub async fn project_ids(&self) -> Result<Vec<String>> {
        let entries = match self.fs.list_entries(&self.projects_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        // INVARIANT: a project directory without project.md is a deleted
        // project whose empty directories were left behind.
        let mut ids = Vec::new();
        for name in entries {
            if RecordKind::from_id(&name) != Some(RecordKind::Project) {
                continue;
            }

            let record = fs::join(&fs::join(&self.projects_dir(), &name), "project.md");
            if self.fs.exists(&record).await {
                ids.push(name);
            }
        }

        Ok(ids)
    }

    pub async fn load_project(&self, id: &str) -> Result<Option<Project>> {
        match self.project_repo(id).load_artifact(RecordKind::Project, id).await? {
            Some(Record::Project(project)) => Ok(Some(project)),
            Some(_) | None => Ok(None),
        }
    }

    async fn require_project(&self, id: &str) -> Result<Project> {
        self.load_project(id)
            .await?
            .ok_or_else(|| WorkspaceError::UnknownProject { id: id.to_string() })
    }

    /// Load every project concurrently.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let ids = self.project_ids().await?;
        let projects = try_join_all(ids.iter().map(|id| self.load_project(id))).await?;
        Ok(projects.into_iter().flatten().collect())
    }

    /// Remove every file of project `id`, history included.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_project(&self, id: &str) -> Result<usize> {
        self.require_project(id).await?;
        let removed = fs::remove_tree(&self.fs, &fs::join(&self.projects_dir(), id)).await?;
        warn!("deleted project {id} ({removed} files)");
        Ok(removed)
    }

    /// Add artifact to project, returning whether it was new there.
    pub async fn add_to_project(&self, project_id: &str, artifact_id: &str) -> Result<bool> {
        let kind = artifact_kind(artifact_id)?;
        self.require_artifact(artifact_id).await?;
        let mut project = self.require_project(project_id).await?;
        if !project.add_member(kind, artifact_id) {
            return Ok(false);
        }

        self.save_project(&mut project, &format!("Add {artifact_id} to project"))
            .await?;
        Ok(true)
    }

    pub async fn remove_from_project(&self, project_id: &str, artifact_id: &str) -> Result<bool> {
        let mut project = self.require_project(project_id).await?;
        if !project.remove_member(artifact_id) {
            return Ok(false);
        }

        self.save_project(&mut project, &format!("Remove {artifact_id} from project"))
            .await?;
        Ok(true)
    }

    /// Link two existing artifacts and commit the link.
    #[instrument(skip(self), level = "debug")]
    pub async fn create_link(
        &self,
        source: &str,
        target: &str,
        link_type: LinkType,
        projects: &[String],
    ) -> Result<Link> {
        self.require_artifact(source).await?;
        self.require_artifact(target).await?;
        for project in projects {
            self.require_project(project).await?;
        }

        let id = self.global.ids().allocate(RecordKind::Link, &[]).await?;
        let mut link = Link::new(&id, source, target, link_type);
        link.project_ids = projects.to_vec();

        let rel = self.global.save(&Record::Link(link.clone())).await?;
        self.global
            .commit_paths(
                &[rel, "counters/link.md".to_string()],
                &format!("Link {source} {link_type} {target}"),
            )
            .await?;

        Ok(link)
    }

    /// Links visible when viewing `project`, or every link for `None`.
    pub async fn list_links(&self, project: Option<&str>) -> Result<Vec<Link>> {
        Ok(self
            .global
            .list_records(RecordKind::Link)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Link(link) => Some(link),
                _ => None,
            })
            .filter(|link| link.visible_in(project))
            .collect())
    }

    pub async fn delete_link(&self, id: &str) -> Result<()> {
        self.global.delete_artifact_file(RecordKind::Link, id).await?;
        self.global
            .commit_artifact(RecordKind::Link, id, &format!("Remove link {id}"))
            .await?;
        Ok(())
    }

    pub async fn save_filter(
        &self,
        project_id: &str,
        name: &str,
        filters: serde_json::Value,
    ) -> Result<SavedFilter> {
        self.require_project(project_id).await?;
        let repo = self.project_repo(project_id);
        let id = repo.ids().allocate(RecordKind::SavedFilter, &[]).await?;
        let filter = SavedFilter::new(&id, name, filters);

        let rel = repo.save(&Record::SavedFilter(filter.clone())).await?;
        repo.commit_paths(
            &[rel, "counters/filter.md".to_string()],
            &format!("Save filter {id}: {name}"),
        )
        .await?;

        Ok(filter)
    }

    pub async fn list_filters(&self, project_id: &str) -> Result<Vec<SavedFilter>> {
        Ok(self
            .project_repo(project_id)
            .list_records(RecordKind::SavedFilter)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::SavedFilter(filter) => Some(filter),
                _ => None,
            })
            .collect())
    }

    pub async fn delete_filter(&self, project_id: &str, id: &str) -> Result<()> {
        let repo = self.project_repo(project_id);
        repo.delete_artifact_file(RecordKind::SavedFilter, id).await?;
        repo.commit_artifact(RecordKind::SavedFilter, id, &format!("Remove filter {id}"))
            .await?;
        Ok(())
    }

    /// Freeze the commit every member of `project_id` is at.
    ///
    /// Members with uncommitted edits are committed first, so the baseline
    /// captures what is on disk. Members that were never committed are left
    /// out.
    #[instrument(skip(self, description), level = "debug")]
    pub async fn create_baseline(
        &self,
        project_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ProjectBaseline> {
        let project = self.require_project(project_id).await?;
        let members = project.all_members();

        let member_ids = members.iter().map(|(_, id)| id.as_str()).collect::<BTreeSet<_>>();
        let unflushed = self
            .global
            .get_pending_changes()
            .await?
            .into_iter()
            .filter(|change| change.id.as_deref().is_some_and(|id| member_ids.contains(id)))
            .map(|change| change.path)
            .collect::<Vec<_>>();
        if !unflushed.is_empty() {
            self.global
                .commit_paths(&unflushed, &format!("Flush pending changes before baseline of {project_id}"))
                .await?;
        }

        let mut artifact_commits = BTreeMap::new();
        for (kind, id) in members {
            let latest = self.global.get_artifact_history(kind.into(), &id, Some(1)).await?;
            match latest.into_iter().next() {
                Some(commit) => {
                    artifact_commits.insert(
                        id,
                        ArtifactCommit {
                            commit_hash: commit.hash,
                            kind,
                        },
                    );
                }
                None => warn!("{id} has no commit, leaving it out of the baseline"),
            }
        }

        let baselines = self.list_baselines(project_id).await?;
        let version = next_version(&baselines);
        let (added_artifacts, removed_artifacts) =
            match baselines.iter().max_by_key(|baseline| baseline.version_number()) {
                Some(previous) => membership_delta(&artifact_commits, &previous.artifact_commits),
                None => (Vec::new(), Vec::new()),
            };

        let repo = self.project_repo(project_id);
        let id = repo.ids().allocate(RecordKind::Baseline, &[]).await?;
        let baseline = ProjectBaseline {
            id: id.clone(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            timestamp: now_ms(),
            version: version.clone(),
            artifact_commits,
            added_artifacts,
            removed_artifacts,
        };

        let rel = repo.save(&Record::Baseline(baseline.clone())).await?;
        repo.commit_paths(
            &[rel, "counters/baseline.md".to_string()],
            &format!("Baseline {version}: {name}"),
        )
        .await?;
        repo.tag(&tag_name(&version), name).await?;
        info!("created baseline {version} of {project_id}");

        Ok(baseline)
    }

    /// Baselines of project, oldest version first.
    pub async fn list_baselines(&self, project_id: &str) -> Result<Vec<ProjectBaseline>> {
        let mut baselines = self
            .project_repo(project_id)
            .list_records(RecordKind::Baseline)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Baseline(baseline) => Some(baseline),
                _ => None,
            })
            .collect::<Vec<_>>();
        baselines.sort_by_key(ProjectBaseline::version_number);

        Ok(baselines)
    }

    /// Compare baseline `version`, or the latest one, against its
    /// predecessor.
    pub async fn compare_baselines(
        &self,
        project_id: &str,
        version: Option<&str>,
    ) -> Result<BaselineComparison> {
        let baselines = self.list_baselines(project_id).await?;
        let current = match version {
            Some(version) => {
                let wanted = version.trim().parse::<u32>().map_err(|_| {
                    WorkspaceError::InvalidVersion {
                        version: version.to_string(),
                    }
                })?;
                baselines
                    .iter()
                    .find(|baseline| baseline.version_number() == wanted)
            }
            None => baselines.last(),
        }
        .cloned()
        .ok_or_else(|| WorkspaceError::UnknownBaseline {
            project: project_id.to_string(),
            version: version.unwrap_or("latest").to_string(),
        })?;

        let previous = previous_baseline(&baselines, &current).cloned();
        let diff = diff_baselines(&current, previous.as_ref());
        let revisions = reconstruct_revisions(&diff, &self.global).await?;

        Ok(BaselineComparison {
            current,
            previous,
            diff,
            revisions,
        })
    }

    pub async fn add_remote(&self, scope: &Scope, remote: &str, url: &str) -> Result<()> {
        Ok(self.repo(scope).add_remote(remote, url).await?)
    }

    pub async fn list_remotes(&self, scope: &Scope) -> Result<Vec<RemoteInfo>> {
        Ok(self.repo(scope).list_remotes().await?)
    }

    pub async fn sync(&self, scope: &Scope, remote: &str) -> Result<PullOutcome> {
        Ok(self.repo(scope).sync(remote).await?)
    }
}

fn artifact_kind(id: &str) -> Result<ArtifactKind> {
    match RecordKind::from_id(id) {
        Some(RecordKind::Artifact(kind)) => Ok(kind),
        _ => Err(WorkspaceError::InvalidId { id: id.to_string() }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("{id:?} is not an artifact id")]
    InvalidId { id: String },

    #[error("artifact {id} does not exist")]
    UnknownArtifact { id: String },

    #[error("project {id} does not exist")]
    UnknownProject { id: String },

    #[error("{version:?} is not a baseline version number")]
    InvalidVersion { version: String },

    #[error("project {project} has no baseline {version}")]
    UnknownBaseline { project: String, version: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Id(#[from] IdError),
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
