// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git-backed requirements traceability store.
//!
//! Every artifact (requirement, use case, test case, information, risk) is a
//! Markdown file with YAML-style frontmatter, committed to a git repository
//! the moment it changes. Projects group artifacts by reference, links tie
//! them together, and baselines freeze the commit each project member was at
//! so two baselines can be compared revision by revision.
//!
//! # Layers
//!
//! - [`fs`]: uniform file operations, in memory or on the host.
//! - [`git`]: repository operations, embedded or through libgit2.
//! - [`bridge`]: request and reply channel to a host that owns real files,
//!   git, and secrets.
//! - [`codec`]: Markdown encoding of every record.
//! - [`repository`]: one git repository of records.
//! - [`workspace`]: global library plus project repositories.
//! - [`baseline`]: baseline comparison and revision reconstruction.

pub mod baseline;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod fs;
pub mod git;
pub mod ids;
pub mod model;
pub mod path;
pub mod repository;
pub mod workspace;

pub use config::{Backend, Environment, Settings};
pub use model::{Artifact, ArtifactKind, Link, LinkType, Project, ProjectBaseline};
pub use repository::RepositoryService;
pub use workspace::{Scope, Workspace, WorkspaceOptions};
