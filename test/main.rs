// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use reqtrace::{
    bridge::{spawn_host, vault::MemoryVault, BridgeClient, Host},
    fs::NativeFs,
    git::{BridgedGit, EmbeddedGit, Signature},
    workspace::{Workspace, WorkspaceOptions},
};

use anyhow::Result;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;

/// Host serving a temporary directory with an in-memory vault.
pub(crate) struct HostFixture {
    root: TempDir,
    bridge: BridgeClient,
}

impl HostFixture {
    pub(crate) fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let host = Host::new(root.path(), Arc::new(MemoryVault::new()));
        let bridge = spawn_host(host);

        Ok(Self { root, bridge })
    }

    pub(crate) fn path(&self) -> &Path {
        self.root.path()
    }

    /// Absolute host path of `rel` as a bridge path string.
    pub(crate) fn abs(&self, rel: &str) -> String {
        self.path().join(rel).display().to_string()
    }

    pub(crate) fn bridge(&self) -> BridgeClient {
        self.bridge.clone()
    }

    pub(crate) fn fs(&self) -> NativeFs {
        NativeFs::new(self.bridge())
    }

    /// Workspace on host files with git done through libgit2.
    pub(crate) fn workspace(&self) -> Workspace<NativeFs, BridgedGit> {
        Workspace::new(self.fs(), BridgedGit::new(self.bridge()), self.abs("ws"), options())
    }

    /// Workspace on host files with git done by the embedded engine.
    pub(crate) fn embedded_workspace(&self) -> Workspace<NativeFs, EmbeddedGit<NativeFs>> {
        Workspace::new(self.fs(), EmbeddedGit::new(self.fs()), self.abs("ws"), options())
    }

    /// Every loose object file below `rel/.git/objects`.
    pub(crate) fn loose_objects(&self, rel: &str) -> Result<Vec<PathBuf>> {
        let mut objects = Vec::new();
        let dir = self.path().join(rel).join(".git").join("objects");
        for fanout in std::fs::read_dir(dir)? {
            let fanout = fanout?;
            let name = fanout.file_name().to_string_lossy().into_owned();
            if name.len() != 2 || !fanout.file_type()?.is_dir() {
                continue;
            }

            for object in std::fs::read_dir(fanout.path())? {
                objects.push(object?.path());
            }
        }
        objects.sort();

        Ok(objects)
    }
}

pub(crate) fn options() -> WorkspaceOptions {
    WorkspaceOptions {
        author: Signature::new("John Doe", "john@doe.com"),
        ..WorkspaceOptions::default()
    }
}
