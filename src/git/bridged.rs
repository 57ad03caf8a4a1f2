// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git backend forwarding to the native host.

use crate::{
    bridge::{args, BridgeClient, Channel},
    git::{
        CommitInfo, FileStatus, GitBackend, GitError, LogQuery, PullOutcome, RemoteInfo, Result,
        Signature, StatusRow, TagInfo,
    },
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Every call is one round trip over the `git:*` channels.
#[derive(Debug, Clone)]
pub struct BridgedGit {
    bridge: BridgeClient,
}

impl BridgedGit {
    pub fn new(bridge: BridgeClient) -> Self {
        Self { bridge }
    }

    async fn call<A, T>(&self, channel: Channel, args: &A) -> Result<T>
    where
        A: Serialize + Sync,
        T: DeserializeOwned,
    {
        Ok(self.bridge.call(channel, args).await?)
    }
}

fn dir_args(dir: &str) -> args::Dir {
    args::Dir { dir: dir.to_string() }
}

fn file_args(dir: &str, filepath: &str) -> args::FilePath {
    args::FilePath {
        dir: dir.to_string(),
        filepath: filepath.to_string(),
    }
}

fn remote_args(dir: &str, remote: &str, branch: &str, author: Option<&Signature>) -> args::Remote {
    args::Remote {
        dir: dir.to_string(),
        remote: remote.to_string(),
        branch: branch.to_string(),
        author: author.cloned(),
    }
}

#[async_trait]
impl GitBackend for BridgedGit {
    async fn init(&self, dir: &str, default_branch: &str) -> Result<()> {
        let args = args::Init {
            dir: dir.to_string(),
            default_branch: default_branch.to_string(),
        };
        self.call(Channel::GitInit, &args).await
    }

    async fn add(&self, dir: &str, filepath: &str) -> Result<()> {
        self.call(Channel::GitAdd, &file_args(dir, filepath)).await
    }

    async fn remove(&self, dir: &str, filepath: &str) -> Result<()> {
        self.call(Channel::GitRemove, &file_args(dir, filepath)).await
    }

    async fn commit(&self, dir: &str, message: &str, author: &Signature) -> Result<String> {
        let args = args::Commit {
            dir: dir.to_string(),
            message: message.to_string(),
            author: author.clone(),
        };
        self.call(Channel::GitCommit, &args).await
    }

    async fn log(&self, dir: &str, query: &LogQuery) -> Result<Vec<CommitInfo>> {
        let args = args::Log {
            dir: dir.to_string(),
            query: query.clone(),
        };
        self.call(Channel::GitLog, &args).await
    }

    async fn status(&self, dir: &str, filepath: &str) -> Result<FileStatus> {
        self.call(Channel::GitStatus, &file_args(dir, filepath)).await
    }

    async fn status_matrix(&self, dir: &str, filepaths: &[String]) -> Result<Vec<StatusRow>> {
        let args = args::StatusMatrix {
            dir: dir.to_string(),
            filepaths: filepaths.to_vec(),
        };
        self.call(Channel::GitStatusMatrix, &args).await
    }

    async fn list_files(&self, dir: &str, reference: Option<&str>) -> Result<Vec<String>> {
        let args = args::ListFiles {
            dir: dir.to_string(),
            reference: reference.map(str::to_string),
        };
        self.call(Channel::GitListFiles, &args).await
    }

    async fn read_blob(&self, dir: &str, oid: &str, filepath: Option<&str>) -> Result<Option<Vec<u8>>> {
        let args = args::ReadBlob {
            dir: dir.to_string(),
            oid: oid.to_string(),
            filepath: filepath.map(str::to_string),
        };
        self.call(Channel::GitReadBlob, &args).await
    }

    async fn resolve_ref(&self, dir: &str, reference: &str) -> Result<String> {
        let args = args::ResolveRef {
            dir: dir.to_string(),
            reference: reference.to_string(),
        };
        self.call::<_, Option<String>>(Channel::GitResolveRef, &args)
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
        let args = args::IsDescendent {
            dir: dir.to_string(),
            oid: oid.to_string(),
            ancestor: ancestor.to_string(),
            depth,
        };
        self.call(Channel::GitIsDescendent, &args).await
    }

    async fn current_branch(&self, dir: &str) -> Result<Option<String>> {
        self.call(Channel::GitCurrentBranch, &dir_args(dir)).await
    }

    async fn annotated_tag(
        &self,
        dir: &str,
        name: &str,
        message: &str,
        object: Option<&str>,
        tagger: &Signature,
    ) -> Result<String> {
        let args = args::AnnotatedTag {
            dir: dir.to_string(),
            name: name.to_string(),
            message: message.to_string(),
            object: object.map(str::to_string),
            tagger: tagger.clone(),
        };
        self.call(Channel::GitAnnotatedTag, &args).await
    }

    async fn list_tags(&self, dir: &str) -> Result<Vec<String>> {
        self.call(Channel::GitListTags, &dir_args(dir)).await
    }

    async fn read_tag(&self, dir: &str, oid: &str) -> Result<TagInfo> {
        let args = args::ReadTag {
            dir: dir.to_string(),
            oid: oid.to_string(),
        };
        self.call(Channel::GitReadTag, &args).await
    }

    async fn add_remote(&self, dir: &str, remote: &str, url: &str) -> Result<()> {
        let args = args::AddRemote {
            dir: dir.to_string(),
            remote: remote.to_string(),
            url: url.to_string(),
        };
        self.call(Channel::GitAddRemote, &args).await
    }

    async fn remove_remote(&self, dir: &str, remote: &str) -> Result<()> {
        let args = args::RemoveRemote {
            dir: dir.to_string(),
            remote: remote.to_string(),
        };
        self.call(Channel::GitRemoveRemote, &args).await
    }

    async fn list_remotes(&self, dir: &str) -> Result<Vec<RemoteInfo>> {
        self.call(Channel::GitListRemotes, &dir_args(dir)).await
    }

    async fn fetch(&self, dir: &str, remote: &str, branch: &str) -> Result<Option<String>> {
        self.call(Channel::GitFetch, &remote_args(dir, remote, branch, None))
            .await
    }

    async fn push(&self, dir: &str, remote: &str, branch: &str) -> Result<()> {
        self.call(Channel::GitPush, &remote_args(dir, remote, branch, None))
            .await
    }

    async fn pull(
        &self,
        dir: &str,
        remote: &str,
        branch: &str,
        author: &Signature,
    ) -> Result<PullOutcome> {
        self.call(Channel::GitPull, &remote_args(dir, remote, branch, Some(author)))
            .await
    }
}
