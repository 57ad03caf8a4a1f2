// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Native side of the bridge.
//!
//! The host owns everything that touches the real machine: the disk below
//! its workspace root, libgit2, and the token vault. Each request is served
//! on its own task, so one slow git call does not hold up filesystem reads
//! queued behind it. Failures are turned into `{"error": ...}` replies and
//! never stop the serving loop.

use crate::{
    bridge::{
        args,
        vault::{TokenVault, VaultError, GIT_TOKEN_KEY},
        BridgeError, BridgeReceiver, Channel, Reply,
    },
    fs::{EntryKind, Metadata, NOT_FOUND_CODE},
    git::{GitError, Git2Repo, Signature},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct RawRequest {
    channel: String,
    #[serde(default)]
    args: Value,
}

/// Serves bridge requests against the native machine.
#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
    vault: Arc<dyn TokenVault>,
}

impl Host {
    /// Serve paths below `root`, keeping tokens in `vault`.
    pub fn new(root: impl Into<PathBuf>, vault: Arc<dyn TokenVault>) -> Self {
        Self {
            root: root.into(),
            vault,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve requests until every client handle is dropped.
    pub async fn serve(self, mut receiver: BridgeReceiver) {
        info!("bridge host serving {}", self.root.display());
        let host = Arc::new(self);

        while let Some(envelope) = receiver.rx.recv().await {
            let host = host.clone();
            tokio::spawn(async move {
                let reply = host.handle(&envelope.request).await;
                if envelope.reply.send(reply).is_err() {
                    debug!("client went away before reply was sent");
                }
            });
        }

        info!("bridge host stopped");
    }

    /// Answer one raw request with one raw reply.
    pub async fn handle(&self, raw: &str) -> String {
        let reply = match self.dispatch_raw(raw).await {
            Ok(value) => Reply::Ok(value),
            Err(err) => {
                debug!("request failed: {err}");
                Reply::Error(err.to_string())
            }
        };

        serde_json::to_string(&reply)
            .unwrap_or_else(|err| serde_json::json!({ "error": err.to_string() }).to_string())
    }

    async fn dispatch_raw(&self, raw: &str) -> Result<Value> {
        let request: RawRequest = serde_json::from_str(raw)?;
        let channel = Channel::from_str(&request.channel)?;
        self.dispatch(channel, request.args).await
    }

    #[instrument(skip(self, args), level = "debug")]
    async fn dispatch(&self, channel: Channel, args: Value) -> Result<Value> {
        match channel {
            Channel::FsSelectDirectory => reply(self.root.display().to_string()),
            Channel::FsReadFile => {
                let args: args::Path = decode(args)?;
                let path = self.resolve(&args.path)?;
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|err| io_error(&args.path, err))?;
                reply(text)
            }
            Channel::FsReadFileBinary => {
                let args: args::Path = decode(args)?;
                let path = self.resolve(&args.path)?;
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|err| io_error(&args.path, err))?;
                reply(data)
            }
            Channel::FsWriteFile => {
                let args: args::WriteText = decode(args)?;
                self.write(&args.path, args.contents.as_bytes()).await?;
                reply(())
            }
            Channel::FsWriteFileBinary => {
                let args: args::WriteBinary = decode(args)?;
                self.write(&args.path, &args.data).await?;
                reply(())
            }
            Channel::FsDeleteFile => {
                let args: args::Path = decode(args)?;
                let path = self.resolve(&args.path)?;
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|err| io_error(&args.path, err))?;
                reply(())
            }
            Channel::FsListFiles => {
                let args: args::Path = decode(args)?;
                reply(self.list(&args.path, true).await?)
            }
            Channel::FsListEntries => {
                let args: args::Path = decode(args)?;
                reply(self.list(&args.path, false).await?)
            }
            Channel::FsCheckExists => {
                let args: args::Path = decode(args)?;
                let path = self.resolve(&args.path)?;
                reply(tokio::fs::try_exists(&path).await.unwrap_or(false))
            }
            Channel::FsMkdir => {
                let args: args::Mkdir = decode(args)?;
                let path = self.resolve(&args.path)?;
                let made = match args.recursive {
                    true => mkdirp::mkdirp(&path).map(|_| ()),
                    false => tokio::fs::create_dir(&path).await,
                };
                match made {
                    Ok(()) => reply(()),
                    Err(err) if err.kind() == ErrorKind::AlreadyExists => reply(()),
                    Err(err) => Err(io_error(&args.path, err)),
                }
            }
            Channel::FsStat => {
                let args: args::Path = decode(args)?;
                let path = self.resolve(&args.path)?;
                let meta = tokio::fs::metadata(&path)
                    .await
                    .map_err(|err| io_error(&args.path, err))?;
                reply(Metadata {
                    kind: match meta.is_dir() {
                        true => EntryKind::Directory,
                        false => EntryKind::File,
                    },
                    len: meta.len(),
                })
            }
            Channel::GitInit => {
                let args: args::Init = decode(args)?;
                let dir = self.resolve(&args.dir)?;
                blocking(move || Git2Repo::init(&dir, &args.default_branch).map(|_| ())).await
            }
            Channel::GitAdd => {
                let args: args::FilePath = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.add(&args.filepath)).await
            }
            Channel::GitRemove => {
                let args: args::FilePath = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.remove(&args.filepath)).await
            }
            Channel::GitCommit => {
                let args: args::Commit = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.commit(&args.message, &args.author))
                    .await
            }
            Channel::GitLog => {
                let args: args::Log = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.log(&args.query)).await
            }
            Channel::GitStatus => {
                let args: args::FilePath = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.status(&args.filepath)).await
            }
            Channel::GitStatusMatrix => {
                let args: args::StatusMatrix = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.status_matrix(&args.filepaths))
                    .await
            }
            Channel::GitListFiles => {
                let args: args::ListFiles = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.list_files(args.reference.as_deref()))
                    .await
            }
            Channel::GitReadBlob => {
                let args: args::ReadBlob = decode(args)?;
                self.with_repo(&args.dir, move |repo| {
                    repo.read_blob(&args.oid, args.filepath.as_deref())
                })
                .await
            }
            Channel::GitResolveRef => {
                let args: args::ResolveRef = decode(args)?;
                self.with_repo(&args.dir, move |repo| match repo.resolve_ref(&args.reference) {
                    Ok(oid) => Ok(Some(oid)),
                    Err(GitError::RefNotFound { .. }) => Ok(None),
                    Err(err) => Err(err),
                })
                .await
            }
            Channel::GitIsDescendent => {
                let args: args::IsDescendent = decode(args)?;
                self.with_repo(&args.dir, move |repo| {
                    repo.is_descendent(&args.oid, &args.ancestor, args.depth)
                })
                .await
            }
            Channel::GitCurrentBranch => {
                let args: args::Dir = decode(args)?;
                self.with_repo(&args.dir, |repo| repo.current_branch()).await
            }
            Channel::GitAnnotatedTag => {
                let args: args::AnnotatedTag = decode(args)?;
                self.with_repo(&args.dir, move |repo| {
                    repo.annotated_tag(&args.name, &args.message, args.object.as_deref(), &args.tagger)
                })
                .await
            }
            Channel::GitListTags => {
                let args: args::Dir = decode(args)?;
                self.with_repo(&args.dir, |repo| repo.list_tags()).await
            }
            Channel::GitReadTag => {
                let args: args::ReadTag = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.read_tag(&args.oid)).await
            }
            Channel::GitAddRemote => {
                let args: args::AddRemote = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.add_remote(&args.remote, &args.url))
                    .await
            }
            Channel::GitRemoveRemote => {
                let args: args::RemoveRemote = decode(args)?;
                self.with_repo(&args.dir, move |repo| repo.remove_remote(&args.remote)).await
            }
            Channel::GitListRemotes => {
                let args: args::Dir = decode(args)?;
                self.with_repo(&args.dir, |repo| repo.list_remotes()).await
            }
            Channel::GitFetch => {
                let args: args::Remote = decode(args)?;
                let token = self.vault.get(GIT_TOKEN_KEY)?;
                self.with_repo(&args.dir, move |repo| {
                    repo.fetch(&args.remote, &args.branch, token.as_deref())
                })
                .await
            }
            Channel::GitPush => {
                let args: args::Remote = decode(args)?;
                let token = self.vault.get(GIT_TOKEN_KEY)?;
                self.with_repo(&args.dir, move |repo| {
                    repo.push(&args.remote, &args.branch, token.as_deref())
                })
                .await
            }
            Channel::GitPull => {
                let args: args::Remote = decode(args)?;
                let token = self.vault.get(GIT_TOKEN_KEY)?;
                let author = args.author.clone().unwrap_or_else(Signature::fallback);
                self.with_repo(&args.dir, move |repo| {
                    repo.pull(&args.remote, &args.branch, &author, token.as_deref())
                })
                .await
            }
            Channel::SecureSetToken => {
                let args: args::Token = decode(args)?;
                let token = args.token.ok_or(HostError::MissingToken)?;
                self.vault.set(&args.key, &token)?;
                reply(())
            }
            Channel::SecureGetToken => {
                let args: args::Token = decode(args)?;
                reply(self.vault.get(&args.key)?)
            }
            Channel::SecureRemoveToken => {
                let args: args::Token = decode(args)?;
                self.vault.remove(&args.key)?;
                reply(())
            }
        }
    }

    /// Map request path onto the native disk.
    ///
    /// # Errors
    ///
    /// - Return [`HostError::OutsideRoot`] if path escapes workspace root.
    fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let path = Path::new(raw);
        let path = match path.is_absolute() {
            true => path.to_path_buf(),
            false => self.root.join(path),
        };

        if path.components().any(|part| matches!(part, Component::ParentDir))
            || !path.starts_with(&self.root)
        {
            warn!("rejecting path {raw:?} outside {}", self.root.display());
            return Err(HostError::OutsideRoot {
                path: raw.to_string(),
            });
        }

        Ok(path)
    }

    async fn write(&self, raw: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(raw)?;
        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| io_error(raw, err))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|err| io_error(raw, err))
    }

    async fn list(&self, raw: &str, files_only: bool) -> Result<Vec<String>> {
        let path = self.resolve(raw)?;
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .map_err(|err| io_error(raw, err))?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|err| io_error(raw, err))? {
            if files_only {
                let kind = entry.file_type().await.map_err(|err| io_error(raw, err))?;
                if !kind.is_file() {
                    continue;
                }
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(names)
    }

    async fn with_repo<T, Fun>(&self, dir: &str, call: Fun) -> Result<Value>
    where
        T: Serialize + Send + 'static,
        Fun: FnOnce(&Git2Repo) -> crate::git::Result<T> + Send + 'static,
    {
        let dir = self.resolve(dir)?;
        blocking(move || call(&Git2Repo::open(&dir)?)).await
    }
}

/// Run blocking libgit2 work off the async workers.
async fn blocking<T, Fun>(call: Fun) -> Result<Value>
where
    T: Serialize + Send + 'static,
    Fun: FnOnce() -> crate::git::Result<T> + Send + 'static,
{
    let value = tokio::task::spawn_blocking(call).await??;
    reply(value)
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T> {
    Ok(serde_json::from_value(args)?)
}

fn reply<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn io_error(path: &str, err: std::io::Error) -> HostError {
    match err.kind() {
        ErrorKind::NotFound => HostError::NotFound {
            path: path.to_string(),
        },
        _ => HostError::Io {
            path: path.to_string(),
            source: err,
        },
    }
}

/// Host error types.
///
/// Only the rendered message crosses the bridge.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{NOT_FOUND_CODE}: no such file or directory, {path:?}")]
    NotFound { path: String },

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("EACCES: {path:?} is outside the workspace root")]
    OutsideRoot { path: String },

    #[error("no token given to store")]
    MissingToken,

    #[error("malformed request: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("host task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::vault::MemoryVault;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn host(root: &Path) -> Host {
        Host::new(root, Arc::new(MemoryVault::new()))
    }

    async fn call(host: &Host, request: Value) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(&host.handle(&request.to_string()).await)?)
    }

    #[tokio::test]
    async fn not_found_replies_carry_code() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = host(root.path());
        let path = root.path().join("missing.md").display().to_string();

        let reply = call(&host, json!({"channel": "fs:readFile", "args": {"path": path}})).await?;
        let message = reply["error"].as_str().unwrap_or_default();
        assert!(message.starts_with(NOT_FOUND_CODE), "{message}");

        Ok(())
    }

    #[tokio::test]
    async fn rejects_paths_outside_root() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = host(&root.path().join("ws"));

        let escape = root.path().join("ws/../secret").display().to_string();
        let reply = call(&host, json!({"channel": "fs:readFile", "args": {"path": escape}})).await?;
        assert!(reply["error"].as_str().unwrap_or_default().starts_with("EACCES"));

        let reply = call(&host, json!({"channel": "fs:readFile", "args": {"path": "/etc/hostname"}})).await?;
        assert!(reply.get("error").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error_reply() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let reply = call(&host(root.path()), json!({"channel": "fs:format", "args": {}})).await?;
        assert_eq!(reply, json!({"error": "unknown bridge channel \"fs:format\""}));

        let raw = host(root.path()).handle("not json").await;
        assert!(raw.starts_with(r#"{"error":"malformed request"#));

        Ok(())
    }

    #[tokio::test]
    async fn resolve_ref_on_unborn_branch_is_null() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = host(root.path());
        let dir = root.path().join("repo").display().to_string();

        let reply = call(&host, json!({"channel": "git:init", "args": {"dir": dir, "defaultBranch": "main"}})).await?;
        assert_eq!(reply, json!({"ok": null}));

        let reply = call(&host, json!({"channel": "git:resolveRef", "args": {"dir": dir, "ref": "HEAD"}})).await?;
        assert_eq!(reply, json!({"ok": null}));

        let reply = call(&host, json!({"channel": "git:currentBranch", "args": {"dir": dir}})).await?;
        assert_eq!(reply, json!({"ok": "main"}));

        Ok(())
    }

    #[tokio::test]
    async fn tokens_round_trip_through_vault() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let host = host(root.path());

        let reply = call(&host, json!({"channel": "secure:setToken", "args": {"key": "git", "token": "t0k"}})).await?;
        assert_eq!(reply, json!({"ok": null}));
        let reply = call(&host, json!({"channel": "secure:getToken", "args": {"key": "git"}})).await?;
        assert_eq!(reply, json!({"ok": "t0k"}));
        call(&host, json!({"channel": "secure:removeToken", "args": {"key": "git"}})).await?;
        let reply = call(&host, json!({"channel": "secure:getToken", "args": {"key": "git"}})).await?;
        assert_eq!(reply, json!({"ok": null}));

        Ok(())
    }
}
