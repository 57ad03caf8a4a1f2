// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Desktop bridge between the storage layer and the native host.
//!
//! The native filesystem and the native git implementation are never called
//! directly. Instead, every operation is a request sent over an asynchronous
//! message channel to a [`Host`] task, mirroring the renderer/main process
//! split of a desktop shell. Requests and replies cross the boundary as JSON
//! text, so nothing but bytes is ever shared between the two sides.
//!
//! # Wire Format
//!
//! A request names one of a fixed set of [`Channel`]s and carries its
//! arguments as a JSON object:
//!
//! ```text
//! {"channel": "fs:readFile", "args": {"path": "/ws/global/README.md"}}
//! ```
//!
//! Every reply is either `{"ok": <payload>}` or `{"error": "<message>"}`.
//! Binary payloads are plain arrays of byte values. Host side failures are
//! always turned into the error form before crossing back, so a caller never
//! sees anything but a [`BridgeError::Remote`].

pub mod host;
pub mod vault;

pub use host::Host;

use crate::git::{LogQuery, Signature};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Named request/response channels of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "fs:selectDirectory")]
    FsSelectDirectory,
    #[serde(rename = "fs:readFile")]
    FsReadFile,
    #[serde(rename = "fs:readFileBinary")]
    FsReadFileBinary,
    #[serde(rename = "fs:writeFile")]
    FsWriteFile,
    #[serde(rename = "fs:writeFileBinary")]
    FsWriteFileBinary,
    #[serde(rename = "fs:deleteFile")]
    FsDeleteFile,
    #[serde(rename = "fs:listFiles")]
    FsListFiles,
    #[serde(rename = "fs:listEntries")]
    FsListEntries,
    #[serde(rename = "fs:checkExists")]
    FsCheckExists,
    #[serde(rename = "fs:mkdir")]
    FsMkdir,
    #[serde(rename = "fs:stat")]
    FsStat,
    #[serde(rename = "git:status")]
    GitStatus,
    #[serde(rename = "git:statusMatrix")]
    GitStatusMatrix,
    #[serde(rename = "git:add")]
    GitAdd,
    #[serde(rename = "git:remove")]
    GitRemove,
    #[serde(rename = "git:commit")]
    GitCommit,
    #[serde(rename = "git:log")]
    GitLog,
    #[serde(rename = "git:listFiles")]
    GitListFiles,
    #[serde(rename = "git:readBlob")]
    GitReadBlob,
    #[serde(rename = "git:resolveRef")]
    GitResolveRef,
    #[serde(rename = "git:isDescendent")]
    GitIsDescendent,
    #[serde(rename = "git:currentBranch")]
    GitCurrentBranch,
    #[serde(rename = "git:init")]
    GitInit,
    #[serde(rename = "git:annotatedTag")]
    GitAnnotatedTag,
    #[serde(rename = "git:listTags")]
    GitListTags,
    #[serde(rename = "git:readTag")]
    GitReadTag,
    #[serde(rename = "git:addRemote")]
    GitAddRemote,
    #[serde(rename = "git:removeRemote")]
    GitRemoveRemote,
    #[serde(rename = "git:listRemotes")]
    GitListRemotes,
    #[serde(rename = "git:fetch")]
    GitFetch,
    #[serde(rename = "git:push")]
    GitPush,
    #[serde(rename = "git:pull")]
    GitPull,
    #[serde(rename = "secure:setToken")]
    SecureSetToken,
    #[serde(rename = "secure:getToken")]
    SecureGetToken,
    #[serde(rename = "secure:removeToken")]
    SecureRemoveToken,
}

impl Channel {
    /// Wire name of channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FsSelectDirectory => "fs:selectDirectory",
            Self::FsReadFile => "fs:readFile",
            Self::FsReadFileBinary => "fs:readFileBinary",
            Self::FsWriteFile => "fs:writeFile",
            Self::FsWriteFileBinary => "fs:writeFileBinary",
            Self::FsDeleteFile => "fs:deleteFile",
            Self::FsListFiles => "fs:listFiles",
            Self::FsListEntries => "fs:listEntries",
            Self::FsCheckExists => "fs:checkExists",
            Self::FsMkdir => "fs:mkdir",
            Self::FsStat => "fs:stat",
            Self::GitStatus => "git:status",
            Self::GitStatusMatrix => "git:statusMatrix",
            Self::GitAdd => "git:add",
            Self::GitRemove => "git:remove",
            Self::GitCommit => "git:commit",
            Self::GitLog => "git:log",
            Self::GitListFiles => "git:listFiles",
            Self::GitReadBlob => "git:readBlob",
            Self::GitResolveRef => "git:resolveRef",
            Self::GitIsDescendent => "git:isDescendent",
            Self::GitCurrentBranch => "git:currentBranch",
            Self::GitInit => "git:init",
            Self::GitAnnotatedTag => "git:annotatedTag",
            Self::GitListTags => "git:listTags",
            Self::GitReadTag => "git:readTag",
            Self::GitAddRemote => "git:addRemote",
            Self::GitRemoveRemote => "git:removeRemote",
            Self::GitListRemotes => "git:listRemotes",
            Self::GitFetch => "git:fetch",
            Self::GitPush => "git:push",
            Self::GitPull => "git:pull",
            Self::SecureSetToken => "secure:setToken",
            Self::SecureGetToken => "secure:getToken",
            Self::SecureRemoveToken => "secure:removeToken",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = BridgeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(name.to_string()))
            .map_err(|_| BridgeError::UnknownChannel(name.to_string()))
    }
}

/// Request sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub channel: Channel,
    #[serde(default)]
    pub args: Value,
}

/// Reply sent back by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok(Value),
    Error(String),
}

/// Argument layouts of the bridge channels.
pub mod args {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Path {
        pub path: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct WriteText {
        pub path: String,
        pub contents: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct WriteBinary {
        pub path: String,
        pub data: Vec<u8>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Mkdir {
        pub path: String,
        #[serde(default)]
        pub recursive: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Dir {
        pub dir: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Init {
        pub dir: String,
        pub default_branch: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FilePath {
        pub dir: String,
        pub filepath: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Commit {
        pub dir: String,
        pub message: String,
        pub author: Signature,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Log {
        pub dir: String,
        #[serde(flatten)]
        pub query: LogQuery,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusMatrix {
        pub dir: String,
        #[serde(default)]
        pub filepaths: Vec<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ListFiles {
        pub dir: String,
        #[serde(default, rename = "ref")]
        pub reference: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ReadBlob {
        pub dir: String,
        pub oid: String,
        #[serde(default)]
        pub filepath: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ResolveRef {
        pub dir: String,
        #[serde(rename = "ref")]
        pub reference: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct IsDescendent {
        pub dir: String,
        pub oid: String,
        pub ancestor: String,
        #[serde(default)]
        pub depth: Option<usize>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AnnotatedTag {
        pub dir: String,
        #[serde(rename = "ref")]
        pub name: String,
        pub message: String,
        #[serde(default)]
        pub object: Option<String>,
        pub tagger: Signature,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ReadTag {
        pub dir: String,
        pub oid: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AddRemote {
        pub dir: String,
        pub remote: String,
        pub url: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RemoveRemote {
        pub dir: String,
        pub remote: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Remote {
        pub dir: String,
        pub remote: String,
        pub branch: String,
        #[serde(default)]
        pub author: Option<Signature>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Token {
        pub key: String,
        #[serde(default)]
        pub token: Option<String>,
    }
}

pub(crate) struct Envelope {
    pub(crate) request: String,
    pub(crate) reply: oneshot::Sender<String>,
}

/// Renderer side handle onto the bridge.
///
/// Cloning yields another handle onto the same host.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    tx: mpsc::Sender<Envelope>,
}

impl BridgeClient {
    /// Send raw request and wait for its reply payload.
    ///
    /// # Errors
    ///
    /// - Return [`BridgeError::Closed`] if host is gone.
    /// - Return [`BridgeError::Remote`] if host replied with an error.
    pub async fn invoke(&self, channel: Channel, args: Value) -> Result<Value> {
        let request = serde_json::to_string(&Request { channel, args })?;
        trace!("bridge request {request}");

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::Closed)?;
        let raw = reply_rx.await.map_err(|_| BridgeError::Closed)?;

        match serde_json::from_str::<Reply>(&raw)? {
            Reply::Ok(payload) => Ok(payload),
            Reply::Error(message) => {
                debug!("{channel} failed: {message}");
                Err(BridgeError::Remote(message))
            }
        }
    }

    /// Send typed request and decode typed reply.
    pub async fn call<A, T>(&self, channel: Channel, args: &A) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.invoke(channel, serde_json::to_value(args)?).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

/// Host side end of the bridge.
#[derive(Debug)]
pub struct BridgeReceiver {
    pub(crate) rx: mpsc::Receiver<Envelope>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Envelope")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Open new bridge with room for `capacity` in-flight requests.
pub fn channel(capacity: usize) -> (BridgeClient, BridgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BridgeClient { tx }, BridgeReceiver { rx })
}

/// Spawn `host` on the current runtime and hand back a client for it.
pub fn spawn_host(host: Host) -> BridgeClient {
    let (client, receiver) = channel(64);
    tokio::spawn(host.serve(receiver));
    client
}

/// Bridge error types.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Host task has stopped serving requests.
    #[error("bridge to native host is closed")]
    Closed,

    /// Host replied with an error.
    #[error("{0}")]
    Remote(String),

    /// Request names a channel the host does not know.
    #[error("unknown bridge channel {0:?}")]
    UnknownChannel(String),

    /// Request or reply could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_wire_format() -> anyhow::Result<()> {
        let request = Request {
            channel: Channel::FsWriteFileBinary,
            args: serde_json::to_value(args::WriteBinary {
                path: "/a.bin".into(),
                data: vec![0, 255, 7],
            })?,
        };

        assert_eq!(
            serde_json::to_value(&request)?,
            json!({"channel": "fs:writeFileBinary", "args": {"path": "/a.bin", "data": [0, 255, 7]}})
        );

        Ok(())
    }

    #[test]
    fn reply_wire_format() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Reply::Ok(json!(true)))?, r#"{"ok":true}"#);
        assert_eq!(
            serde_json::to_string(&Reply::Error("boom".into()))?,
            r#"{"error":"boom"}"#
        );

        Ok(())
    }

    #[test]
    fn channel_names_round_trip() -> anyhow::Result<()> {
        for name in ["fs:listEntries", "git:statusMatrix", "secure:getToken"] {
            let channel: Channel = name.parse()?;
            assert_eq!(channel.as_str(), name);
        }
        assert!("fs:nope".parse::<Channel>().is_err());

        Ok(())
    }
}
