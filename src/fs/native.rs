// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Native filesystem reached over the desktop bridge.

use crate::{
    bridge::{args, BridgeClient, BridgeError, Channel},
    fs::{FileSystem, FsError, Metadata, Result, NOT_FOUND_CODE},
};

use async_trait::async_trait;
use tracing::warn;

/// Host filesystem client.
///
/// Every call is one request/response round trip over the `fs:*` channels.
/// Nothing but JSON text crosses between this handle and the host.
#[derive(Debug, Clone)]
pub struct NativeFs {
    bridge: BridgeClient,
}

impl NativeFs {
    pub fn new(bridge: BridgeClient) -> Self {
        Self { bridge }
    }

    /// Ask host for its workspace directory.
    pub async fn select_directory(&self) -> Result<Option<String>> {
        self.bridge
            .call(Channel::FsSelectDirectory, &serde_json::json!({}))
            .await
            .map_err(|err| into_fs_error("", err))
    }

    async fn call<A, T>(&self, channel: Channel, path: &str, args: &A) -> Result<T>
    where
        A: serde::Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        self.bridge
            .call(channel, args)
            .await
            .map_err(|err| into_fs_error(path, err))
    }
}

fn into_fs_error(path: &str, err: BridgeError) -> FsError {
    match err {
        BridgeError::Remote(message) if message.starts_with(NOT_FOUND_CODE) => FsError::NotFound {
            path: path.to_string(),
        },
        err => FsError::Bridge(err.to_string()),
    }
}

fn path_args(path: &str) -> args::Path {
    args::Path {
        path: path.to_string(),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.call(Channel::FsReadFileBinary, path, &path_args(path)).await
    }

    async fn read_to_string(&self, path: &str) -> Result<String> {
        self.call(Channel::FsReadFile, path, &path_args(path)).await
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let args = args::WriteBinary {
            path: path.to_string(),
            data: contents.to_vec(),
        };
        self.call(Channel::FsWriteFileBinary, path, &args).await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.call(Channel::FsDeleteFile, path, &path_args(path)).await
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        self.call(Channel::FsListFiles, dir, &path_args(dir)).await
    }

    async fn list_entries(&self, dir: &str) -> Result<Vec<String>> {
        self.call(Channel::FsListEntries, dir, &path_args(dir)).await
    }

    async fn exists(&self, path: &str) -> bool {
        match self.call(Channel::FsCheckExists, path, &path_args(path)).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!("cannot check {path:?}: {err}");
                false
            }
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        self.call(Channel::FsStat, path, &path_args(path)).await
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let args = args::Mkdir {
            path: path.to_string(),
            recursive,
        };
        self.call(Channel::FsMkdir, path, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_prefix_maps_to_not_found() {
        let err = into_fs_error(
            "/ws/a.md",
            BridgeError::Remote(format!("{NOT_FOUND_CODE}: no such file or directory")),
        );
        assert!(err.is_not_found());

        let err = into_fs_error("/ws/a.md", BridgeError::Remote("permission denied".into()));
        assert!(matches!(err, FsError::Bridge(_)));

        let err = into_fs_error("/ws/a.md", BridgeError::Closed);
        assert!(!err.is_not_found());
    }
}
