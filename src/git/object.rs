// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Loose object encoding.
//!
//! Objects are stored zlib compressed under `.git/objects/xx/yyyy..`, where
//! `xxyyyy..` is the hex SHA-1 of the uncompressed `{kind} {len}\0{data}`
//! form.

use crate::git::{GitError, Result, Signature};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use sha1::{Digest, Sha1};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Read, Write},
    str::FromStr,
};

pub const MODE_FILE: u32 = 0o100644;
pub const MODE_EXECUTABLE: u32 = 0o100755;
pub const MODE_SYMLINK: u32 = 0o120000;
pub const MODE_TREE: u32 = 0o40000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = GitError;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(GitError::Corrupt(format!("unknown object kind {other:?}"))),
        }
    }
}

fn header(kind: ObjectKind, len: usize) -> Vec<u8> {
    format!("{kind} {len}\0").into_bytes()
}

/// Hex object id of `data` stored as `kind`.
pub fn hash_object(kind: ObjectKind, data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(header(kind, data.len()));
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Path of loose object relative to `.git`.
pub fn loose_path(oid: &str) -> String {
    format!("objects/{}/{}", &oid[..2], &oid[2..])
}

/// Is `text` a full hex object id?
pub fn is_oid(text: &str) -> bool {
    text.len() == 40 && text.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Encode object into its compressed loose form.
///
/// Yields the object id along with the bytes to write.
pub fn encode_loose(kind: ObjectKind, data: &[u8]) -> Result<(String, Vec<u8>)> {
    let oid = hash_object(kind, data);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&header(kind, data.len()))?;
    encoder.write_all(data)?;

    Ok((oid, encoder.finish()?))
}

/// Decode compressed loose object.
pub fn decode_loose(bytes: &[u8]) -> Result<(ObjectKind, Vec<u8>)> {
    let mut raw = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut raw)?;

    let nul = raw
        .iter()
        .position(|byte| *byte == 0)
        .ok_or_else(|| GitError::Corrupt("object header is not terminated".into()))?;
    let head = std::str::from_utf8(&raw[..nul])
        .map_err(|_| GitError::Corrupt("object header is not UTF-8".into()))?;
    let (kind, len) = head
        .split_once(' ')
        .ok_or_else(|| GitError::Corrupt(format!("malformed object header {head:?}")))?;
    let kind: ObjectKind = kind.parse()?;
    let len: usize = len
        .parse()
        .map_err(|_| GitError::Corrupt(format!("malformed object length {len:?}")))?;

    let data = raw.split_off(nul + 1);
    if data.len() != len {
        return Err(GitError::Corrupt(format!(
            "object length mismatch, expected {len} found {}",
            data.len()
        )));
    }

    Ok((kind, data))
}

/// Single entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    pub name: String,
    pub oid: String,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, oid: impl Into<String>) -> Self {
        Self {
            mode: MODE_FILE,
            name: name.into(),
            oid: oid.into(),
        }
    }

    pub fn tree(name: impl Into<String>, oid: impl Into<String>) -> Self {
        Self {
            mode: MODE_TREE,
            name: name.into(),
            oid: oid.into(),
        }
    }

    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }

    // INVARIANT: Git orders subtrees as if their name ended with '/'.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.is_tree() {
            key.push(b'/');
        }
        key
    }
}

/// Encode tree object, sorting entries into git order.
pub fn encode_tree(mut entries: Vec<TreeEntry>) -> Result<Vec<u8>> {
    entries.sort_by_key(TreeEntry::sort_key);

    let mut data = Vec::new();
    for entry in entries {
        data.extend_from_slice(format!("{:o} {}\0", entry.mode, entry.name).as_bytes());
        data.extend_from_slice(
            &hex::decode(&entry.oid)
                .map_err(|_| GitError::Corrupt(format!("invalid object id {:?}", entry.oid)))?,
        );
    }

    Ok(data)
}

/// Parse tree object.
pub fn parse_tree(data: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|byte| *byte == b' ')
            .ok_or_else(|| GitError::Corrupt("tree entry has no mode".into()))?;
        let nul = rest
            .iter()
            .position(|byte| *byte == 0)
            .ok_or_else(|| GitError::Corrupt("tree entry has no name".into()))?;
        if nul < space || rest.len() < nul + 21 {
            return Err(GitError::Corrupt("truncated tree entry".into()));
        }

        let mode = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|mode| u32::from_str_radix(mode, 8).ok())
            .ok_or_else(|| GitError::Corrupt("invalid tree entry mode".into()))?;
        let name = String::from_utf8(rest[space + 1..nul].to_vec())
            .map_err(|_| GitError::Corrupt("tree entry name is not UTF-8".into()))?;
        let oid = hex::encode(&rest[nul + 1..nul + 21]);

        entries.push(TreeEntry { mode, name, oid });
        rest = &rest[nul + 21..];
    }

    Ok(entries)
}

/// Author, committer, or tagger line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub offset: String,
}

impl Identity {
    /// Identity of `signature` at the current time, in UTC.
    pub fn now(signature: &Signature) -> Self {
        Self {
            name: signature.name.clone(),
            email: signature.email.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            offset: "+0000".to_string(),
        }
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.name.clone(), self.email.clone())
    }
}

impl Display for Identity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} <{}> {} {}", self.name, self.email, self.timestamp, self.offset)
    }
}

impl FromStr for Identity {
    type Err = GitError;

    fn from_str(line: &str) -> Result<Self> {
        let malformed = || GitError::Corrupt(format!("malformed identity {line:?}"));
        let (name, rest) = line.split_once(" <").ok_or_else(malformed)?;
        let (email, rest) = rest.split_once("> ").ok_or_else(malformed)?;
        let (timestamp, offset) = rest.trim().split_once(' ').unwrap_or((rest.trim(), "+0000"));

        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
            timestamp: timestamp.parse().map_err(|_| malformed())?,
            offset: offset.to_string(),
        })
    }
}

/// Split `key value` header lines from message body.
fn split_headers(data: &[u8]) -> Result<(Vec<(String, String)>, String)> {
    let text = std::str::from_utf8(data)
        .map_err(|_| GitError::Corrupt("object text is not UTF-8".into()))?;
    let (head, message) = text.split_once("\n\n").unwrap_or((text, ""));

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        // INVARIANT: Continuation lines belong to previous header (e.g. gpgsig).
        if let Some(continued) = line.strip_prefix(' ') {
            if let Some((_, value)) = headers.last_mut() {
                value.push('\n');
                value.push_str(continued);
            }
            continue;
        }

        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        headers.push((key.to_string(), value.to_string()));
    }

    Ok((headers, message.to_string()))
}

fn with_newline(message: &str) -> String {
    if message.ends_with('\n') {
        message.to_string()
    } else {
        format!("{message}\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: String,
    pub parents: Vec<String>,
    pub author: Identity,
    pub committer: Identity,
    pub message: String,
}

impl Commit {
    pub fn encode(&self) -> Vec<u8> {
        let mut text = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            text.push_str(&format!("parent {parent}\n"));
        }
        text.push_str(&format!("author {}\n", self.author));
        text.push_str(&format!("committer {}\n", self.committer));
        text.push('\n');
        text.push_str(&with_newline(&self.message));
        text.into_bytes()
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let (headers, message) = split_headers(data)?;
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for (key, value) in headers {
            match key.as_str() {
                "tree" => tree = Some(value),
                "parent" => parents.push(value),
                "author" => author = Some(value.parse::<Identity>()?),
                "committer" => committer = Some(value.parse::<Identity>()?),
                _ => {}
            }
        }

        let author = author.ok_or_else(|| GitError::Corrupt("commit has no author".into()))?;
        Ok(Self {
            tree: tree.ok_or_else(|| GitError::Corrupt("commit has no tree".into()))?,
            parents,
            committer: committer.unwrap_or_else(|| author.clone()),
            author,
            message: message.strip_suffix('\n').unwrap_or(&message).to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub object: String,
    pub kind: ObjectKind,
    pub name: String,
    pub tagger: Identity,
    pub message: String,
}

impl Tag {
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.object,
            self.kind,
            self.name,
            self.tagger,
            with_newline(&self.message)
        )
        .into_bytes()
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let (headers, message) = split_headers(data)?;
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| GitError::Corrupt(format!("tag has no {name}")))
        };

        Ok(Self {
            object: lookup("object")?,
            kind: lookup("type")?.parse()?,
            name: lookup("tag")?,
            tagger: lookup("tagger")?.parse()?,
            message: message.strip_suffix('\n').unwrap_or(&message).to_string(),
        })
    }
}
