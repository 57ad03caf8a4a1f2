// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staging area in the version 2 `DIRC` on-disk format.
//!
//! Only what the embedded backend needs is modelled: stage zero entries with
//! their mode, size, and blob id. Stat fields are written as zero, so git
//! tooling treats every entry as racy and re-hashes the file before trusting
//! it. Extensions are skipped on read and never written.

use crate::git::{object::MODE_FILE, GitError, Result};

use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

const SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const HEADER_LEN: usize = 12;
const CHECKSUM_LEN: usize = 20;

// 10 stat words, 20 byte sha, 2 byte flags.
const ENTRY_FIXED_LEN: usize = 62;
const NAME_MASK: u16 = 0x0fff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub oid: String,
    pub mode: u32,
    pub size: u32,
}

impl IndexEntry {
    pub fn file(oid: impl Into<String>, size: usize) -> Self {
        Self {
            oid: oid.into(),
            mode: MODE_FILE,
            size: u32::try_from(size).unwrap_or(u32::MAX),
        }
    }
}

/// Staged entries keyed by path.
///
/// Paths sort by raw bytes, which is the order git requires on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: IndexEntry) {
        self.entries.insert(path.into(), entry);
    }

    /// Remove `path`, or everything below it when it names a directory.
    pub fn remove(&mut self, path: &str) -> usize {
        let prefix = format!("{path}/");
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key != path && !key.starts_with(&prefix));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexEntry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| GitError::Corrupt("too many index entries".into()))?;

        let mut data = Vec::new();
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&VERSION.to_be_bytes());
        data.extend_from_slice(&count.to_be_bytes());

        for (path, entry) in &self.entries {
            let start = data.len();

            // ctime, mtime (seconds and nanoseconds), dev, ino.
            data.extend_from_slice(&[0u8; 24]);
            data.extend_from_slice(&entry.mode.to_be_bytes());
            // uid, gid.
            data.extend_from_slice(&[0u8; 8]);
            data.extend_from_slice(&entry.size.to_be_bytes());
            data.extend_from_slice(
                &hex::decode(&entry.oid)
                    .map_err(|_| GitError::Corrupt(format!("invalid object id {:?}", entry.oid)))?,
            );

            let name_len = u16::try_from(path.len()).unwrap_or(NAME_MASK).min(NAME_MASK);
            data.extend_from_slice(&name_len.to_be_bytes());
            data.extend_from_slice(path.as_bytes());

            // INVARIANT: Pad with 1 to 8 NUL bytes to next multiple of eight.
            let padded = (ENTRY_FIXED_LEN + path.len() + 8) & !7;
            data.resize(start + padded, 0);
        }

        let checksum = Sha1::digest(&data);
        data.extend_from_slice(&checksum);

        Ok(data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + CHECKSUM_LEN || &data[..4] != SIGNATURE {
            return Err(GitError::Corrupt("index has no DIRC header".into()));
        }

        let (body, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
        if Sha1::digest(body).as_slice() != checksum {
            return Err(GitError::Corrupt("index checksum mismatch".into()));
        }

        let version = read_u32(body, 4)?;
        if version != VERSION {
            return Err(GitError::Corrupt(format!("unsupported index version {version}")));
        }

        let count = read_u32(body, 8)? as usize;
        let mut entries = BTreeMap::new();
        let mut pos = HEADER_LEN;

        for _ in 0..count {
            let mode = read_u32(body, pos + 24)?;
            let size = read_u32(body, pos + 36)?;
            let oid = hex::encode(
                body.get(pos + 40..pos + 60)
                    .ok_or_else(|| GitError::Corrupt("truncated index entry".into()))?,
            );
            let flags = u16::from_be_bytes([
                *body.get(pos + 60).unwrap_or(&0),
                *body.get(pos + 61).unwrap_or(&0),
            ]);

            let name_start = pos + ENTRY_FIXED_LEN;
            let name_len = match flags & NAME_MASK {
                NAME_MASK => body
                    .get(name_start..)
                    .and_then(|rest| rest.iter().position(|byte| *byte == 0))
                    .ok_or_else(|| GitError::Corrupt("unterminated index path".into()))?,
                len => len as usize,
            };
            let path = body
                .get(name_start..name_start + name_len)
                .ok_or_else(|| GitError::Corrupt("truncated index path".into()))?;
            let path = String::from_utf8(path.to_vec())
                .map_err(|_| GitError::Corrupt("index path is not UTF-8".into()))?;

            // INVARIANT: Only stage zero entries matter, merge stages are dropped.
            if (flags >> 12) & 0x3 == 0 {
                entries.insert(path, IndexEntry { oid, mode, size });
            }

            pos += (ENTRY_FIXED_LEN + name_len + 8) & !7;
        }

        Ok(Self { entries })
    }
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    let bytes = data
        .get(at..at + 4)
        .ok_or_else(|| GitError::Corrupt("truncated index".into()))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
