// blobcmd - Blob Storage from the Command Line
// Copyright (C) 2025 blobcmd Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Values exchanged with a [`BlobService`](crate::BlobService)

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Timestamp layout used in listing records
const RFC1123: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Content type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Kind of blob as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlobType {
    /// Block blob, built from committed blocks
    #[default]
    Block,
    /// Page blob
    Page,
    /// Append blob
    Append,
}

impl BlobType {
    /// Wire name, e.g. `BlockBlob`
    pub fn as_str(self) -> &'static str {
        match self {
            BlobType::Block => "BlockBlob",
            BlobType::Page => "PageBlob",
            BlobType::Append => "AppendBlob",
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BlockBlob" => Ok(BlobType::Block),
            "PageBlob" => Ok(BlobType::Page),
            "AppendBlob" => Ok(BlobType::Append),
            other => Err(anyhow::anyhow!("unknown blob type '{}'", other)),
        }
    }
}

/// Something that renders to one line of listing output
pub trait Record {
    /// The text of the line, without a trailing newline
    fn record(&self) -> String;
}

/// One blob of a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Full blob name inside its container
    pub name: String,
    /// Blob kind
    pub blob_type: BlobType,
    /// Size in bytes
    pub content_length: u64,
    /// MIME type stored with the blob
    pub content_type: String,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

impl Record for BlobEntry {
    fn record(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.name,
            self.blob_type,
            self.content_length,
            self.content_type,
            self.last_modified.format(RFC1123)
        )
    }
}

/// One container of an account listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Container name
    pub name: String,
    /// Last modification time, when the service reports one
    pub last_modified: Option<DateTime<Utc>>,
}

impl Record for ContainerEntry {
    fn record(&self) -> String {
        self.name.clone()
    }
}

/// One page of a marker-paginated enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Entries of this page, in service order
    pub entries: Vec<T>,
    /// Virtual directories, present only for delimited listings
    pub prefixes: Vec<String>,
    /// Cursor for the following page; `None` or empty ends the enumeration
    pub next_marker: Option<String>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            prefixes: Vec::new(),
            next_marker: None,
        }
    }
}

impl<T> Page<T> {
    /// Marker to request next, if the enumeration continues
    pub fn continuation(&self) -> Option<&str> {
        self.next_marker.as_deref().filter(|m| !m.is_empty())
    }

    /// True when no page follows this one
    pub fn is_last(&self) -> bool {
        self.continuation().is_none()
    }

    /// Number of records the page renders to
    pub fn len(&self) -> usize {
        self.prefixes.len() + self.entries.len()
    }

    /// True when the page carries neither prefixes nor entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Record> Page<T> {
    /// Rendered lines: prefixes first, then entries
    pub fn records(&self) -> Vec<String> {
        self.prefixes
            .iter()
            .cloned()
            .chain(self.entries.iter().map(Record::record))
            .collect()
    }
}

/// Page of blobs
pub type BlobPage = Page<BlobEntry>;

/// Page of containers
pub type ContainerPage = Page<ContainerEntry>;

/// Parameters of one container enumeration call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListContainersRequest {
    /// Name prefix filter
    pub prefix: Option<String>,
    /// Cursor from the previous page
    pub marker: Option<String>,
}

/// Parameters of one blob enumeration call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBlobsRequest {
    /// Container to enumerate
    pub container: String,
    /// Name prefix filter
    pub prefix: Option<String>,
    /// Hierarchy delimiter; when set, deeper names collapse into prefixes
    pub delimiter: Option<String>,
    /// Cursor from the previous page
    pub marker: Option<String>,
}

/// Whether a block is part of the blob's content yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockStatus {
    /// Part of the current content
    Committed,
    /// Staged, waiting for a block list commit
    Uncommitted,
}

/// Reference to a block inside a block list commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockDescriptor {
    /// Base64 block id
    pub id: String,
    /// Where the service finds the block
    pub status: BlockStatus,
}

impl BlockDescriptor {
    /// Reference to an already committed block
    pub fn committed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: BlockStatus::Committed,
        }
    }

    /// Reference to a staged block
    pub fn uncommitted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: BlockStatus::Uncommitted,
        }
    }
}

/// Block as reported by a block list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Base64 block id
    pub id: String,
    /// Block size in bytes
    pub size: u64,
}

/// Committed and staged blocks of a blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockListing {
    /// Blocks forming the current content, in order
    pub committed: Vec<BlockInfo>,
    /// Staged blocks not yet committed
    pub uncommitted: Vec<BlockInfo>,
}

/// HTTP properties settable on a blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    /// `Content-Type` served with the blob
    pub content_type: Option<String>,
}

impl BlobProperties {
    /// Properties carrying only a content type
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}
