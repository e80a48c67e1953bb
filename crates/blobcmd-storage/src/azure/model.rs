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

//! XML bodies of the Blob REST protocol

use crate::model::{
    BlobEntry, BlobPage, BlobType, BlockDescriptor, BlockInfo, BlockListing, BlockStatus, ContainerEntry,
    ContainerPage, DEFAULT_CONTENT_TYPE,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerEnumeration {
    #[serde(default)]
    containers: Containers,
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Containers {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerXml {
    name: String,
    #[serde(default)]
    properties: ContainerProperties,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEnumeration {
    #[serde(default)]
    blobs: Blobs,
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Blobs {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobXml>,
    #[serde(rename = "BlobPrefix", default)]
    prefixes: Vec<PrefixXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobXml {
    name: String,
    properties: BlobPropertiesXml,
}

#[derive(Debug, Deserialize)]
struct BlobPropertiesXml {
    #[serde(rename = "Last-Modified")]
    last_modified: String,
    #[serde(rename = "Content-Length")]
    content_length: u64,
    #[serde(rename = "Content-Type", default)]
    content_type: Option<String>,
    #[serde(rename = "BlobType", default)]
    blob_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PrefixXml {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockListXml {
    #[serde(default)]
    committed_blocks: BlockSet,
    #[serde(default)]
    uncommitted_blocks: BlockSet,
}

#[derive(Debug, Default, Deserialize)]
struct BlockSet {
    #[serde(rename = "Block", default)]
    blocks: Vec<BlockXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockXml {
    name: String,
    size: u64,
}

impl From<BlockSet> for Vec<BlockInfo> {
    fn from(set: BlockSet) -> Self {
        set.blocks
            .into_iter()
            .map(|b| BlockInfo { id: b.name, size: b.size })
            .collect()
    }
}

/// `<Error>` body returned with failed requests
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ServiceErrorXml {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Parse an HTTP date such as `Fri, 01 Mar 2024 12:00:00 GMT`
pub(crate) fn parse_http_date(value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|d| d.with_timezone(&Utc))
        .with_context(|| format!("invalid date '{}'", value))
}

pub(crate) fn parse_container_page(body: &str) -> anyhow::Result<ContainerPage> {
    let parsed: ContainerEnumeration = quick_xml::de::from_str(body).context("parse container listing")?;
    let entries = parsed
        .containers
        .items
        .into_iter()
        .map(|c| {
            let last_modified = c
                .properties
                .last_modified
                .as_deref()
                .map(parse_http_date)
                .transpose()?;
            Ok(ContainerEntry {
                name: c.name,
                last_modified,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(ContainerPage {
        entries,
        prefixes: Vec::new(),
        next_marker: parsed.next_marker,
    })
}

pub(crate) fn parse_blob_page(body: &str) -> anyhow::Result<BlobPage> {
    let parsed: BlobEnumeration = quick_xml::de::from_str(body).context("parse blob listing")?;
    let entries = parsed
        .blobs
        .items
        .into_iter()
        .map(|b| {
            let props = b.properties;
            let blob_type = match props.blob_type.as_deref() {
                Some(t) if !t.is_empty() => t.parse()?,
                _ => BlobType::default(),
            };
            Ok(BlobEntry {
                name: b.name,
                blob_type,
                content_length: props.content_length,
                content_type: props
                    .content_type
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                last_modified: parse_http_date(&props.last_modified)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(BlobPage {
        entries,
        prefixes: parsed.blobs.prefixes.into_iter().map(|p| p.name).collect(),
        next_marker: parsed.next_marker,
    })
}

pub(crate) fn parse_block_listing(body: &str) -> anyhow::Result<BlockListing> {
    let parsed: BlockListXml = quick_xml::de::from_str(body).context("parse block list")?;
    Ok(BlockListing {
        committed: parsed.committed_blocks.into(),
        uncommitted: parsed.uncommitted_blocks.into(),
    })
}

pub(crate) fn parse_service_error(body: &str) -> Option<ServiceErrorXml> {
    quick_xml::de::from_str(body).ok()
}

/// Request body of a block list commit
pub(crate) fn block_list_xml(blocks: &[BlockDescriptor]) -> String {
    let mut s = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<BlockList>\n");
    for block in blocks {
        let tag = match block.status {
            BlockStatus::Committed => "Committed",
            BlockStatus::Uncommitted => "Uncommitted",
        };
        s.push_str(&format!("\t<{tag}>{}</{tag}>\n", quick_xml::escape::escape(block.id.as_str())));
    }
    s.push_str("</BlockList>");
    s
}
