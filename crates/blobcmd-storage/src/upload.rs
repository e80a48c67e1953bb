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

//! Block-staged uploads
//!
//! Input is cut into chunks of `block_size` bytes. Each chunk is staged as an
//! uncommitted block, then a single block list commit makes the blob's content
//! the previously committed blocks followed by the new ones. Nothing is
//! committed unless every chunk was staged, so a failed or cancelled upload
//! leaves the committed content as it was.
//!
//! Block ids are `base64("{index:011}\n")`. Numbering continues after the
//! blocks already committed, and an index whose id is already committed is
//! skipped.

use crate::address::BlobAddress;
use crate::error::{StorageError, StorageResult};
use crate::mime::detect_content_type;
use crate::model::{BlobProperties, BlockDescriptor, BlockInfo};
use crate::BlobService;
use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Chunk size used when none is configured (4 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Largest block the service accepts (4000 MiB)
pub const MAX_BLOCK_SIZE: usize = 4000 * 1024 * 1024;

/// Most blocks one blob may hold
pub const MAX_BLOCK_COUNT: usize = 50_000;

/// Id of the block at `index`
pub fn block_id(index: usize) -> String {
    STANDARD.encode(format!("{:011}\n", index))
}

/// Upload tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Bytes per staged block
    pub block_size: usize,
    /// Blocks staged at the same time; 1 stages sequentially
    pub max_concurrent_stages: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrent_stages: 1,
        }
    }
}

impl UploadOptions {
    /// Check the block size and concurrency bounds
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(anyhow!(
                "block size {} is outside 1..={}",
                self.block_size,
                MAX_BLOCK_SIZE
            ));
        }
        if self.max_concurrent_stages == 0 {
            return Err(anyhow!("at least one concurrent stage is required"));
        }
        Ok(())
    }
}

/// Hands out block ids that do not collide with committed ones
struct BlockIds {
    next: usize,
    taken: HashSet<String>,
}

impl BlockIds {
    fn after(committed: &[BlockInfo]) -> Self {
        Self {
            next: committed.len(),
            taken: committed.iter().map(|b| b.id.clone()).collect(),
        }
    }

    fn next_id(&mut self) -> String {
        loop {
            let id = block_id(self.next);
            self.next += 1;
            if !self.taken.contains(&id) {
                return id;
            }
        }
    }
}

/// Uploads content into block blobs
#[derive(Debug, Clone)]
pub struct Uploader {
    service: Arc<dyn BlobService>,
    options: UploadOptions,
}

impl Uploader {
    /// Uploader with default options
    pub fn new(service: Arc<dyn BlobService>) -> Self {
        Self::with_options(service, UploadOptions::default())
    }

    /// Uploader with explicit options
    pub fn with_options(service: Arc<dyn BlobService>, options: UploadOptions) -> Self {
        Self { service, options }
    }

    /// Options in effect
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Append everything read from `source` to the blob at `address`
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`StorageError::Upload`] for empty input, bad options, an address
    /// without a blob path, or any failed service call;
    /// [`StorageError::Io`] when reading `source` fails;
    /// [`StorageError::Cancelled`] when `cancel` fires first. In every error
    /// case no block list has been committed.
    pub async fn upload<R>(&self, address: &BlobAddress, mut source: R, cancel: &CancellationToken) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let subject = address.to_uri();
        let fail = |e: anyhow::Error| StorageError::upload(&subject, e);

        self.options.validate().map_err(fail)?;
        if address.container.is_empty() || address.blob_path.is_empty() {
            return Err(fail(anyhow!("a container and blob path are required")));
        }

        let first = self.read_next(&mut source, &subject, cancel).await?;
        if first.is_empty() {
            return Err(fail(anyhow!("nothing to write: input is empty")));
        }

        self.ensure_blob(address).await.map_err(fail)?;

        let (container, blob) = (address.container.as_str(), address.blob_path.as_str());
        let listing = self
            .service
            .get_block_list(container, blob)
            .await
            .context("get block list")
            .map_err(fail)?;
        let mut blocks: Vec<BlockDescriptor> = listing
            .committed
            .iter()
            .map(|b| BlockDescriptor::committed(b.id.clone()))
            .collect();
        let mut ids = BlockIds::after(&listing.committed);
        debug!(uri = %subject, committed = blocks.len(), stale = listing.uncommitted.len(), "Fetched block list");

        let mut stages: JoinSet<anyhow::Result<()>> = JoinSet::new();
        let mut written = 0u64;
        let mut chunk = first;
        while !chunk.is_empty() {
            if blocks.len() >= MAX_BLOCK_COUNT {
                return Err(fail(anyhow!("blob would exceed {} blocks", MAX_BLOCK_COUNT)));
            }
            let id = ids.next_id();
            blocks.push(BlockDescriptor::uncommitted(id.clone()));
            written += chunk.len() as u64;

            if self.options.max_concurrent_stages == 1 {
                stage(Arc::clone(&self.service), container.to_string(), blob.to_string(), id, chunk)
                    .await
                    .map_err(fail)?;
            } else {
                while stages.len() >= self.options.max_concurrent_stages {
                    join_stage(&mut stages).await.map_err(fail)?;
                }
                stages.spawn(stage(
                    Arc::clone(&self.service),
                    container.to_string(),
                    blob.to_string(),
                    id,
                    chunk,
                ));
            }

            chunk = self.read_next(&mut source, &subject, cancel).await?;
        }
        while !stages.is_empty() {
            join_stage(&mut stages).await.map_err(fail)?;
        }

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled(subject.clone()));
        }
        self.service
            .put_block_list(container, blob, &blocks)
            .await
            .context("commit block list")
            .map_err(fail)?;

        info!(uri = %subject, bytes = written, blocks = blocks.len(), "Upload committed");
        Ok(written)
    }

    /// Append an in-memory payload to the blob at `address`
    pub async fn upload_bytes(&self, address: &BlobAddress, data: Bytes) -> StorageResult<u64> {
        self.upload(address, &data[..], &CancellationToken::new()).await
    }

    async fn read_next<R>(&self, source: &mut R, subject: &str, cancel: &CancellationToken) -> StorageResult<Bytes>
    where
        R: AsyncRead + Unpin + Send,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled(subject.to_string())),
            chunk = read_chunk(source, self.options.block_size) => {
                chunk.map_err(|e| StorageError::io(subject, e))
            }
        }
    }

    /// Create the blob with its inferred content type unless it already exists
    async fn ensure_blob(&self, address: &BlobAddress) -> anyhow::Result<()> {
        let (container, blob) = (address.container.as_str(), address.blob_path.as_str());
        if self.service.blob_exists(container, blob).await.context("check blob")? {
            return Ok(());
        }

        let content_type = detect_content_type(blob);
        self.service
            .create_container_if_not_exists(container)
            .await
            .context("create container")?;
        self.service
            .create_block_blob(container, blob, &content_type)
            .await
            .context("create blob")?;
        self.service
            .set_blob_properties(container, blob, &BlobProperties::with_content_type(content_type.clone()))
            .await
            .context("set blob properties")?;
        debug!(container, blob, content_type = %content_type, "Created blob");
        Ok(())
    }
}

async fn stage(service: Arc<dyn BlobService>, container: String, blob: String, id: String, data: Bytes) -> anyhow::Result<()> {
    let len = data.len();
    service
        .put_block(&container, &blob, &id, data)
        .await
        .with_context(|| format!("stage block {}", id))?;
    debug!(container = %container, blob = %blob, block = %id, bytes = len, "Staged block");
    Ok(())
}

async fn join_stage(stages: &mut JoinSet<anyhow::Result<()>>) -> anyhow::Result<()> {
    match stages.join_next().await {
        Some(joined) => joined.context("staging task failed")?,
        None => Ok(()),
    }
}

/// Read up to `size` bytes, short only at end of input
async fn read_chunk<R: AsyncRead + Unpin>(source: &mut R, size: usize) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::with_capacity(size);
    while buf.len() < size {
        let remaining = (size - buf.len()) as u64;
        let n = (&mut *source).take(remaining).read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}
