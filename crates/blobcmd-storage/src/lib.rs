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

//! Client-side blob storage core for blobcmd
//!
//! This crate addresses, enumerates, uploads and moves blobs in an Azure-style
//! object store (accounts hold containers, containers hold blobs).
//!
//! # Architecture
//!
//! - [`address`]: parses `http[s]://` and `wasb[s]://` URIs into a [`BlobAddress`]
//! - [`cache`]: [`ClientCache`] hands out one service handle per connection descriptor
//! - [`list`]: marker-paginated listings streamed through a bounded queue
//! - [`upload`]: block staging with a single atomic block list commit
//! - [`mover`]: rename as copy-then-delete, idempotent removal, copy, existence
//! - [`download`] and [`glob`]: reading blob content and pattern matching names
//! - [`context`]: [`BlobContext`] ties a cache and settings to URI-level operations
//!
//! The storage service itself sits behind the [`BlobService`] trait. Two
//! implementations ship with the crate: [`azure::AzureBlobService`] speaks the
//! Azure Blob REST protocol, [`memory::MemoryBlobService`] keeps everything in
//! process and is what the tests run against.
//!
//! # Examples
//!
//! ```no_run
//! use blobcmd_storage::{BlobContext, ContextSettings, memory::MemoryConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = Arc::new(MemoryConnector::new());
//!     let ctx = BlobContext::new(connector, ContextSettings::with_account_key("a2V5"));
//!
//!     let uri = "https://acct.blob.core.windows.net/reports/2024/q1.csv";
//!     ctx.upload_bytes(uri, "id,total\n1,10\n".into()).await?;
//!
//!     for line in ctx.list_records("https://acct.blob.core.windows.net/reports", true).await? {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! [`BlobService`] methods return `anyhow::Result` so implementations can attach
//! their own context. Everything above the trait returns [`StorageResult`],
//! wrapping service failures with the URI they concern.

pub mod address;
pub mod azure;
pub mod cache;
pub mod context;
pub mod download;
pub mod error;
pub mod glob;
pub mod list;
pub mod memory;
pub mod mime;
pub mod model;
pub mod mover;
pub mod upload;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt::Debug;

pub use address::{parse_blob_path, parse_uri, AddressRules, BlobAddress, ConnectionDescriptor};
pub use cache::{ClientCache, ServiceConnector};
pub use context::{BlobContext, ContextSettings};
pub use error::{StorageError, StorageResult};
pub use list::{ListOptions, Lister, PageStream};
pub use model::{
    BlobEntry, BlobPage, BlobProperties, BlobType, BlockDescriptor, BlockInfo, BlockListing,
    BlockStatus, ContainerEntry, ContainerPage, ListBlobsRequest, ListContainersRequest, Page,
    Record,
};
pub use mover::Mover;
pub use upload::{UploadOptions, Uploader};

/// Blob content as a stream of chunks
pub type BlobStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// Operations of a blob service account
///
/// One value talks to one storage account. Implementations must be usable
/// from many tasks at once; the client cache shares a single handle between
/// every caller addressing the same account.
///
/// # Error Handling
///
/// All operations return `anyhow::Result<T>`. Methods with an `_if_exists`
/// or `_if_not_exists` suffix report the missing (or present) case through
/// their boolean result instead of an error; the plain variants fail.
///
/// # Examples
///
/// ```rust,no_run
/// # use blobcmd_storage::{BlobService, ListBlobsRequest, memory::MemoryBlobService};
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let service = MemoryBlobService::new("acct");
/// service.create_container_if_not_exists("logs").await?;
///
/// let page = service
///     .list_blobs(&ListBlobsRequest {
///         container: "logs".into(),
///         ..Default::default()
///     })
///     .await?;
/// assert!(page.entries.is_empty());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait BlobService: Send + Sync + Debug {
    /// Fetch one page of containers
    async fn list_containers(&self, request: &ListContainersRequest) -> anyhow::Result<ContainerPage>;

    /// Fetch one page of blobs
    ///
    /// With a delimiter, names continuing past the delimiter after the prefix
    /// are folded into `prefixes`, each reported once.
    async fn list_blobs(&self, request: &ListBlobsRequest) -> anyhow::Result<BlobPage>;

    /// Stream the committed content of a blob
    ///
    /// # Errors
    ///
    /// Fails when the container or blob does not exist.
    async fn get_blob(&self, container: &str, blob: &str) -> anyhow::Result<BlobStream>;

    /// Whether a committed blob exists
    async fn blob_exists(&self, container: &str, blob: &str) -> anyhow::Result<bool>;

    /// Whether a container exists
    async fn container_exists(&self, container: &str) -> anyhow::Result<bool>;

    /// Create a container; `Ok(false)` when it was already there
    async fn create_container_if_not_exists(&self, container: &str) -> anyhow::Result<bool>;

    /// Delete a container and every blob in it
    ///
    /// # Errors
    ///
    /// Fails when the container does not exist.
    async fn delete_container(&self, container: &str) -> anyhow::Result<()>;

    /// Delete a container; `Ok(false)` when there was nothing to delete
    async fn delete_container_if_exists(&self, container: &str) -> anyhow::Result<bool>;

    /// Delete a blob
    ///
    /// # Errors
    ///
    /// Fails when the blob does not exist.
    async fn delete_blob(&self, container: &str, blob: &str) -> anyhow::Result<()>;

    /// Delete a blob; `Ok(false)` when there was nothing to delete
    async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> anyhow::Result<bool>;

    /// Create (or replace) an empty block blob with the given content type
    async fn create_block_blob(&self, container: &str, blob: &str, content_type: &str) -> anyhow::Result<()>;

    /// Committed and staged blocks of a blob
    ///
    /// # Errors
    ///
    /// Fails when the blob does not exist.
    async fn get_block_list(&self, container: &str, blob: &str) -> anyhow::Result<BlockListing>;

    /// Stage one uncommitted block
    async fn put_block(&self, container: &str, blob: &str, block_id: &str, data: Bytes) -> anyhow::Result<()>;

    /// Replace the blob's content with the given ordered blocks
    ///
    /// Staged blocks not named in the list are discarded.
    async fn put_block_list(&self, container: &str, blob: &str, blocks: &[BlockDescriptor]) -> anyhow::Result<()>;

    /// Server-side copy of the blob at `source_url` into this account
    ///
    /// Returns once the copy has completed.
    async fn copy_blob(&self, container: &str, blob: &str, source_url: &str) -> anyhow::Result<()>;

    /// Update HTTP properties of an existing blob
    async fn set_blob_properties(&self, container: &str, blob: &str, properties: &BlobProperties) -> anyhow::Result<()>;

    /// URL other accounts can copy this blob from
    fn blob_url(&self, container: &str, blob: &str) -> String;
}
