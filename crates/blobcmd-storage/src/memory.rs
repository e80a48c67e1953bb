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

//! In-memory blob service for testing
//!
//! [`MemoryBlobService`] keeps containers, committed blocks and staged blocks in
//! an `Arc<RwLock<..>>`, pages listings with opaque markers, and folds names
//! into prefixes when a delimiter is given. Services created by one
//! [`MemoryConnector`] share a single store, so copies between accounts work.
//!
//! Every call is counted per [`ServiceOp`], and a call can be made to fail with
//! [`MemoryBlobService::fail_on`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use blobcmd_storage::{BlobService, memory::{MemoryBlobService, ServiceOp}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = MemoryBlobService::new("acct").with_page_size(2);
//!     service.insert_blob("logs", "a.log", "first").await;
//!     service.insert_blob("logs", "b.log", "second").await;
//!
//!     assert!(service.blob_exists("logs", "a.log").await?);
//!     assert_eq!(service.calls(ServiceOp::BlobExists).await, 1);
//!
//!     // The next delete fails once
//!     service.fail_on(ServiceOp::DeleteBlob, 1).await;
//!     assert!(service.delete_blob("logs", "a.log").await.is_err());
//!     service.delete_blob("logs", "a.log").await?;
//!     Ok(())
//! }
//! ```

use crate::cache::ServiceConnector;
use crate::model::{
    BlobEntry, BlobPage, BlobProperties, BlobType, BlockDescriptor, BlockInfo, BlockListing,
    BlockStatus, ContainerEntry, ContainerPage, ListBlobsRequest, ListContainersRequest,
    DEFAULT_CONTENT_TYPE,
};
use crate::{BlobService, BlobStream, ConnectionDescriptor};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Page size the service uses when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 5000;

const URL_SCHEME: &str = "memory://";

/// Collaborator calls, for counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceOp {
    /// `list_containers`
    ListContainers,
    /// `list_blobs`
    ListBlobs,
    /// `get_blob`
    GetBlob,
    /// `blob_exists`
    BlobExists,
    /// `container_exists`
    ContainerExists,
    /// `create_container_if_not_exists`
    CreateContainer,
    /// `delete_container` and `delete_container_if_exists`
    DeleteContainer,
    /// `delete_blob` and `delete_blob_if_exists`
    DeleteBlob,
    /// `create_block_blob`
    CreateBlockBlob,
    /// `get_block_list`
    GetBlockList,
    /// `put_block`
    PutBlock,
    /// `put_block_list`
    PutBlockList,
    /// `copy_blob`
    CopyBlob,
    /// `set_blob_properties`
    SetBlobProperties,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    blocks: Vec<(String, Bytes)>,
    content_type: String,
    blob_type: BlobType,
    last_modified: DateTime<Utc>,
}

impl StoredBlob {
    fn empty(content_type: &str) -> Self {
        Self {
            blocks: Vec::new(),
            content_type: content_type.to_string(),
            blob_type: BlobType::Block,
            last_modified: Utc::now(),
        }
    }

    fn len(&self) -> u64 {
        self.blocks.iter().map(|(_, data)| data.len() as u64).sum()
    }

    fn content(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len() as usize);
        for (_, data) in &self.blocks {
            buf.extend_from_slice(data);
        }
        buf.freeze()
    }

    fn entry(&self, name: &str) -> BlobEntry {
        BlobEntry {
            name: name.to_string(),
            blob_type: self.blob_type,
            content_length: self.len(),
            content_type: self.content_type.clone(),
            last_modified: self.last_modified,
        }
    }
}

#[derive(Debug)]
struct MemoryContainer {
    created: DateTime<Utc>,
    blobs: BTreeMap<String, StoredBlob>,
    staged: HashMap<String, HashMap<String, Bytes>>,
}

impl MemoryContainer {
    fn new() -> Self {
        Self {
            created: Utc::now(),
            blobs: BTreeMap::new(),
            staged: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryAccount {
    containers: BTreeMap<String, MemoryContainer>,
}

impl MemoryAccount {
    fn container(&self, name: &str) -> anyhow::Result<&MemoryContainer> {
        self.containers
            .get(name)
            .ok_or_else(|| anyhow!("ContainerNotFound: container '{}' does not exist", name))
    }

    fn container_mut(&mut self, name: &str) -> anyhow::Result<&mut MemoryContainer> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| anyhow!("ContainerNotFound: container '{}' does not exist", name))
    }

    fn blob(&self, container: &str, blob: &str) -> anyhow::Result<&StoredBlob> {
        self.container(container)?
            .blobs
            .get(blob)
            .ok_or_else(|| anyhow!("BlobNotFound: blob '{}/{}' does not exist", container, blob))
    }
}

/// Accounts shared by every service of one connector
type Store = Arc<RwLock<BTreeMap<String, MemoryAccount>>>;

#[derive(Debug, Default)]
struct CallLedger {
    calls: HashMap<ServiceOp, usize>,
    faults: HashMap<ServiceOp, BTreeSet<usize>>,
    list_requests: Vec<ListBlobsRequest>,
}

/// In-memory implementation of [`BlobService`]
///
/// Clones share state, counters and injected faults.
#[derive(Clone)]
pub struct MemoryBlobService {
    account: String,
    store: Store,
    ledger: Arc<Mutex<CallLedger>>,
    page_size: usize,
    latency: Option<Duration>,
}

impl MemoryBlobService {
    /// Create a service for one account with its own empty store
    pub fn new(account: impl Into<String>) -> Self {
        Self::in_store(account.into(), Arc::new(RwLock::new(BTreeMap::new())))
    }

    fn in_store(account: String, store: Store) -> Self {
        Self {
            account,
            store,
            ledger: Arc::new(Mutex::new(CallLedger::default())),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
        }
    }

    /// Return at most `page_size` items per listing call
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sleep this long inside every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Account this service answers for
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Make the `nth` call of `op` from now on fail (1 = the next call)
    pub async fn fail_on(&self, op: ServiceOp, nth: usize) {
        let mut ledger = self.ledger.lock().await;
        let seen = ledger.calls.get(&op).copied().unwrap_or(0);
        ledger.faults.entry(op).or_default().insert(seen + nth.max(1));
    }

    /// Number of calls of `op` so far
    pub async fn calls(&self, op: ServiceOp) -> usize {
        self.ledger.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls of any kind so far
    pub async fn total_calls(&self) -> usize {
        self.ledger.lock().await.calls.values().sum()
    }

    /// Forget call counts, recorded requests and pending faults
    pub async fn reset_calls(&self) {
        *self.ledger.lock().await = CallLedger::default();
    }

    /// Every `list_blobs` request received, in order
    pub async fn list_requests(&self) -> Vec<ListBlobsRequest> {
        self.ledger.lock().await.list_requests.clone()
    }

    /// Store a committed blob, creating its container; not counted as a call
    pub async fn insert_blob(&self, container: &str, blob: &str, data: impl Into<Bytes>) {
        let mut store = self.store.write().await;
        let account = store.entry(self.account.clone()).or_default();
        let container = account
            .containers
            .entry(container.to_string())
            .or_insert_with(MemoryContainer::new);
        let mut stored = StoredBlob::empty(DEFAULT_CONTENT_TYPE);
        stored.blocks.push((STANDARD.encode("seed"), data.into()));
        container.blobs.insert(blob.to_string(), stored);
    }

    /// Create an empty container; not counted as a call
    pub async fn insert_container(&self, container: &str) {
        let mut store = self.store.write().await;
        store
            .entry(self.account.clone())
            .or_default()
            .containers
            .entry(container.to_string())
            .or_insert_with(MemoryContainer::new);
    }

    /// Committed content of a blob
    pub async fn blob_content(&self, container: &str, blob: &str) -> Option<Bytes> {
        let store = self.store.read().await;
        let account = store.get(&self.account)?;
        account.blob(container, blob).ok().map(StoredBlob::content)
    }

    /// Committed block ids of a blob, in order
    pub async fn committed_block_ids(&self, container: &str, blob: &str) -> Option<Vec<String>> {
        let store = self.store.read().await;
        let account = store.get(&self.account)?;
        account
            .blob(container, blob)
            .ok()
            .map(|b| b.blocks.iter().map(|(id, _)| id.clone()).collect())
    }

    /// Content type stored with a blob
    pub async fn content_type(&self, container: &str, blob: &str) -> Option<String> {
        let store = self.store.read().await;
        let account = store.get(&self.account)?;
        account.blob(container, blob).ok().map(|b| b.content_type.clone())
    }

    /// Names of all containers, sorted
    pub async fn container_names(&self) -> Vec<String> {
        let store = self.store.read().await;
        store
            .get(&self.account)
            .map(|a| a.containers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of all committed blobs in a container, sorted
    pub async fn blob_names(&self, container: &str) -> Vec<String> {
        let store = self.store.read().await;
        store
            .get(&self.account)
            .and_then(|a| a.containers.get(container))
            .map(|c| c.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn enter(&self, op: ServiceOp) -> anyhow::Result<()> {
        let fail = {
            let mut ledger = self.ledger.lock().await;
            let count = ledger.calls.entry(op).or_insert(0);
            *count += 1;
            let nth = *count;
            ledger.faults.get_mut(&op).is_some_and(|pending| pending.remove(&nth))
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            debug!(account = %self.account, ?op, "Injected failure");
            bail!("injected failure in {:?}", op);
        }
        Ok(())
    }

    fn page_bounds<'a, T>(&self, items: &'a [(String, T)], marker: Option<&str>) -> (&'a [(String, T)], Option<String>) {
        let start = match marker.filter(|m| !m.is_empty()).and_then(decode_marker) {
            Some(key) => items.partition_point(|(k, _)| *k < key),
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let next = items.get(end).map(|(k, _)| STANDARD.encode(k));
        (&items[start..end], next)
    }

    fn parse_url<'a>(&self, url: &'a str) -> anyhow::Result<(&'a str, &'a str, &'a str)> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| anyhow!("CannotVerifyCopySource: '{}' is not a memory blob URL", url))?;
        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(account), Some(container), Some(blob)) if !blob.is_empty() => Ok((account, container, blob)),
            _ => bail!("CannotVerifyCopySource: '{}' does not name a blob", url),
        }
    }
}

fn decode_marker(marker: &str) -> Option<String> {
    STANDARD
        .decode(marker)
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
}

impl Default for MemoryBlobService {
    fn default() -> Self {
        Self::new("devstoreaccount1")
    }
}

impl fmt::Debug for MemoryBlobService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlobService")
            .field("account", &self.account)
            .field("page_size", &self.page_size)
            .field("latency", &self.latency)
            .finish()
    }
}

#[async_trait]
impl BlobService for MemoryBlobService {
    async fn list_containers(&self, request: &ListContainersRequest) -> anyhow::Result<ContainerPage> {
        self.enter(ServiceOp::ListContainers).await?;
        let store = self.store.read().await;
        let prefix = request.prefix.as_deref().unwrap_or("");
        let items: Vec<(String, ContainerEntry)> = store
            .get(&self.account)
            .map(|a| {
                a.containers
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .map(|(name, c)| {
                        let entry = ContainerEntry {
                            name: name.clone(),
                            last_modified: Some(c.created),
                        };
                        (name.clone(), entry)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let (page, next_marker) = self.page_bounds(&items, request.marker.as_deref());
        Ok(ContainerPage {
            entries: page.iter().map(|(_, e)| e.clone()).collect(),
            prefixes: Vec::new(),
            next_marker,
        })
    }

    async fn list_blobs(&self, request: &ListBlobsRequest) -> anyhow::Result<BlobPage> {
        self.enter(ServiceOp::ListBlobs).await?;
        self.ledger.lock().await.list_requests.push(request.clone());

        let store = self.store.read().await;
        let account = store
            .get(&self.account)
            .ok_or_else(|| anyhow!("ContainerNotFound: container '{}' does not exist", request.container))?;
        let container = account.container(&request.container)?;
        let prefix = request.prefix.as_deref().unwrap_or("");
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        // Prefix items carry no entry; names below one prefix are contiguous once sorted.
        let mut items: Vec<(String, Option<BlobEntry>)> = Vec::new();
        for (name, blob) in container.blobs.iter().filter(|(name, _)| name.starts_with(prefix)) {
            if let Some(delim) = delimiter {
                let rest = &name[prefix.len()..];
                if let Some(pos) = rest.find(delim) {
                    let folded = format!("{}{}", prefix, &rest[..pos + delim.len()]);
                    let repeated = matches!(items.last(), Some((key, None)) if *key == folded);
                    if !repeated {
                        items.push((folded, None));
                    }
                    continue;
                }
            }
            items.push((name.clone(), Some(blob.entry(name))));
        }

        let (page, next_marker) = self.page_bounds(&items, request.marker.as_deref());
        let mut result = BlobPage {
            next_marker,
            ..Default::default()
        };
        for (key, entry) in page {
            match entry {
                Some(entry) => result.entries.push(entry.clone()),
                None => result.prefixes.push(key.clone()),
            }
        }
        Ok(result)
    }

    async fn get_blob(&self, container: &str, blob: &str) -> anyhow::Result<BlobStream> {
        self.enter(ServiceOp::GetBlob).await?;
        let store = self.store.read().await;
        let account = store
            .get(&self.account)
            .ok_or_else(|| anyhow!("ContainerNotFound: container '{}' does not exist", container))?;
        let chunks: Vec<anyhow::Result<Bytes>> = account
            .blob(container, blob)?
            .blocks
            .iter()
            .map(|(_, data)| Ok(data.clone()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> anyhow::Result<bool> {
        self.enter(ServiceOp::BlobExists).await?;
        let store = self.store.read().await;
        Ok(store
            .get(&self.account)
            .and_then(|a| a.containers.get(container))
            .is_some_and(|c| c.blobs.contains_key(blob)))
    }

    async fn container_exists(&self, container: &str) -> anyhow::Result<bool> {
        self.enter(ServiceOp::ContainerExists).await?;
        let store = self.store.read().await;
        Ok(store
            .get(&self.account)
            .is_some_and(|a| a.containers.contains_key(container)))
    }

    async fn create_container_if_not_exists(&self, container: &str) -> anyhow::Result<bool> {
        self.enter(ServiceOp::CreateContainer).await?;
        let mut store = self.store.write().await;
        let account = store.entry(self.account.clone()).or_default();
        if account.containers.contains_key(container) {
            return Ok(false);
        }
        account.containers.insert(container.to_string(), MemoryContainer::new());
        debug!(account = %self.account, container, "Created container");
        Ok(true)
    }

    async fn delete_container(&self, container: &str) -> anyhow::Result<()> {
        if self.delete_container_if_exists(container).await? {
            Ok(())
        } else {
            bail!("ContainerNotFound: container '{}' does not exist", container)
        }
    }

    async fn delete_container_if_exists(&self, container: &str) -> anyhow::Result<bool> {
        self.enter(ServiceOp::DeleteContainer).await?;
        let mut store = self.store.write().await;
        Ok(store
            .get_mut(&self.account)
            .is_some_and(|a| a.containers.remove(container).is_some()))
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> anyhow::Result<()> {
        if self.delete_blob_if_exists(container, blob).await? {
            Ok(())
        } else {
            bail!("BlobNotFound: blob '{}/{}' does not exist", container, blob)
        }
    }

    async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> anyhow::Result<bool> {
        self.enter(ServiceOp::DeleteBlob).await?;
        let mut store = self.store.write().await;
        Ok(store
            .get_mut(&self.account)
            .and_then(|a| a.containers.get_mut(container))
            .is_some_and(|c| c.blobs.remove(blob).is_some()))
    }

    async fn create_block_blob(&self, container: &str, blob: &str, content_type: &str) -> anyhow::Result<()> {
        self.enter(ServiceOp::CreateBlockBlob).await?;
        let mut store = self.store.write().await;
        let target = store.entry(self.account.clone()).or_default().container_mut(container)?;
        target.staged.remove(blob);
        target.blobs.insert(blob.to_string(), StoredBlob::empty(content_type));
        Ok(())
    }

    async fn get_block_list(&self, container: &str, blob: &str) -> anyhow::Result<BlockListing> {
        self.enter(ServiceOp::GetBlockList).await?;
        let store = self.store.read().await;
        let account = store
            .get(&self.account)
            .ok_or_else(|| anyhow!("ContainerNotFound: container '{}' does not exist", container))?;
        let stored = account.blob(container, blob)?;
        let uncommitted = account
            .container(container)?
            .staged
            .get(blob)
            .map(|staged| {
                staged
                    .iter()
                    .map(|(id, data)| BlockInfo {
                        id: id.clone(),
                        size: data.len() as u64,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(BlockListing {
            committed: stored
                .blocks
                .iter()
                .map(|(id, data)| BlockInfo {
                    id: id.clone(),
                    size: data.len() as u64,
                })
                .collect(),
            uncommitted,
        })
    }

    async fn put_block(&self, container: &str, blob: &str, block_id: &str, data: Bytes) -> anyhow::Result<()> {
        self.enter(ServiceOp::PutBlock).await?;
        let mut store = self.store.write().await;
        let target = store.entry(self.account.clone()).or_default().container_mut(container)?;
        target
            .staged
            .entry(blob.to_string())
            .or_default()
            .insert(block_id.to_string(), data);
        Ok(())
    }

    async fn put_block_list(&self, container: &str, blob: &str, blocks: &[BlockDescriptor]) -> anyhow::Result<()> {
        self.enter(ServiceOp::PutBlockList).await?;
        let mut store = self.store.write().await;
        let target = store.entry(self.account.clone()).or_default().container_mut(container)?;
        let existing = target.blobs.get(blob);
        let staged = target.staged.get(blob);

        let mut resolved = Vec::with_capacity(blocks.len());
        for block in blocks {
            let data = match block.status {
                BlockStatus::Committed => existing
                    .and_then(|b| b.blocks.iter().find(|(id, _)| *id == block.id))
                    .map(|(_, data)| data.clone()),
                BlockStatus::Uncommitted => staged.and_then(|s| s.get(&block.id)).cloned(),
            };
            let data = data.ok_or_else(|| {
                anyhow!(
                    "InvalidBlockList: block '{}' ({:?}) not found for '{}/{}'",
                    block.id,
                    block.status,
                    container,
                    blob
                )
            })?;
            resolved.push((block.id.clone(), data));
        }

        let content_type = existing
            .map(|b| b.content_type.clone())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        target.staged.remove(blob);
        target.blobs.insert(
            blob.to_string(),
            StoredBlob {
                blocks: resolved,
                content_type,
                blob_type: BlobType::Block,
                last_modified: Utc::now(),
            },
        );
        debug!(account = %self.account, container, blob, blocks = blocks.len(), "Committed block list");
        Ok(())
    }

    async fn copy_blob(&self, container: &str, blob: &str, source_url: &str) -> anyhow::Result<()> {
        self.enter(ServiceOp::CopyBlob).await?;
        let (src_account, src_container, src_blob) = self.parse_url(source_url)?;
        let mut store = self.store.write().await;
        let mut copied = store
            .get(src_account)
            .ok_or_else(|| anyhow!("CannotVerifyCopySource: account '{}' is unknown", src_account))?
            .blob(src_container, src_blob)?
            .clone();
        copied.last_modified = Utc::now();
        let target = store.entry(self.account.clone()).or_default().container_mut(container)?;
        target.blobs.insert(blob.to_string(), copied);
        Ok(())
    }

    async fn set_blob_properties(&self, container: &str, blob: &str, properties: &BlobProperties) -> anyhow::Result<()> {
        self.enter(ServiceOp::SetBlobProperties).await?;
        let mut store = self.store.write().await;
        let target = store
            .entry(self.account.clone())
            .or_default()
            .container_mut(container)?
            .blobs
            .get_mut(blob)
            .ok_or_else(|| anyhow!("BlobNotFound: blob '{}/{}' does not exist", container, blob))?;
        if let Some(content_type) = &properties.content_type {
            target.content_type = content_type.clone();
        }
        Ok(())
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        format!("{}{}/{}/{}", URL_SCHEME, self.account, container, blob)
    }
}

/// Connector handing out [`MemoryBlobService`]s that share one store
///
/// One service exists per account name, so every handle for an account sees
/// the same counters. Construction attempts are counted, and the next N
/// attempts can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    store: Store,
    services: Mutex<HashMap<String, MemoryBlobService>>,
    constructions: AtomicUsize,
    pending_failures: AtomicUsize,
    connect_delay: Option<Duration>,
    page_size: Option<usize>,
}

impl MemoryConnector {
    /// Create a connector with an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every connect, widening race windows in tests
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Page size of every service created from now on
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Fail the next `count` connect attempts
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of connect attempts so far, failed ones included
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Service for an account, created on first use
    pub async fn account(&self, name: &str) -> MemoryBlobService {
        let mut services = self.services.lock().await;
        services
            .entry(name.to_string())
            .or_insert_with(|| {
                let service = MemoryBlobService::in_store(name.to_string(), Arc::clone(&self.store));
                match self.page_size {
                    Some(size) => service.with_page_size(size),
                    None => service,
                }
            })
            .clone()
    }
}

#[async_trait]
impl ServiceConnector for MemoryConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> anyhow::Result<Arc<dyn BlobService>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let refused = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            bail!("connection refused for account '{}'", descriptor.account_name);
        }
        Ok(Arc::new(self.account(&descriptor.account_name).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_delimiter_folds_prefixes_once() {
        let service = MemoryBlobService::new("acct");
        for name in ["a/1", "a/2", "a0", "b/x/y", "c"] {
            service.insert_blob("ctr", name, "x").await;
        }
        let page = service
            .list_blobs(&ListBlobsRequest {
                container: "ctr".into(),
                delimiter: Some("/".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.prefixes, vec!["a/", "b/"]);
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a0", "c"]);
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_markers_walk_every_item_once() {
        let service = MemoryBlobService::new("acct").with_page_size(2);
        for i in 0..5 {
            service.insert_blob("ctr", &format!("blob-{}", i), "x").await;
        }
        let mut marker = None;
        let mut seen = Vec::new();
        loop {
            let page = service
                .list_blobs(&ListBlobsRequest {
                    container: "ctr".into(),
                    marker: marker.clone(),
                    ..Default::default()
                })
                .await
                .unwrap();
            seen.extend(page.entries.iter().map(|e| e.name.clone()));
            match page.continuation() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        assert_eq!(seen, (0..5).map(|i| format!("blob-{}", i)).collect::<Vec<_>>());
        assert_eq!(service.calls(ServiceOp::ListBlobs).await, 3);
    }

    #[tokio::test]
    async fn test_block_list_commit_discards_unlisted_blocks() {
        let service = MemoryBlobService::new("acct");
        service.insert_container("ctr").await;
        service.put_block("ctr", "b", "AA==", Bytes::from_static(b"one")).await.unwrap();
        service.put_block("ctr", "b", "AQ==", Bytes::from_static(b"two")).await.unwrap();
        service
            .put_block_list("ctr", "b", &[BlockDescriptor::uncommitted("AQ==")])
            .await
            .unwrap();

        assert_eq!(service.blob_content("ctr", "b").await.unwrap(), Bytes::from_static(b"two"));
        let listing = service.get_block_list("ctr", "b").await.unwrap();
        assert_eq!(listing.committed.len(), 1);
        assert!(listing.uncommitted.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_block_is_rejected() {
        let service = MemoryBlobService::new("acct");
        service.insert_container("ctr").await;
        let err = service
            .put_block_list("ctr", "b", &[BlockDescriptor::committed("Zm9v")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidBlockList"));
        assert!(!service.blob_exists("ctr", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_between_accounts_of_one_connector() {
        let connector = MemoryConnector::new();
        let src = connector.account("src").await;
        let dst = connector.account("dst").await;
        src.insert_blob("in", "file.bin", "payload").await;
        dst.insert_container("out").await;

        dst.copy_blob("out", "copy.bin", &src.blob_url("in", "file.bin")).await.unwrap();

        let stream = dst.get_blob("out", "copy.bin").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"payload");
    }

    #[tokio::test]
    async fn test_fault_fires_once() {
        let service = MemoryBlobService::new("acct");
        service.fail_on(ServiceOp::ContainerExists, 2).await;
        assert!(service.container_exists("x").await.is_ok());
        assert!(service.container_exists("x").await.is_err());
        assert!(service.container_exists("x").await.is_ok());
        assert_eq!(service.calls(ServiceOp::ContainerExists).await, 3);
    }

    #[tokio::test]
    async fn test_connector_counts_and_refuses() {
        let connector = MemoryConnector::new();
        let descriptor = ConnectionDescriptor {
            account_name: "acct".into(),
            account_key: "a2V5".into(),
            service: "blob".into(),
            endpoint: "core.windows.net".into(),
            use_https: true,
        };
        connector.fail_next(1);
        assert!(connector.connect(&descriptor).await.is_err());
        assert!(connector.connect(&descriptor).await.is_ok());
        assert_eq!(connector.constructions(), 2);
    }
}
