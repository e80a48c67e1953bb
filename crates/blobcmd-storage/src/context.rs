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

//! URI-level operations over a shared client cache
//!
//! A [`BlobContext`] turns URIs into addresses, looks up the account key,
//! resolves a service handle through its [`ClientCache`] and runs the
//! requested operation. Clones share the cache.
//!
//! Targets are either full URIs (`https://`, `wasbs://`, ...) or
//! `container/blob` paths relative to the configured account.

use crate::address::{is_blob_uri, AddressRules, BlobAddress, BLOB_SERVICE, DEFAULT_ENDPOINT};
use crate::azure::AzureConnector;
use crate::cache::{ClientCache, ServiceConnector};
use crate::error::{StorageError, StorageResult};
use crate::list::{drain, CollectConsumer, ListOptions, Lister, PageStream, PrintConsumer, DEFAULT_PAGE_BUFFER_SIZE};
use crate::model::{BlobEntry, ContainerEntry};
use crate::mover::{exists_on, remove_on, Mover, RenameReport};
use crate::upload::{UploadOptions, Uploader};
use crate::{download, glob, BlobService};
use blobcmd_config::Config;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Account and location used when a target is not a full URI
#[derive(Clone, PartialEq, Eq)]
pub struct DefaultLocation {
    /// Account name
    pub account_name: String,
    /// Endpoint suffix
    pub endpoint: String,
    /// Whether requests use TLS
    pub use_https: bool,
    /// Container listed when no target is given
    pub container: Option<String>,
    /// Blob prefix listed when no target is given
    pub prefix: Option<String>,
}

impl Default for DefaultLocation {
    fn default() -> Self {
        Self {
            account_name: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            use_https: true,
            container: None,
            prefix: None,
        }
    }
}

impl fmt::Debug for DefaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultLocation")
            .field("account_name", &self.account_name)
            .field("endpoint", &self.endpoint)
            .field("container", &self.container)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Keys, limits and tuning of a [`BlobContext`]
#[derive(Clone, Default)]
pub struct ContextSettings {
    /// Key used for accounts without an entry in `account_keys`
    pub default_account_key: Option<String>,
    /// Keys by account name
    pub account_keys: HashMap<String, String>,
    /// Address parsing limits
    pub rules: AddressRules,
    /// Where relative targets point
    pub location: DefaultLocation,
    /// Page queue capacity of listings; 0 means the default
    pub page_buffer_size: usize,
    /// Recursion of listings that do not choose it themselves
    pub recursive: bool,
    /// URIs listed at once by [`BlobContext::list_records_many`]; 0 means 1
    pub parallelism: usize,
    /// Upload tuning
    pub upload: UploadOptions,
}

impl fmt::Debug for ContextSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut accounts: Vec<&String> = self.account_keys.keys().collect();
        accounts.sort();
        f.debug_struct("ContextSettings")
            .field("default_account_key", &self.default_account_key.as_ref().map(|_| "<redacted>"))
            .field("keyed_accounts", &accounts)
            .field("rules", &self.rules)
            .field("location", &self.location)
            .field("page_buffer_size", &self.page_buffer_size)
            .field("recursive", &self.recursive)
            .field("parallelism", &self.parallelism)
            .field("upload", &self.upload)
            .finish()
    }
}

impl ContextSettings {
    /// Settings using `key` for every account
    pub fn with_account_key(key: impl Into<String>) -> Self {
        Self {
            default_account_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Add a key for one account
    pub fn with_key_for(mut self, account: impl Into<String>, key: impl Into<String>) -> Self {
        self.account_keys.insert(account.into(), key.into());
        self
    }

    /// Set the default location for relative targets
    pub fn with_location(mut self, location: DefaultLocation) -> Self {
        self.location = location;
        self
    }

    /// Key for `account`, if one is known
    pub fn key_for(&self, account: &str) -> Option<&str> {
        self.account_keys
            .get(account)
            .or(self.default_account_key.as_ref())
            .map(String::as_str)
    }

    fn list_options(&self, recursive: bool) -> ListOptions {
        let buffer = match self.page_buffer_size {
            0 => DEFAULT_PAGE_BUFFER_SIZE,
            n => n,
        };
        ListOptions {
            recursive,
            ..ListOptions::default()
        }
        .with_page_buffer_size(buffer)
    }
}

impl From<&Config> for ContextSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_account_key: config.account.key.clone(),
            account_keys: config.account_keys.clone(),
            rules: AddressRules::with_max_container_name_len(config.limits.max_container_name_len),
            location: DefaultLocation {
                account_name: config.account.name.clone(),
                endpoint: config.account.endpoint.clone(),
                use_https: config.account.use_https,
                container: config.account.container.clone(),
                prefix: config.account.prefix.clone(),
            },
            page_buffer_size: config.listing.page_buffer_size,
            recursive: config.listing.recursive,
            parallelism: config.listing.parallelism,
            upload: UploadOptions {
                block_size: config.upload.block_size,
                max_concurrent_stages: config.upload.max_concurrent_stages,
            },
        }
    }
}

/// Blob operations addressed by URI
#[derive(Debug, Clone)]
pub struct BlobContext {
    cache: Arc<ClientCache>,
    settings: Arc<ContextSettings>,
}

impl BlobContext {
    /// Context building service handles with `connector`
    pub fn new(connector: Arc<dyn ServiceConnector>, settings: ContextSettings) -> Self {
        Self {
            cache: Arc::new(ClientCache::new(connector)),
            settings: Arc::new(settings),
        }
    }

    /// Context talking to Azure (or the configured emulator) with settings
    /// taken from `config`
    pub fn from_config(config: &Config) -> StorageResult<Self> {
        let mut connector = AzureConnector::new()?;
        if let Some(url) = &config.account.emulator_url {
            connector = connector.with_emulator(url.clone());
        }
        Ok(Self::new(Arc::new(connector), ContextSettings::from(config)))
    }

    /// The shared client cache
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Settings in effect
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Address of a full URI or of a `container/blob` path in the default account
    pub fn address(&self, target: &str) -> StorageResult<BlobAddress> {
        if is_blob_uri(target) {
            return BlobAddress::parse_with(target, &self.settings.rules);
        }
        let location = &self.settings.location;
        let address = BlobAddress::from_path(
            &location.account_name,
            &location.endpoint,
            location.use_https,
            target,
            &self.settings.rules,
        )?;
        address.validate()?;
        Ok(address)
    }

    /// Address named by the configured account, container and prefix
    ///
    /// Used when a command is given no target at all.
    pub fn configured_address(&self) -> StorageResult<BlobAddress> {
        let location = &self.settings.location;
        let address = BlobAddress {
            account_name: location.account_name.clone(),
            container: location.container.clone().unwrap_or_default(),
            blob_path: location.prefix.clone().unwrap_or_default(),
            service: BLOB_SERVICE.to_string(),
            endpoint: location.endpoint.clone(),
            use_https: location.use_https,
        };
        address.validate()?;
        if let Some(container) = &location.container {
            self.settings.rules.check_container(&address.to_uri(), container)?;
        }
        Ok(address)
    }

    /// Service handle for the account of `address`
    pub async fn resolve(&self, address: &BlobAddress) -> StorageResult<Arc<dyn BlobService>> {
        let key = self.settings.key_for(&address.account_name).unwrap_or_default();
        self.cache.resolve(&address.descriptor(key)).await
    }

    /// Start listing the blobs under `target`
    pub async fn list(&self, target: &str, recursive: bool, cancel: CancellationToken) -> StorageResult<PageStream<BlobEntry>> {
        let address = self.address(target)?;
        if address.is_account() {
            return Err(StorageError::invalid_uri(target, "a container is required to list blobs"));
        }
        let service = self.resolve(&address).await?;
        Ok(Lister::new(service).list_blobs(&address, &self.settings.list_options(recursive), cancel))
    }

    /// Start listing the containers of the account of `target`
    ///
    /// A non-recursive listing only includes containers starting with the
    /// container part of `target`.
    pub async fn list_containers(
        &self,
        target: &str,
        recursive: bool,
        cancel: CancellationToken,
    ) -> StorageResult<PageStream<ContainerEntry>> {
        let address = self.address(target)?;
        let service = self.resolve(&address).await?;
        let mut options = self.settings.list_options(recursive);
        if !address.container.is_empty() {
            options = options.with_prefix(address.container.clone());
        }
        let account = BlobAddress {
            container: String::new(),
            blob_path: String::new(),
            ..address
        };
        Ok(Lister::new(service).list_containers(account.to_uri(), &options, cancel))
    }

    /// Every listing record of `target`
    ///
    /// An account-level target lists its containers, anything else lists blobs.
    pub async fn list_records(&self, target: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let mut collect = CollectConsumer::default();
        self.list_into(target, recursive, &mut collect).await?;
        Ok(collect.records().await)
    }

    /// Write the listing records of `target` to `writer`, one per line
    ///
    /// Returns the number of lines written.
    pub async fn list_to_writer<W>(&self, target: &str, recursive: bool, writer: W) -> StorageResult<usize>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut printer = PrintConsumer::new(writer);
        self.list_into(target, recursive, &mut printer).await?;
        Ok(printer.lines())
    }

    async fn list_into<C>(&self, target: &str, recursive: bool, consumer: &mut C) -> StorageResult<usize>
    where
        C: crate::list::PageConsumer<BlobEntry> + crate::list::PageConsumer<ContainerEntry>,
    {
        let address = self.address(target)?;
        let pages = if address.is_account() {
            let stream = self.list_containers(target, recursive, CancellationToken::new()).await?;
            drain(stream, consumer).await?
        } else {
            let stream = self.list(target, recursive, CancellationToken::new()).await?;
            drain(stream, consumer).await?
        };
        debug!(uri = target, pages, "Listed");
        Ok(pages)
    }

    /// Listing records of `target`, or of the configured location when no
    /// target is given, recursing as configured
    pub async fn list_default_records(&self, target: Option<&str>) -> StorageResult<Vec<String>> {
        let target = match target {
            Some(target) => target.to_string(),
            None => self.configured_address()?.to_uri(),
        };
        self.list_records(&target, self.settings.recursive).await
    }

    /// List several targets at once
    ///
    /// Each target runs its own listing; they share only the client cache.
    /// Results come back in input order, each with its own outcome.
    pub async fn list_records_many(
        &self,
        targets: &[String],
        recursive: bool,
    ) -> Vec<(String, StorageResult<Vec<String>>)> {
        let parallelism = self.settings.parallelism.max(1);
        futures::stream::iter(targets.iter().cloned())
            .map(|target| {
                let ctx = self.clone();
                async move {
                    let records = ctx.list_records(&target, recursive).await;
                    (target, records)
                }
            })
            .buffered(parallelism)
            .collect()
            .await
    }

    /// Append everything read from `source` to the blob at `target`
    pub async fn upload<R>(&self, target: &str, source: R, cancel: &CancellationToken) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let address = self.address(target)?;
        let service = self.resolve(&address).await?;
        Uploader::with_options(service, self.settings.upload)
            .upload(&address, source, cancel)
            .await
    }

    /// Append an in-memory payload to the blob at `target`
    pub async fn upload_bytes(&self, target: &str, data: Bytes) -> StorageResult<u64> {
        self.upload(target, &data[..], &CancellationToken::new()).await
    }

    /// Copy the content of the blob at `target` into `writer`
    pub async fn download<W>(&self, target: &str, writer: &mut W) -> StorageResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let address = self.address(target)?;
        let service = self.resolve(&address).await?;
        download::download(service.as_ref(), &address, writer).await
    }

    /// Rename a container or blob, possibly across accounts
    pub async fn rename(&self, from: &str, to: &str) -> StorageResult<RenameReport> {
        let (mover, from, to) = self.mover(from, to).await?;
        mover.rename(&from, &to).await
    }

    /// Server-side copy of one blob
    pub async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let (mover, from, to) = self.mover(from, to).await?;
        mover.copy(&from, &to).await
    }

    /// Delete the container or blob at `target`; false when it did not exist
    pub async fn remove(&self, target: &str) -> StorageResult<bool> {
        let address = self.address(target)?;
        let service = self.resolve(&address).await?;
        remove_on(service.as_ref(), &address).await
    }

    /// Whether the container or blob at `target` exists
    pub async fn exists(&self, target: &str) -> StorageResult<bool> {
        let address = self.address(target)?;
        let service = self.resolve(&address).await?;
        exists_on(service.as_ref(), &address).await
    }

    /// `container/blob` names of the account of `target` matching `pattern`
    pub async fn glob(&self, target: &str, pattern: &str) -> StorageResult<Vec<String>> {
        let address = self.address(target)?;
        let service = self.resolve(&address).await?;
        glob::glob(service.as_ref(), pattern).await
    }

    async fn mover(&self, from: &str, to: &str) -> StorageResult<(Mover, BlobAddress, BlobAddress)> {
        let from = self.address(from)?;
        let to = self.address(to)?;
        let source = self.resolve(&from).await?;
        let dest = self.resolve(&to).await?;
        let mover = if Arc::ptr_eq(&source, &dest) {
            Mover::new(source)
        } else {
            Mover::between(source, dest)
        };
        Ok((mover, from, to))
    }
}
