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

//! Rename, remove, copy and existence checks
//!
//! The service has no rename, so a rename is a server-side copy followed by a
//! delete of the source. Renaming a container copies every blob first and
//! deletes the source container only when all copies succeeded.

use crate::address::BlobAddress;
use crate::error::{StorageError, StorageResult};
use crate::model::ListBlobsRequest;
use crate::BlobService;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of copying one blob during a container rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Copied
    Copied,
    /// Copy failed with this message
    Failed(String),
}

/// Per-blob record of a container rename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// Every blob of the source with its copy outcome, in listing order
    pub outcomes: Vec<(String, CopyOutcome)>,
    /// Whether the source was deleted
    pub source_deleted: bool,
}

impl RenameReport {
    /// Blobs whose copy failed
    pub fn uncopied(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, CopyOutcome::Failed(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of blobs copied
    pub fn copied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == CopyOutcome::Copied)
            .count()
    }
}

/// Moves and removes blobs between a source and a destination handle
///
/// Both handles may be the same when source and destination share an account.
#[derive(Debug, Clone)]
pub struct Mover {
    source: Arc<dyn BlobService>,
    dest: Arc<dyn BlobService>,
}

impl Mover {
    /// Mover whose source and destination live in one account
    pub fn new(service: Arc<dyn BlobService>) -> Self {
        Self {
            dest: Arc::clone(&service),
            source: service,
        }
    }

    /// Mover between two accounts
    pub fn between(source: Arc<dyn BlobService>, dest: Arc<dyn BlobService>) -> Self {
        Self { source, dest }
    }

    /// Whether the container or blob at `address` exists on the source handle
    pub async fn exists(&self, address: &BlobAddress) -> StorageResult<bool> {
        exists_on(self.source.as_ref(), address).await
    }

    /// Rename a container or a blob
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] when the source does not exist
    /// - [`StorageError::InvalidRename`] when one side is a container and the other a blob
    /// - [`StorageError::PartialRename`] when some blobs of a container could not be copied
    pub async fn rename(&self, from: &BlobAddress, to: &BlobAddress) -> StorageResult<RenameReport> {
        if !self.exists(from).await? {
            return Err(StorageError::not_found(from.to_uri()));
        }

        match (from.is_container(), to.is_container()) {
            (true, true) => self.rename_container(from, to).await,
            (false, false) => self.rename_blob(from, to).await,
            _ => Err(StorageError::invalid_rename(
                from.to_uri(),
                to.to_uri(),
                "both sides must be containers or both must be blobs",
            )),
        }
    }

    async fn rename_blob(&self, from: &BlobAddress, to: &BlobAddress) -> StorageResult<RenameReport> {
        if to.container.is_empty() {
            return Err(StorageError::invalid_rename(from.to_uri(), to.to_uri(), "destination has no container"));
        }
        let source_url = self.source.blob_url(&from.container, &from.blob_path);
        let dest_url = self.dest.blob_url(&to.container, &to.blob_path);
        if source_url == dest_url {
            debug!(uri = %source_url, "Rename onto itself skipped");
            return Ok(RenameReport::default());
        }

        self.dest
            .copy_blob(&to.container, &to.blob_path, &source_url)
            .await
            .map_err(|e| StorageError::service("copy blob", to.to_uri(), e))?;
        self.source
            .delete_blob(&from.container, &from.blob_path)
            .await
            .map_err(|e| StorageError::service("delete blob", from.to_uri(), e))?;

        info!(from = %from, to = %to, "Renamed blob");
        Ok(RenameReport {
            outcomes: vec![(from.blob_path.clone(), CopyOutcome::Copied)],
            source_deleted: true,
        })
    }

    async fn rename_container(&self, from: &BlobAddress, to: &BlobAddress) -> StorageResult<RenameReport> {
        if from.is_account() || to.is_account() {
            return Err(StorageError::invalid_rename(
                from.to_uri(),
                to.to_uri(),
                "an account cannot be renamed",
            ));
        }
        let same_account = self.source.blob_url(&from.container, "") == self.dest.blob_url(&from.container, "");
        if same_account && from.container == to.container {
            debug!(container = %from.container, "Rename onto itself skipped");
            return Ok(RenameReport::default());
        }

        let names = self.blob_names(from).await?;
        self.dest
            .create_container_if_not_exists(&to.container)
            .await
            .map_err(|e| StorageError::service("create container", to.to_uri(), e))?;

        let mut report = RenameReport::default();
        for name in names {
            let source_url = self.source.blob_url(&from.container, &name);
            let outcome = match self.dest.copy_blob(&to.container, &name, &source_url).await {
                Ok(()) => CopyOutcome::Copied,
                Err(e) => {
                    warn!(blob = %name, error = %e, "Copy failed");
                    CopyOutcome::Failed(format!("{:#}", e))
                }
            };
            report.outcomes.push((name, outcome));
        }

        let uncopied = report.uncopied();
        if !uncopied.is_empty() {
            return Err(StorageError::PartialRename {
                from: from.to_uri(),
                to: to.to_uri(),
                copied: report.copied(),
                uncopied,
            });
        }

        self.source
            .delete_container(&from.container)
            .await
            .map_err(|e| StorageError::service("delete container", from.to_uri(), e))?;
        report.source_deleted = true;
        info!(from = %from, to = %to, blobs = report.outcomes.len(), "Renamed container");
        Ok(report)
    }

    /// Every blob name of the source container, across all pages
    async fn blob_names(&self, from: &BlobAddress) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .source
                .list_blobs(&ListBlobsRequest {
                    container: from.container.clone(),
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|e| StorageError::list(from.to_uri(), e))?;
            names.extend(page.entries.iter().map(|e| e.name.clone()));
            match page.continuation() {
                Some(next) => marker = Some(next.to_string()),
                None => return Ok(names),
            }
        }
    }

    /// Server-side copy of the blob at `from` to `to`
    pub async fn copy(&self, from: &BlobAddress, to: &BlobAddress) -> StorageResult<()> {
        if from.is_container() || to.is_container() {
            return Err(StorageError::invalid_rename(
                from.to_uri(),
                to.to_uri(),
                "copy needs a blob on both sides",
            ));
        }
        let source_url = self.source.blob_url(&from.container, &from.blob_path);
        self.dest
            .copy_blob(&to.container, &to.blob_path, &source_url)
            .await
            .map_err(|e| StorageError::service("copy blob", to.to_uri(), e))?;
        info!(from = %from, to = %to, "Copied blob");
        Ok(())
    }

    /// Delete the container or blob at `address` on the source handle
    ///
    /// Returns whether something was deleted; a missing target is not an error.
    pub async fn remove(&self, address: &BlobAddress) -> StorageResult<bool> {
        remove_on(self.source.as_ref(), address).await
    }
}

/// Whether the container or blob at `address` exists
pub async fn exists_on(service: &dyn BlobService, address: &BlobAddress) -> StorageResult<bool> {
    let found = if address.is_container() {
        service
            .container_exists(&address.container)
            .await
            .context("container exists")
    } else {
        service
            .blob_exists(&address.container, &address.blob_path)
            .await
            .context("blob exists")
    };
    found.map_err(|e| StorageError::service("exists", address.to_uri(), e))
}

/// Delete the container or blob at `address` if it exists
pub async fn remove_on(service: &dyn BlobService, address: &BlobAddress) -> StorageResult<bool> {
    if address.is_account() {
        return Err(StorageError::invalid_uri(address.to_uri(), "remove needs a container or blob"));
    }
    let removed = if address.is_container() {
        service.delete_container_if_exists(&address.container).await
    } else {
        service
            .delete_blob_if_exists(&address.container, &address.blob_path)
            .await
    }
    .map_err(|e| StorageError::service("remove", address.to_uri(), e))?;

    if removed {
        info!(uri = %address, "Removed");
    } else {
        debug!(uri = %address, "Nothing to remove");
    }
    Ok(removed)
}
