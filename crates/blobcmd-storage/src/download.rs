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

//! Streaming blob content into a writer

use crate::address::BlobAddress;
use crate::error::{StorageError, StorageResult};
use crate::BlobService;
use anyhow::anyhow;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Copy the committed content of the blob at `address` into `writer`
///
/// Returns the number of bytes written. The writer is flushed on success.
pub async fn download<W>(service: &dyn BlobService, address: &BlobAddress, writer: &mut W) -> StorageResult<u64>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let subject = address.to_uri();
    if address.is_container() {
        return Err(StorageError::download(subject, anyhow!("a blob path is required")));
    }

    let mut stream = service
        .get_blob(&address.container, &address.blob_path)
        .await
        .map_err(|e| StorageError::download(&subject, e))?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StorageError::download(&subject, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| StorageError::io(&subject, e))?;
        written += chunk.len() as u64;
    }
    writer.flush().await.map_err(|e| StorageError::io(&subject, e))?;

    info!(uri = %subject, bytes = written, "Downloaded");
    Ok(written)
}
