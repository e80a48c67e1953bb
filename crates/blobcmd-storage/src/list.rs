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

//! Paginated listings
//!
//! A listing is one producer task walking the marker protocol of a
//! [`PageSource`] and pushing each page into a bounded channel. The producer
//! waits whenever the channel is full, so a slow consumer holds back fetching
//! instead of losing pages. Pages come out in fetch order; a failed fetch
//! arrives as a final [`StorageError::List`] item after the pages before it.
//!
//! Consumers either pull from the [`PageStream`] directly (it is a
//! `futures::Stream`), or hand it to [`drain`] with one [`PageConsumer`], or to
//! [`fan_out`] with several, each running on its own task.
//!
//! ```no_run
//! use blobcmd_storage::list::{drain, CollectConsumer, ListOptions, Lister};
//! use blobcmd_storage::{memory::MemoryBlobService, parse_uri};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let service = Arc::new(MemoryBlobService::new("acct"));
//! let lister = Lister::new(service);
//! let address = parse_uri("https://acct.blob.core.windows.net/logs/2024/")?;
//!
//! let stream = lister.list_blobs(&address, &ListOptions::default(), CancellationToken::new());
//! let mut collect = CollectConsumer::default();
//! drain(stream, &mut collect).await?;
//! for line in collect.records().await {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

use crate::address::BlobAddress;
use crate::error::{StorageError, StorageResult};
use crate::model::{BlobEntry, ContainerEntry, ListBlobsRequest, ListContainersRequest, Page, Record};
use crate::BlobService;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pages buffered between producer and consumer by default
pub const DEFAULT_PAGE_BUFFER_SIZE: usize = 1024;

/// Hierarchy separator used for non-recursive listings
pub const DELIMITER: &str = "/";

/// How a listing is run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Name prefix; for blob listings the address's blob path is used when unset
    pub prefix: Option<String>,
    /// List every blob below the prefix instead of one directory level
    pub recursive: bool,
    /// Capacity of the page queue
    pub page_buffer_size: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            recursive: false,
            page_buffer_size: DEFAULT_PAGE_BUFFER_SIZE,
        }
    }
}

impl ListOptions {
    /// Options for a recursive listing
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    /// Set the name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the page queue capacity
    pub fn with_page_buffer_size(mut self, size: usize) -> Self {
        self.page_buffer_size = size;
        self
    }
}

/// One marker-paginated enumeration
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    /// Item type of a page
    type Entry: Send + 'static;

    /// What is being listed, for error messages
    fn subject(&self) -> String;

    /// Fetch the page starting at `marker` (`None` for the first)
    async fn fetch(&self, marker: Option<String>) -> anyhow::Result<Page<Self::Entry>>;
}

/// Blobs of one container
#[derive(Debug)]
pub struct BlobPages {
    service: Arc<dyn BlobService>,
    subject: String,
    container: String,
    prefix: Option<String>,
    delimiter: Option<String>,
}

impl BlobPages {
    /// Enumerate `container`, optionally filtered and delimited
    pub fn new(
        service: Arc<dyn BlobService>,
        container: impl Into<String>,
        prefix: Option<String>,
        delimiter: Option<String>,
    ) -> Self {
        let container = container.into();
        Self {
            service,
            subject: container.clone(),
            container,
            prefix,
            delimiter,
        }
    }

    /// Use `subject` in error messages instead of the container name
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

#[async_trait]
impl PageSource for BlobPages {
    type Entry = BlobEntry;

    fn subject(&self) -> String {
        self.subject.clone()
    }

    async fn fetch(&self, marker: Option<String>) -> anyhow::Result<Page<BlobEntry>> {
        self.service
            .list_blobs(&ListBlobsRequest {
                container: self.container.clone(),
                prefix: self.prefix.clone(),
                delimiter: self.delimiter.clone(),
                marker,
            })
            .await
    }
}

/// Containers of one account
#[derive(Debug)]
pub struct ContainerPages {
    service: Arc<dyn BlobService>,
    subject: String,
    prefix: Option<String>,
}

impl ContainerPages {
    /// Enumerate containers whose names start with `prefix`
    pub fn new(service: Arc<dyn BlobService>, subject: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            service,
            subject: subject.into(),
            prefix,
        }
    }
}

#[async_trait]
impl PageSource for ContainerPages {
    type Entry = ContainerEntry;

    fn subject(&self) -> String {
        self.subject.clone()
    }

    async fn fetch(&self, marker: Option<String>) -> anyhow::Result<Page<ContainerEntry>> {
        self.service
            .list_containers(&ListContainersRequest {
                prefix: self.prefix.clone(),
                marker,
            })
            .await
    }
}

/// Receiving end of a running listing
#[derive(Debug)]
pub struct PageStream<T> {
    rx: mpsc::Receiver<StorageResult<Page<T>>>,
    producer: JoinHandle<usize>,
    cancel: CancellationToken,
}

impl<T> PageStream<T> {
    /// Next page, `None` once the listing is over
    pub async fn next_page(&mut self) -> Option<StorageResult<Page<T>>> {
        self.rx.recv().await
    }

    /// Ask the producer to stop; it reports [`StorageError::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token controlling this listing
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop receiving and wait for the producer; returns the pages it delivered
    pub async fn finish(self) -> StorageResult<usize> {
        drop(self.rx);
        self.producer.await.map_err(StorageError::other)
    }
}

impl<T> Stream for PageStream<T> {
    type Item = StorageResult<Page<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Start a producer task for `source`
pub fn spawn_pages<S: PageSource>(source: S, buffer: usize, cancel: CancellationToken) -> PageStream<S::Entry> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let producer = tokio::spawn(produce(source, tx, cancel.clone()));
    PageStream { rx, producer, cancel }
}

async fn produce<S: PageSource>(
    source: S,
    tx: mpsc::Sender<StorageResult<Page<S::Entry>>>,
    cancel: CancellationToken,
) -> usize {
    let subject = source.subject();
    let mut marker: Option<String> = None;
    let mut delivered = 0usize;

    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled(subject.clone())),
            page = source.fetch(marker.clone()) => page.map_err(|e| StorageError::list(subject.clone(), e)),
        };
        let page = match fetched {
            Ok(page) => page,
            Err(err) => {
                warn!(subject = %subject, pages = delivered, error = %err, "Listing stopped");
                let _ = tx.send(Err(err)).await;
                break;
            }
        };

        let next = page.continuation().map(str::to_string);
        debug!(subject = %subject, records = page.len(), more = next.is_some(), "Fetched page");

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tx.send(Err(StorageError::Cancelled(subject.clone()))).await;
                false
            }
            sent = tx.send(Ok(page)) => sent.is_ok(),
        };
        if !sent {
            break;
        }
        delivered += 1;

        match next {
            Some(m) => marker = Some(m),
            None => break,
        }
    }

    debug!(subject = %subject, pages = delivered, "Listing finished");
    delivered
}

/// Lists blobs and containers through one service handle
#[derive(Debug, Clone)]
pub struct Lister {
    service: Arc<dyn BlobService>,
}

impl Lister {
    /// Create a lister over `service`
    pub fn new(service: Arc<dyn BlobService>) -> Self {
        Self { service }
    }

    /// Start listing the blobs under `address`
    ///
    /// Non-recursive listings use `/` as delimiter and report folded prefixes.
    /// Each call starts a fresh enumeration.
    pub fn list_blobs(&self, address: &BlobAddress, options: &ListOptions, cancel: CancellationToken) -> PageStream<BlobEntry> {
        let prefix = options
            .prefix
            .clone()
            .or_else(|| (!address.blob_path.is_empty()).then(|| address.blob_path.clone()));
        let delimiter = (!options.recursive).then(|| DELIMITER.to_string());
        let source = BlobPages::new(Arc::clone(&self.service), address.container.clone(), prefix, delimiter)
            .with_subject(address.to_uri());
        spawn_pages(source, options.page_buffer_size, cancel)
    }

    /// Start listing the containers of the account
    ///
    /// A recursive listing matches every container; otherwise the name must
    /// start with `options.prefix`.
    pub fn list_containers(
        &self,
        subject: impl Into<String>,
        options: &ListOptions,
        cancel: CancellationToken,
    ) -> PageStream<ContainerEntry> {
        let prefix = if options.recursive { None } else { options.prefix.clone() };
        let source = ContainerPages::new(Arc::clone(&self.service), subject, prefix);
        spawn_pages(source, options.page_buffer_size, cancel)
    }
}

/// Receives the pages of a listing
#[async_trait]
pub trait PageConsumer<T: Sync>: Send {
    /// Handle one page
    async fn consume(&mut self, page: &Page<T>) -> anyhow::Result<()>;

    /// Called once after the last page
    async fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes one record per line
#[derive(Debug)]
pub struct PrintConsumer<W> {
    writer: W,
    lines: usize,
}

impl<W: AsyncWrite + Unpin + Send> PrintConsumer<W> {
    /// Print to `writer`
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<T, W> PageConsumer<T> for PrintConsumer<W>
where
    T: Record + Sync,
    W: AsyncWrite + Unpin + Send,
{
    async fn consume(&mut self, page: &Page<T>) -> anyhow::Result<()> {
        for line in page.records() {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.lines += 1;
        }
        Ok(())
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Accumulates records; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct CollectConsumer {
    records: Arc<Mutex<Vec<String>>>,
}

impl CollectConsumer {
    /// Records collected so far
    pub async fn records(&self) -> Vec<String> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl<T: Record + Sync> PageConsumer<T> for CollectConsumer {
    async fn consume(&mut self, page: &Page<T>) -> anyhow::Result<()> {
        self.records.lock().await.extend(page.records());
        Ok(())
    }
}

/// Feed every page of `stream` to `consumer`; returns the number of pages
///
/// # Errors
///
/// The first listing error, or the consumer's error wrapped in
/// [`StorageError::Other`]. Pages before the failure have been consumed.
pub async fn drain<T, C>(mut stream: PageStream<T>, consumer: &mut C) -> StorageResult<usize>
where
    T: Sync,
    C: PageConsumer<T> + ?Sized,
{
    let mut pages = 0;
    while let Some(item) = stream.next_page().await {
        let page = item?;
        if let Err(e) = consumer.consume(&page).await {
            stream.cancel();
            return Err(StorageError::Other(e.context("listing consumer failed")));
        }
        pages += 1;
    }
    consumer
        .finish()
        .await
        .map_err(|e| StorageError::Other(e.context("listing consumer failed")))?;
    stream.finish().await?;
    Ok(pages)
}

/// Feed every page to several consumers running concurrently
///
/// Each consumer gets its own task and a queue of `buffer` pages, and sees
/// every page in order. The slowest consumer paces the listing.
pub async fn fan_out<T>(
    mut stream: PageStream<T>,
    consumers: Vec<Box<dyn PageConsumer<T>>>,
    buffer: usize,
) -> StorageResult<usize>
where
    T: Send + Sync + 'static,
{
    let mut senders = Vec::with_capacity(consumers.len());
    let mut workers = Vec::with_capacity(consumers.len());
    for mut consumer in consumers {
        let (tx, mut rx) = mpsc::channel::<Arc<Page<T>>>(buffer.max(1));
        senders.push(tx);
        workers.push(tokio::spawn(async move {
            while let Some(page) = rx.recv().await {
                consumer.consume(&page).await?;
            }
            consumer.finish().await
        }));
    }

    let mut pages = 0;
    let mut listing_error = None;
    while let Some(item) = stream.next_page().await {
        match item {
            Ok(page) => {
                let page = Arc::new(page);
                for tx in &senders {
                    // A closed queue means that consumer already failed.
                    let _ = tx.send(Arc::clone(&page)).await;
                }
                pages += 1;
            }
            Err(e) => {
                listing_error = Some(e);
                break;
            }
        }
    }
    drop(senders);

    let mut consumer_error = None;
    for worker in workers {
        let outcome = worker.await.map_err(anyhow::Error::from).and_then(|r| r);
        if let Err(e) = outcome {
            consumer_error.get_or_insert(e);
        }
    }

    if let Some(e) = listing_error {
        return Err(e);
    }
    if let Some(e) = consumer_error {
        return Err(StorageError::Other(e.context("listing consumer failed")));
    }
    stream.finish().await?;
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobService;

    #[derive(Debug)]
    struct Numbers {
        pages: usize,
    }

    #[async_trait]
    impl PageSource for Numbers {
        type Entry = ContainerEntry;

        fn subject(&self) -> String {
            "numbers".to_string()
        }

        async fn fetch(&self, marker: Option<String>) -> anyhow::Result<Page<ContainerEntry>> {
            let index: usize = marker.as_deref().unwrap_or("0").parse()?;
            let next = index + 1;
            Ok(Page {
                entries: vec![ContainerEntry {
                    name: index.to_string(),
                    last_modified: None,
                }],
                prefixes: Vec::new(),
                next_marker: (next < self.pages).then(|| next.to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_queue_of_one_still_delivers_everything() {
        let mut stream = spawn_pages(Numbers { pages: 20 }, 1, CancellationToken::new());
        let mut names = Vec::new();
        while let Some(page) = stream.next_page().await {
            names.extend(page.unwrap().records());
        }
        assert_eq!(names, (0..20).map(|i| i.to_string()).collect::<Vec<_>>());
        assert_eq!(stream.finish().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_cancel_ends_with_cancelled_error() {
        let mut stream = spawn_pages(Numbers { pages: usize::MAX }, 1, CancellationToken::new());
        assert!(stream.next_page().await.unwrap().is_ok());
        stream.cancel();

        let mut last = None;
        while let Some(item) = stream.next_page().await {
            last = Some(item);
        }
        assert!(matches!(last, Some(Err(StorageError::Cancelled(_)))));
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_producer() {
        let stream = spawn_pages(Numbers { pages: usize::MAX }, 2, CancellationToken::new());
        let delivered = stream.finish().await.unwrap();
        assert!(delivered <= 2);
    }

    #[tokio::test]
    async fn test_print_consumer_writes_lines() {
        let service = Arc::new(MemoryBlobService::new("acct"));
        service.insert_container("a-logs").await;
        service.insert_container("b-logs").await;
        let lister = Lister::new(service);

        let stream = lister.list_containers("acct", &ListOptions::recursive(), CancellationToken::new());
        let mut printer = PrintConsumer::new(Vec::new());
        assert_eq!(drain(stream, &mut printer).await.unwrap(), 1);
        assert_eq!(printer.lines(), 2);
        assert_eq!(String::from_utf8(printer.into_inner()).unwrap(), "a-logs\nb-logs\n");
    }
}
