//! Lister tests
//!
//! Page order, backpressure, failure mid-enumeration and cancellation.

use async_trait::async_trait;
use blobcmd_storage::list::{drain, fan_out, spawn_pages, CollectConsumer, PageConsumer, PageSource};
use blobcmd_storage::memory::{MemoryBlobService, ServiceOp};
use blobcmd_storage::{BlobAddress, BlobEntry, ContainerEntry, ListOptions, Lister, Page};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Three pages chained by the markers m1 and m2
#[derive(Debug, Default)]
struct Scripted {
    requested: Arc<Mutex<Vec<Option<String>>>>,
}

#[async_trait]
impl PageSource for Scripted {
    type Entry = ContainerEntry;

    fn subject(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch(&self, marker: Option<String>) -> anyhow::Result<Page<ContainerEntry>> {
        self.requested.lock().await.push(marker.clone());
        let (name, next) = match marker.as_deref() {
            None => ("first", Some("m1")),
            Some("m1") => ("second", Some("m2")),
            Some("m2") => ("third", Some("")),
            Some(other) => anyhow::bail!("unexpected marker {}", other),
        };
        Ok(Page {
            entries: vec![ContainerEntry {
                name: name.to_string(),
                last_modified: None,
            }],
            prefixes: Vec::new(),
            next_marker: next.map(str::to_string),
        })
    }
}

/// Consumer sleeping on every page
#[derive(Debug, Default)]
struct Slow {
    seen: Vec<String>,
}

#[async_trait]
impl PageConsumer<ContainerEntry> for Slow {
    async fn consume(&mut self, page: &Page<ContainerEntry>) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.seen.extend(page.records());
        Ok(())
    }
}

async fn seeded(page_size: usize) -> MemoryBlobService {
    let service = MemoryBlobService::new("acct").with_page_size(page_size);
    for name in ["a.txt", "b.txt", "dir1/x.txt", "dir1/y.txt", "dir2/z.txt", "e.txt"] {
        service.insert_blob("data", name, "content").await;
    }
    service
}

fn address(uri: &str) -> BlobAddress {
    BlobAddress::parse(uri).unwrap()
}

fn names(records: &[String]) -> Vec<&str> {
    records.iter().map(|r| r.split('\t').next().unwrap_or_default()).collect()
}

/// Markers are passed back verbatim and an empty marker ends the listing
#[tokio::test]
async fn test_markers_drive_pagination() {
    let source = Scripted::default();
    let requested = Arc::clone(&source.requested);

    let stream = spawn_pages(source, 1, CancellationToken::new());
    let mut slow = Slow::default();
    assert_eq!(drain(stream, &mut slow).await.unwrap(), 3);

    assert_eq!(slow.seen, vec!["first", "second", "third"]);
    assert_eq!(
        *requested.lock().await,
        vec![None, Some("m1".to_string()), Some("m2".to_string())]
    );
}

/// A slow consumer holds the producer back to the queue size
#[tokio::test]
async fn test_backpressure_bounds_prefetch() {
    let service = seeded(1).await;
    let lister = Lister::new(Arc::new(service.clone()));
    let mut stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/data"),
        &ListOptions::recursive().with_page_buffer_size(2),
        CancellationToken::new(),
    );

    assert!(stream.next_page().await.unwrap().is_ok());
    tokio::time::sleep(Duration::from_millis(50)).await;
    // one page taken, two queued, one held by the blocked producer
    assert!(service.calls(ServiceOp::ListBlobs).await <= 4);

    let mut remaining = 0;
    while let Some(page) = stream.next_page().await {
        page.unwrap();
        remaining += 1;
    }
    assert_eq!(remaining, 5);
    assert_eq!(service.calls(ServiceOp::ListBlobs).await, 6);
}

/// Non-recursive listings report prefixes before entries
#[tokio::test]
async fn test_delimited_listing() {
    let service = seeded(100).await;
    let lister = Lister::new(Arc::new(service));
    let stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/data"),
        &ListOptions::default(),
        CancellationToken::new(),
    );
    let mut collect = CollectConsumer::default();
    drain(stream, &mut collect).await.unwrap();

    let records = collect.records().await;
    assert_eq!(names(&records), vec!["dir1/", "dir2/", "a.txt", "b.txt", "e.txt"]);
}

/// The blob path of the address acts as prefix
#[tokio::test]
async fn test_prefix_from_address() {
    let service = seeded(2).await;
    let lister = Lister::new(Arc::new(service));
    let stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/data/dir1/"),
        &ListOptions::recursive(),
        CancellationToken::new(),
    );
    let mut collect = CollectConsumer::default();
    drain(stream, &mut collect).await.unwrap();
    assert_eq!(names(&collect.records().await), vec!["dir1/x.txt", "dir1/y.txt"]);
}

/// Every call starts from the first page
#[tokio::test]
async fn test_listing_is_restartable() {
    let service = seeded(2).await;
    let lister = Lister::new(Arc::new(service.clone()));
    let target = address("https://acct.blob.core.windows.net/data");

    let mut first = CollectConsumer::default();
    drain(lister.list_blobs(&target, &ListOptions::recursive(), CancellationToken::new()), &mut first)
        .await
        .unwrap();
    let mut second = CollectConsumer::default();
    drain(lister.list_blobs(&target, &ListOptions::recursive(), CancellationToken::new()), &mut second)
        .await
        .unwrap();

    assert_eq!(first.records().await.len(), 6);
    assert_eq!(first.records().await, second.records().await);
    assert!(service.list_requests().await.iter().filter(|r| r.marker.is_none()).count() >= 2);
}

/// A failed page ends the listing; earlier pages stay delivered
#[tokio::test]
async fn test_page_failure_surfaces_as_list_error() {
    let service = seeded(2).await;
    service.fail_on(ServiceOp::ListBlobs, 2).await;
    let lister = Lister::new(Arc::new(service));

    let stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/data"),
        &ListOptions::recursive(),
        CancellationToken::new(),
    );
    let mut collect = CollectConsumer::default();
    let err = drain(stream, &mut collect).await.unwrap_err();

    assert!(err.is_list());
    assert!(err.to_string().contains("https://acct.blob.core.windows.net/data"));
    assert_eq!(collect.records().await.len(), 2);
}

/// Listing a missing container fails with a list error
#[tokio::test]
async fn test_missing_container() {
    let lister = Lister::new(Arc::new(MemoryBlobService::new("acct")));
    let mut stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/nope"),
        &ListOptions::default(),
        CancellationToken::new(),
    );
    let first = stream.next().await.unwrap();
    assert!(first.unwrap_err().is_list());
    assert!(stream.next().await.is_none());
}

/// Cancelling the token ends the stream with a cancellation error
#[tokio::test]
async fn test_cancellation_token() {
    let service = seeded(1).await.with_latency(Duration::from_millis(10));
    let lister = Lister::new(Arc::new(service));
    let cancel = CancellationToken::new();
    let mut stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/data"),
        &ListOptions::recursive().with_page_buffer_size(1),
        cancel.clone(),
    );

    assert!(stream.next_page().await.unwrap().is_ok());
    cancel.cancel();

    let mut outcome = None;
    while let Some(item) = stream.next_page().await {
        if item.is_err() {
            outcome = Some(item);
        }
    }
    assert!(outcome.unwrap().unwrap_err().is_cancelled());
}

/// Container listings filter by prefix unless recursive
#[tokio::test]
async fn test_container_listing() {
    let service = MemoryBlobService::new("acct").with_page_size(1);
    for name in ["logs-a", "logs-b", "media"] {
        service.insert_container(name).await;
    }
    let lister = Lister::new(Arc::new(service));

    let filtered = ListOptions::default().with_prefix("logs");
    let mut collect = CollectConsumer::default();
    drain(lister.list_containers("acct", &filtered, CancellationToken::new()), &mut collect)
        .await
        .unwrap();
    assert_eq!(collect.records().await, vec!["logs-a", "logs-b"]);

    let everything = ListOptions::recursive().with_prefix("logs");
    let mut collect = CollectConsumer::default();
    assert_eq!(
        drain(lister.list_containers("acct", &everything, CancellationToken::new()), &mut collect)
            .await
            .unwrap(),
        3
    );
    assert_eq!(collect.records().await, vec!["logs-a", "logs-b", "media"]);
}

/// Every consumer of a fan-out sees every page in order
#[tokio::test]
async fn test_fan_out() {
    let service = seeded(2).await;
    let lister = Lister::new(Arc::new(service));
    let stream = lister.list_blobs(
        &address("https://acct.blob.core.windows.net/data"),
        &ListOptions::recursive(),
        CancellationToken::new(),
    );

    let first = CollectConsumer::default();
    let second = CollectConsumer::default();
    let consumers: Vec<Box<dyn PageConsumer<BlobEntry>>> = vec![Box::new(first.clone()), Box::new(second.clone())];
    let pages = fan_out(stream, consumers, 1).await.unwrap();

    assert_eq!(pages, 3);
    let expected = vec!["a.txt", "b.txt", "dir1/x.txt", "dir1/y.txt", "dir2/z.txt", "e.txt"];
    assert_eq!(names(&first.records().await), expected);
    assert_eq!(names(&second.records().await), expected);
}
