//! Mover tests
//!
//! Renames of blobs and containers, partial failures, idempotent removal.

use blobcmd_storage::memory::{MemoryBlobService, MemoryConnector, ServiceOp};
use blobcmd_storage::mover::CopyOutcome;
use blobcmd_storage::{BlobAddress, Mover, StorageError};
use std::sync::Arc;

fn address(uri: &str) -> BlobAddress {
    BlobAddress::parse(uri).unwrap()
}

async fn seeded(blobs: usize) -> MemoryBlobService {
    let service = MemoryBlobService::new("acct").with_page_size(2);
    for i in 0..blobs {
        service.insert_blob("src", &format!("blob{}", i), format!("data{}", i)).await;
    }
    service
}

/// Renaming onto the same location makes no copy or delete call
#[tokio::test]
async fn test_rename_onto_itself_is_a_no_op() {
    let service = seeded(1).await;
    let mover = Mover::new(Arc::new(service.clone()));

    let blob = address("https://acct.blob.core.windows.net/src/blob0");
    let report = mover.rename(&blob, &blob).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert!(!report.source_deleted);

    let container = address("https://acct.blob.core.windows.net/src");
    mover.rename(&container, &container).await.unwrap();

    assert_eq!(service.calls(ServiceOp::CopyBlob).await, 0);
    assert_eq!(service.calls(ServiceOp::DeleteBlob).await, 0);
    assert_eq!(service.calls(ServiceOp::DeleteContainer).await, 0);
    assert_eq!(service.blob_names("src").await, vec!["blob0"]);
}

/// A missing source fails with not found
#[tokio::test]
async fn test_rename_missing_source() {
    let service = seeded(0).await;
    let mover = Mover::new(Arc::new(service.clone()));

    let err = mover
        .rename(
            &address("https://acct.blob.core.windows.net/src/nope"),
            &address("https://acct.blob.core.windows.net/src/other"),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("src/nope"));

    let err = mover
        .rename(
            &address("https://acct.blob.core.windows.net/missing"),
            &address("https://acct.blob.core.windows.net/other"),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

/// A container rename pages through every blob before deleting the source
#[tokio::test]
async fn test_container_rename() {
    let service = seeded(5).await;
    let mover = Mover::new(Arc::new(service.clone()));

    let report = mover
        .rename(
            &address("https://acct.blob.core.windows.net/src"),
            &address("https://acct.blob.core.windows.net/dst"),
        )
        .await
        .unwrap();

    assert_eq!(report.copied(), 5);
    assert!(report.source_deleted);
    assert_eq!(service.container_names().await, vec!["dst"]);
    assert_eq!(service.blob_names("dst").await.len(), 5);
    assert_eq!(service.blob_content("dst", "blob3").await.unwrap(), "data3");
    assert_eq!(service.calls(ServiceOp::ListBlobs).await, 3);
}

/// A failed copy keeps the source and names the blob left behind
#[tokio::test]
async fn test_container_rename_partial_failure() {
    let service = seeded(3).await;
    service.fail_on(ServiceOp::CopyBlob, 2).await;
    let mover = Mover::new(Arc::new(service.clone()));

    let err = mover
        .rename(
            &address("https://acct.blob.core.windows.net/src"),
            &address("https://acct.blob.core.windows.net/dst"),
        )
        .await
        .unwrap_err();

    match err {
        StorageError::PartialRename { copied, uncopied, .. } => {
            assert_eq!(copied, 2);
            assert_eq!(uncopied, vec!["blob1"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(service.container_names().await, vec!["dst", "src"]);
    assert_eq!(service.blob_names("src").await.len(), 3);
    assert_eq!(service.calls(ServiceOp::DeleteContainer).await, 0);
}

/// A blob rename copies server-side then deletes the source
#[tokio::test]
async fn test_blob_rename_into_other_container() {
    let service = seeded(1).await;
    service.insert_container("dst").await;
    let mover = Mover::new(Arc::new(service.clone()));

    let report = mover
        .rename(
            &address("https://acct.blob.core.windows.net/src/blob0"),
            &address("wasbs://dst@acct.blob.core.windows.net/moved/blob0"),
        )
        .await
        .unwrap();

    assert_eq!(report.outcomes, vec![("blob0".to_string(), CopyOutcome::Copied)]);
    assert!(service.blob_names("src").await.is_empty());
    assert_eq!(service.blob_content("dst", "moved/blob0").await.unwrap(), "data0");
}

/// Blob to container renames are rejected
#[tokio::test]
async fn test_mixed_rename() {
    let service = seeded(1).await;
    let mover = Mover::new(Arc::new(service.clone()));
    let err = mover
        .rename(
            &address("https://acct.blob.core.windows.net/src/blob0"),
            &address("https://acct.blob.core.windows.net/dst"),
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_rename());
    assert_eq!(service.blob_names("src").await, vec!["blob0"]);
}

/// Renames between accounts copy from the source account
#[tokio::test]
async fn test_rename_between_accounts() {
    let connector = MemoryConnector::new();
    let source = connector.account("one").await;
    let dest = connector.account("two").await;
    source.insert_blob("c", "a.txt", "payload").await;
    dest.insert_container("c").await;

    let mover = Mover::between(Arc::new(source.clone()), Arc::new(dest.clone()));
    mover
        .rename(
            &address("https://one.blob.core.windows.net/c/a.txt"),
            &address("https://two.blob.core.windows.net/c/a.txt"),
        )
        .await
        .unwrap();

    assert!(source.blob_names("c").await.is_empty());
    assert_eq!(dest.blob_content("c", "a.txt").await.unwrap(), "payload");
    assert_eq!(dest.calls(ServiceOp::CopyBlob).await, 1);
    assert_eq!(source.calls(ServiceOp::DeleteBlob).await, 1);
}

/// Copy leaves the source in place
#[tokio::test]
async fn test_copy() {
    let service = seeded(1).await;
    let mover = Mover::new(Arc::new(service.clone()));
    mover
        .copy(
            &address("https://acct.blob.core.windows.net/src/blob0"),
            &address("https://acct.blob.core.windows.net/src/copy"),
        )
        .await
        .unwrap();
    assert_eq!(service.blob_names("src").await, vec!["blob0", "copy"]);

    let err = mover
        .copy(
            &address("https://acct.blob.core.windows.net/src"),
            &address("https://acct.blob.core.windows.net/src/x"),
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_rename());
}

/// Removing something absent succeeds
#[tokio::test]
async fn test_remove_is_idempotent() {
    let service = seeded(1).await;
    let mover = Mover::new(Arc::new(service.clone()));

    let blob = address("https://acct.blob.core.windows.net/src/blob0");
    assert!(mover.remove(&blob).await.unwrap());
    assert!(!mover.remove(&blob).await.unwrap());
    assert!(!mover.remove(&address("https://acct.blob.core.windows.net/src/never")).await.unwrap());
    assert!(!mover.remove(&address("https://acct.blob.core.windows.net/missing/blob")).await.unwrap());

    let container = address("https://acct.blob.core.windows.net/src");
    assert!(mover.remove(&container).await.unwrap());
    assert!(!mover.remove(&container).await.unwrap());
    assert!(service.container_names().await.is_empty());
}

/// Existence of containers and blobs
#[tokio::test]
async fn test_exists() {
    let service = seeded(1).await;
    let mover = Mover::new(Arc::new(service));
    assert!(mover.exists(&address("https://acct.blob.core.windows.net/src")).await.unwrap());
    assert!(mover.exists(&address("https://acct.blob.core.windows.net/src/blob0")).await.unwrap());
    assert!(!mover.exists(&address("https://acct.blob.core.windows.net/src/blob9")).await.unwrap());
    assert!(!mover.exists(&address("https://acct.blob.core.windows.net/other")).await.unwrap());
}
