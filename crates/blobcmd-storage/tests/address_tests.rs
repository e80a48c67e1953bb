//! Address parsing tests
//!
//! Covers both URI styles, blob path extraction, query handling and the
//! container name limit.

use blobcmd_storage::{parse_blob_path, parse_uri, AddressRules, BlobAddress, StorageError};

/// Host-style URIs carry the container as the first path segment
#[test]
fn test_host_style_uri() {
    let addr = parse_uri("https://myaccount.blob.core.windows.net/logs/2024/01/app.log").unwrap();
    assert_eq!(addr.account_name, "myaccount");
    assert_eq!(addr.service, "blob");
    assert_eq!(addr.endpoint, "core.windows.net");
    assert_eq!(addr.container, "logs");
    assert_eq!(addr.blob_path, "2024/01/app.log");
    assert!(addr.use_https);
}

/// User-style URIs carry the container before the `@`
#[test]
fn test_user_style_uri() {
    let addr = parse_uri("wasbs://logs@myaccount.blob.core.windows.net/2024/app.log").unwrap();
    assert_eq!(addr.account_name, "myaccount");
    assert_eq!(addr.container, "logs");
    assert_eq!(addr.blob_path, "2024/app.log");
    assert!(addr.use_https);

    let plain = parse_uri("wasb://logs@myaccount.blob.core.windows.net/app.log").unwrap();
    assert!(!plain.use_https);
}

/// Transport security follows the scheme token only
#[test]
fn test_security_ignores_port() {
    let addr = parse_uri("http://acct.blob.core.windows.net:443/c/b").unwrap();
    assert!(!addr.use_https);
    assert_eq!(addr.endpoint, "core.windows.net:443");
}

/// Container without a blob yields an empty blob path
#[test]
fn test_container_only() {
    let addr = parse_uri("https://acct.blob.core.windows.net/logs").unwrap();
    assert_eq!(addr.container, "logs");
    assert_eq!(addr.blob_path, "");
    assert!(addr.is_container());
    assert!(!addr.is_account());

    let addr = parse_uri("https://acct.blob.core.windows.net/logs/").unwrap();
    assert_eq!(addr.blob_path, "");
}

/// An authority alone addresses the account
#[test]
fn test_account_only() {
    let addr = parse_uri("https://acct.blob.core.windows.net").unwrap();
    assert!(addr.is_account());
    assert_eq!(addr.to_uri(), "https://acct.blob.core.windows.net");
}

/// Only the first `?` ends the path
#[test]
fn test_query_with_slashes_is_stripped() {
    let addr = parse_uri("https://acct.blob.core.windows.net/c/x/y?sig=a/b/c&sp=r").unwrap();
    assert_eq!(addr.blob_path, "x/y");
    assert_eq!(
        parse_blob_path("https://acct.blob.core.windows.net/c/x/y?z=1/2").unwrap(),
        "x/y"
    );
    assert_eq!(
        parse_blob_path("wasbs://c@acct.blob.core.windows.net/x/y?z=1").unwrap(),
        "x/y"
    );
}

/// Blob path extraction for short URIs
#[test]
fn test_blob_path_of_short_uris() {
    assert_eq!(parse_blob_path("https://acct.blob.core.windows.net/c").unwrap(), "");
    assert_eq!(parse_blob_path("https://acct.blob.core.windows.net").unwrap(), "");
    assert_eq!(parse_blob_path("wasb://c@acct.blob.core.windows.net").unwrap(), "");
}

/// Reconstructing the canonical form reproduces the input
#[test]
fn test_canonical_round_trip() {
    for uri in [
        "https://acct.blob.core.windows.net/c/a/b/c.txt",
        "http://acct.blob.core.chinacloudapi.cn/data",
        "https://acct.blob.core.windows.net",
    ] {
        assert_eq!(parse_uri(uri).unwrap().to_uri(), uri);
    }

    let addr = parse_uri("https://acct.blob.core.windows.net/c/d?x=1").unwrap();
    assert_eq!(addr.to_uri(), "https://acct.blob.core.windows.net/c/d");
}

/// Unrecognized prefixes and malformed authorities fail cleanly
#[test]
fn test_malformed_uris() {
    for uri in [
        "",
        "ftp://acct.blob.core.windows.net/c",
        "https:/acct.blob.core.windows.net/c",
        "/c/blob",
        "https://",
        "https://acct/c",
        "https://acct.blob/c",
        "https://.blob.core.windows.net/c",
        "wasbs://acct.blob.core.windows.net/c",
        "wasbs://@acct.blob.core.windows.net/c",
        "https://user@acct.blob.core.windows.net/c",
        "https://acct.blob.core.windows.net//blob",
    ] {
        match parse_uri(uri) {
            Err(StorageError::InvalidUri { .. }) => {}
            other => panic!("{:?} parsed as {:?}", uri, other),
        }
        match parse_blob_path(uri) {
            Err(StorageError::InvalidUri { .. }) => {}
            other => panic!("blob path of {:?} extracted as {:?}", uri, other),
        }
    }
    assert!(parse_blob_path("s3://bucket/key").is_err());
    assert!(parse_blob_path("wasbs://no-at-sign/x/y").unwrap_err().is_invalid_uri());
}

/// Endpoints outside the public blob service keep their service token
#[test]
fn test_descriptor_round_trips_service_token() {
    let addr = parse_uri("https://acct.dfs.core.usgovcloudapi.net/c/x").unwrap();
    let descriptor = addr.descriptor("a2V5");
    assert_eq!(descriptor.service_url(), "https://acct.dfs.core.usgovcloudapi.net");
    assert_eq!(addr.to_uri(), "https://acct.dfs.core.usgovcloudapi.net/c/x");
}

/// Errors name the offending URI
#[test]
fn test_error_carries_uri() {
    let err = parse_uri("ftp://somewhere/else").unwrap_err();
    assert!(err.to_string().contains("ftp://somewhere/else"));
}

/// Container names longer than the limit are rejected
#[test]
fn test_container_name_limit() {
    let long = "a".repeat(40);
    let uri = format!("https://acct.blob.core.windows.net/{}/b", long);
    assert!(parse_uri(&uri).is_ok());

    let legacy = AddressRules::with_max_container_name_len(32);
    let err = BlobAddress::parse_with(&uri, &legacy).unwrap_err();
    assert!(err.is_invalid_uri());

    let uri = format!("wasbs://{}@acct.blob.core.windows.net/b", long);
    assert!(BlobAddress::parse_with(&uri, &legacy).is_err());
}

/// Configured account plus a relative path
#[test]
fn test_from_path() {
    let rules = AddressRules::default();
    let addr = BlobAddress::from_path("acct", "core.windows.net", false, "/logs/a/b.txt", &rules).unwrap();
    assert_eq!(addr.container, "logs");
    assert_eq!(addr.blob_path, "a/b.txt");
    assert_eq!(addr.to_uri(), "http://acct.blob.core.windows.net/logs/a/b.txt");

    assert!(BlobAddress::from_path("acct", "core.windows.net", true, "", &rules).is_err());
}

/// Addresses with the same account share a descriptor
#[test]
fn test_descriptor_equality() {
    let a = parse_uri("https://acct.blob.core.windows.net/c1/x").unwrap();
    let b = parse_uri("wasbs://c2@acct.blob.core.windows.net/y").unwrap();
    let c = parse_uri("http://acct.blob.core.windows.net/c1/x").unwrap();
    assert_eq!(a.descriptor("k"), b.descriptor("k"));
    assert_ne!(a.descriptor("k"), c.descriptor("k"));
    assert_ne!(a.descriptor("k"), a.descriptor("other"));
}
