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

//! Blob addressing
//!
//! Two URI grammars are accepted:
//!
//! - host style: `http[s]://account.service.endpoint/container/blob/path`
//! - user style: `wasb[s]://container@account.service.endpoint/blob/path`
//!
//! Both parse into a [`BlobAddress`]. The query string is dropped at the first
//! `?` before any path splitting, so a query containing `/` cannot shift the
//! container or blob segments.
//!
//! ```
//! use blobcmd_storage::address::{parse_uri, parse_blob_path};
//!
//! let addr = parse_uri("wasbs://logs@acct.blob.core.windows.net/2024/01/app.log").unwrap();
//! assert_eq!(addr.account_name, "acct");
//! assert_eq!(addr.container, "logs");
//! assert_eq!(addr.blob_path, "2024/01/app.log");
//! assert!(addr.use_https);
//!
//! let path = parse_blob_path("https://acct.blob.core.windows.net/logs/x/y?sv=1").unwrap();
//! assert_eq!(path, "x/y");
//! ```

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Endpoint suffix used when none is configured
pub const DEFAULT_ENDPOINT: &str = "core.windows.net";

/// Service token of the blob service in an account authority
pub const BLOB_SERVICE: &str = "blob";

/// Longest container name the service accepts
pub const DEFAULT_MAX_CONTAINER_NAME_LEN: usize = 63;

/// URI scheme of a blob address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `http://account.service.endpoint/container/...`
    Http,
    /// `https://account.service.endpoint/container/...`
    Https,
    /// `wasb://container@account.service.endpoint/...`
    Wasb,
    /// `wasbs://container@account.service.endpoint/...`
    Wasbs,
}

impl Scheme {
    const ALL: [Scheme; 4] = [Scheme::Http, Scheme::Https, Scheme::Wasb, Scheme::Wasbs];

    /// Scheme token without the `://` separator
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Wasb => "wasb",
            Scheme::Wasbs => "wasbs",
        }
    }

    /// A scheme selects secure transport when its token ends with `s`
    pub fn is_secure(self) -> bool {
        self.as_str().ends_with('s')
    }

    /// Whether the container travels in the user part of the authority
    pub fn is_user_style(self) -> bool {
        matches!(self, Scheme::Wasb | Scheme::Wasbs)
    }

    /// Split a URI into its scheme and the remainder after `://`
    fn split(uri: &str) -> Option<(Scheme, &str)> {
        Scheme::ALL.into_iter().find_map(|scheme| {
            uri.strip_prefix(scheme.as_str())
                .and_then(|rest| rest.strip_prefix("://"))
                .map(|rest| (scheme, rest))
        })
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied while parsing addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRules {
    /// Maximum container name length
    pub max_container_name_len: usize,
}

impl Default for AddressRules {
    fn default() -> Self {
        Self {
            max_container_name_len: DEFAULT_MAX_CONTAINER_NAME_LEN,
        }
    }
}

impl AddressRules {
    /// Rules with a custom container name limit
    pub fn with_max_container_name_len(max_container_name_len: usize) -> Self {
        Self {
            max_container_name_len,
        }
    }

    pub(crate) fn check_container(&self, uri: &str, container: &str) -> StorageResult<()> {
        if container.len() > self.max_container_name_len {
            return Err(StorageError::invalid_uri(
                uri,
                format!(
                    "container name '{}' is {} characters long, limit is {}",
                    container,
                    container.len(),
                    self.max_container_name_len
                ),
            ));
        }
        Ok(())
    }
}

/// Canonical location of a container or blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobAddress {
    /// Storage account name
    pub account_name: String,
    /// Container name, empty when the address names the whole account
    pub container: String,
    /// Blob path inside the container, empty for container-level addresses
    pub blob_path: String,
    /// Service token of the authority (`blob`)
    pub service: String,
    /// Endpoint suffix, e.g. `core.windows.net`
    pub endpoint: String,
    /// Whether requests use TLS
    pub use_https: bool,
}

impl BlobAddress {
    /// Parse a URI with the default rules
    pub fn parse(uri: &str) -> StorageResult<Self> {
        Self::parse_with(uri, &AddressRules::default())
    }

    /// Parse a URI, enforcing the given rules
    pub fn parse_with(uri: &str, rules: &AddressRules) -> StorageResult<Self> {
        let (scheme, rest) = Scheme::split(uri).ok_or_else(|| {
            StorageError::invalid_uri(uri, "expected one of http://, https://, wasb://, wasbs://")
        })?;
        let rest = strip_query(rest);
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));

        let (container, host, blob_path) = if scheme.is_user_style() {
            let (container, host) = authority
                .split_once('@')
                .ok_or_else(|| StorageError::invalid_uri(uri, "expected container@account in authority"))?;
            if container.is_empty() {
                return Err(StorageError::invalid_uri(uri, "empty container name"));
            }
            (container, host, path)
        } else {
            if authority.contains('@') {
                return Err(StorageError::invalid_uri(
                    uri,
                    "user info is only accepted with wasb:// and wasbs://",
                ));
            }
            let (container, blob_path) = path.split_once('/').unwrap_or((path, ""));
            if container.is_empty() && !blob_path.is_empty() {
                return Err(StorageError::invalid_uri(uri, "blob path given without a container"));
            }
            (container, authority, blob_path)
        };

        let (account_name, service, endpoint) = split_host(uri, host)?;
        rules.check_container(uri, container)?;

        Ok(Self {
            account_name: account_name.to_string(),
            container: container.to_string(),
            blob_path: blob_path.to_string(),
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            use_https: scheme.is_secure(),
        })
    }

    /// Build an address from configured account settings and a `container/blob` path
    pub fn from_path(
        account_name: &str,
        endpoint: &str,
        use_https: bool,
        path: &str,
        rules: &AddressRules,
    ) -> StorageResult<Self> {
        let (container, blob_path) = split_container_path(path, rules)?;
        Ok(Self {
            account_name: account_name.to_string(),
            container,
            blob_path,
            service: BLOB_SERVICE.to_string(),
            endpoint: endpoint.to_string(),
            use_https,
        })
    }

    /// `account.service.endpoint`
    pub fn authority(&self) -> String {
        format!("{}.{}.{}", self.account_name, self.service, self.endpoint)
    }

    /// True when the address names a container (or the account) rather than a blob
    pub fn is_container(&self) -> bool {
        self.blob_path.is_empty()
    }

    /// True when the address names neither a container nor a blob
    pub fn is_account(&self) -> bool {
        self.container.is_empty()
    }

    /// Canonical host-style URI for this address
    pub fn to_uri(&self) -> String {
        let scheme = if self.use_https { Scheme::Https } else { Scheme::Http };
        let mut uri = format!("{}://{}", scheme, self.authority());
        if !self.container.is_empty() {
            uri.push('/');
            uri.push_str(&self.container);
        }
        if !self.blob_path.is_empty() {
            uri.push('/');
            uri.push_str(&self.blob_path);
        }
        uri
    }

    /// Same account and container, different blob
    pub fn with_blob_path(&self, blob_path: impl Into<String>) -> Self {
        Self {
            blob_path: blob_path.into(),
            ..self.clone()
        }
    }

    /// Connection descriptor for this address using the given account key
    pub fn descriptor(&self, account_key: impl Into<String>) -> ConnectionDescriptor {
        ConnectionDescriptor {
            account_name: self.account_name.clone(),
            account_key: account_key.into(),
            service: self.service.clone(),
            endpoint: self.endpoint.clone(),
            use_https: self.use_https,
        }
    }

    /// Fail listing every empty account-level field
    pub fn validate(&self) -> StorageResult<()> {
        let mut missing = Vec::new();
        if self.account_name.is_empty() {
            missing.push("account name".to_string());
        }
        if self.endpoint.is_empty() {
            missing.push("endpoint".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Incomplete(missing))
        }
    }

    /// Like [`validate`](Self::validate), additionally requiring a container
    pub fn validate_with_container(&self) -> StorageResult<()> {
        let mut missing = match self.validate() {
            Ok(()) => Vec::new(),
            Err(StorageError::Incomplete(fields)) => fields,
            Err(other) => return Err(other),
        };
        if self.container.is_empty() {
            missing.push("container".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Incomplete(missing))
        }
    }
}

impl fmt::Display for BlobAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Identity of a service connection, used as the client cache key
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor {
    /// Storage account name
    pub account_name: String,
    /// Base64 shared key of the account
    pub account_key: String,
    /// Service token of the authority, `blob` for the public cloud
    pub service: String,
    /// Endpoint suffix
    pub endpoint: String,
    /// Whether requests use TLS
    pub use_https: bool,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("use_https", &self.use_https)
            .finish()
    }
}

impl ConnectionDescriptor {
    /// Service root, e.g. `https://acct.blob.core.windows.net`
    pub fn service_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}.{}.{}", scheme, self.account_name, self.service, self.endpoint)
    }

    /// Names of empty fields, in declaration order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.account_name.is_empty() {
            missing.push("account name");
        }
        if self.account_key.is_empty() {
            missing.push("account key");
        }
        if self.service.is_empty() {
            missing.push("service");
        }
        if self.endpoint.is_empty() {
            missing.push("endpoint");
        }
        missing
    }
}

/// True when the input starts with a recognized blob scheme
pub fn is_blob_uri(uri: &str) -> bool {
    Scheme::split(uri).is_some()
}

/// Parse a blob URI with the default rules
pub fn parse_uri(uri: &str) -> StorageResult<BlobAddress> {
    BlobAddress::parse(uri)
}

/// Extract the blob path of a URI, without the query string
///
/// The whole URI is validated first; a malformed authority fails the same
/// way it does in [`parse_uri`].
pub fn parse_blob_path(uri: &str) -> StorageResult<String> {
    BlobAddress::parse(uri).map(|address| address.blob_path)
}

/// Split `container/blob/path` into the container and the blob name
pub fn split_container_path(path: &str, rules: &AddressRules) -> StorageResult<(String, String)> {
    let path = path.trim_start_matches('/');
    let (container, blob) = path.split_once('/').unwrap_or((path, ""));
    if container.is_empty() {
        return Err(StorageError::invalid_uri(path, "path does not start with a container name"));
    }
    rules.check_container(path, container)?;
    Ok((container.to_string(), blob.to_string()))
}

fn strip_query(rest: &str) -> &str {
    rest.split_once('?').map_or(rest, |(before, _)| before)
}

fn split_host<'a>(uri: &str, host: &'a str) -> StorageResult<(&'a str, &'a str, &'a str)> {
    let mut parts = host.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(account), Some(service), Some(endpoint))
            if !account.is_empty() && !service.is_empty() && !endpoint.is_empty() =>
        {
            Ok((account, service, endpoint))
        }
        _ => Err(StorageError::invalid_uri(
            uri,
            format!("authority '{}' is not of the form account.service.endpoint", host),
        )),
    }
}
