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

//! Azure Blob Storage over its REST protocol
//!
//! [`AzureBlobService`] implements [`BlobService`] with plain HTTP requests
//! signed by the account's shared key. Listing markers are passed through
//! untouched, so the lister controls pagination page by page.
//!
//! # Examples
//!
//! ```rust,no_run
//! use blobcmd_storage::azure::AzureConnector;
//! use blobcmd_storage::{BlobAddress, ClientCache};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let cache = ClientCache::new(Arc::new(AzureConnector::new()?));
//! let address = BlobAddress::parse("https://myaccount.blob.core.windows.net/logs/app.log")?;
//! let service = cache.resolve(&address.descriptor("bXlrZXk=")).await?;
//! println!("{}", service.blob_url(&address.container, &address.blob_path));
//! # Ok(())
//! # }
//! ```
//!
//! # Testing with Azurite
//!
//! Point the connector at the emulator; requests then use path-style URLs
//! such as `http://127.0.0.1:10000/devstoreaccount1/container/blob`.
//!
//! ```bash
//! azurite --silent --location /tmp/azurite
//! export AZURE_STORAGE_ACCOUNT=devstoreaccount1
//! export BLOBCMD_EMULATOR_URL=http://127.0.0.1:10000
//! ```

mod credential;
mod model;

pub use credential::SharedKeyCredential;

use crate::address::ConnectionDescriptor;
use crate::cache::ServiceConnector;
use crate::model::{
    BlobPage, BlobProperties, BlockDescriptor, BlockListing, ContainerPage, ListBlobsRequest,
    ListContainersRequest,
};
use crate::{BlobService, BlobStream};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// REST protocol version sent with every request
pub const API_VERSION: &str = "2021-08-06";

/// Account name and key of the storage emulator
pub const EMULATOR_ACCOUNT: &str = "devstoreaccount1";

/// Well-known shared key of the storage emulator
pub const EMULATOR_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const COPY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const MS_DATE: HeaderName = HeaderName::from_static("x-ms-date");
const MS_VERSION: HeaderName = HeaderName::from_static("x-ms-version");
const MS_BLOB_TYPE: HeaderName = HeaderName::from_static("x-ms-blob-type");
const MS_BLOB_CONTENT_TYPE: HeaderName = HeaderName::from_static("x-ms-blob-content-type");
const MS_COPY_SOURCE: HeaderName = HeaderName::from_static("x-ms-copy-source");
const MS_COPY_STATUS: HeaderName = HeaderName::from_static("x-ms-copy-status");
const MS_COPY_STATUS_DESCRIPTION: HeaderName = HeaderName::from_static("x-ms-copy-status-description");
const MS_ERROR_CODE: HeaderName = HeaderName::from_static("x-ms-error-code");

/// HTTP date layout of `x-ms-date`
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// One storage account reached over HTTP(S)
#[derive(Debug, Clone)]
pub struct AzureBlobService {
    client: Client,
    credential: SharedKeyCredential,
    base: Url,
}

impl AzureBlobService {
    /// Service for the account described by `descriptor`
    ///
    /// With `emulator_url`, requests go to `{emulator_url}/{account}` instead
    /// of the account's own host.
    ///
    /// # Errors
    ///
    /// Fails when the key is not base64 or the service URL does not parse.
    pub fn new(client: Client, descriptor: &ConnectionDescriptor, emulator_url: Option<&str>) -> anyhow::Result<Self> {
        let credential = SharedKeyCredential::new(descriptor.account_name.clone(), &descriptor.account_key)?;
        let base = match emulator_url {
            Some(root) => {
                let mut url = Url::parse(root).with_context(|| format!("invalid emulator URL '{}'", root))?;
                url.path_segments_mut()
                    .map_err(|_| anyhow!("emulator URL '{}' cannot take a path", root))?
                    .pop_if_empty()
                    .push(&descriptor.account_name);
                url
            }
            None => {
                let root = descriptor.service_url();
                Url::parse(&root).with_context(|| format!("invalid service URL '{}'", root))?
            }
        };
        Ok(Self {
            client,
            credential,
            base,
        })
    }

    /// Account this service talks to
    pub fn account(&self) -> &str {
        self.credential.account()
    }

    /// URL of a container, or of a blob when `blob` is non-empty
    fn url(&self, container: &str, blob: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if !container.is_empty() {
                segments.push(container);
            }
            if !blob.is_empty() {
                segments.extend(blob.split('/'));
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn send(&self, method: Method, url: Url, mut headers: HeaderMap, body: Option<Bytes>) -> anyhow::Result<Response> {
        let date = Utc::now().format(HTTP_DATE).to_string();
        headers.insert(MS_DATE, HeaderValue::from_str(&date).context("x-ms-date header")?);
        headers.insert(MS_VERSION, HeaderValue::from_static(API_VERSION));
        let length = body.as_ref().map(Bytes::len).unwrap_or(0);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

        let mut request = Request::new(method, url);
        *request.headers_mut() = headers;
        if let Some(body) = body {
            *request.body_mut() = Some(body.into());
        }
        self.credential.sign(&mut request)?;

        tracing::trace!(method = %request.method(), url = %request.url(), "Sending request");
        self.client
            .execute(request)
            .await
            .context("request failed to reach the service")
    }

    async fn get(&self, url: Url) -> anyhow::Result<Response> {
        self.send(Method::GET, url, HeaderMap::new(), None).await
    }

    async fn head(&self, url: Url) -> anyhow::Result<Response> {
        self.send(Method::HEAD, url, HeaderMap::new(), None).await
    }

    async fn delete(&self, url: Url) -> anyhow::Result<Response> {
        self.send(Method::DELETE, url, HeaderMap::new(), None).await
    }

    async fn put(&self, url: Url, headers: HeaderMap, body: Option<Bytes>) -> anyhow::Result<Response> {
        self.send(Method::PUT, url, headers, body).await
    }

    async fn exists(&self, url: Url) -> anyhow::Result<bool> {
        let response = self.head(url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => check(response).await.map(|_| true),
        }
    }

    async fn delete_if_exists(&self, url: Url) -> anyhow::Result<bool> {
        let response = self.delete(url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => check(response).await.map(|_| true),
        }
    }

    async fn text(&self, url: Url, what: &str) -> anyhow::Result<String> {
        let response = check(self.get(url).await?).await?;
        response.text().await.with_context(|| format!("read {}", what))
    }

    async fn wait_for_copy(&self, container: &str, blob: &str, mut response: Response) -> anyhow::Result<()> {
        loop {
            let status = header(&response, &MS_COPY_STATUS).unwrap_or("success").to_string();
            match status.as_str() {
                "success" => return Ok(()),
                "pending" => {
                    tracing::debug!(container, blob, "Copy pending");
                    tokio::time::sleep(COPY_POLL_INTERVAL).await;
                    response = check(self.head(self.url(container, blob, &[])).await?).await?;
                }
                other => {
                    let description = header(&response, &MS_COPY_STATUS_DESCRIPTION).unwrap_or_default();
                    bail!("copy ended with status '{}' {}", other, description);
                }
            }
        }
    }
}

fn header<'a>(response: &'a Response, name: &HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Pass successful responses through; turn the rest into errors carrying the
/// service error code
async fn check(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let header_code = header(&response, &MS_ERROR_CODE).map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    match model::parse_service_error(&body) {
        Some(error) => Err(anyhow!(
            "HTTP {} {}: {}",
            status.as_u16(),
            error.code,
            error.message.unwrap_or_default().trim()
        )),
        None => Err(anyhow!(
            "HTTP {} {}",
            status.as_u16(),
            header_code.unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string())
        )),
    }
}

fn content_type_headers(content_type: &str) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        MS_BLOB_CONTENT_TYPE,
        HeaderValue::from_str(content_type).context("content type header")?,
    );
    Ok(headers)
}

#[async_trait]
impl BlobService for AzureBlobService {
    async fn list_containers(&self, request: &ListContainersRequest) -> anyhow::Result<ContainerPage> {
        let mut query = vec![("comp", "list")];
        if let Some(prefix) = request.prefix.as_deref() {
            query.push(("prefix", prefix));
        }
        if let Some(marker) = request.marker.as_deref() {
            query.push(("marker", marker));
        }
        let body = self.text(self.url("", "", &query), "container listing").await?;
        model::parse_container_page(&body)
    }

    async fn list_blobs(&self, request: &ListBlobsRequest) -> anyhow::Result<BlobPage> {
        let mut query = vec![("restype", "container"), ("comp", "list")];
        if let Some(prefix) = request.prefix.as_deref() {
            query.push(("prefix", prefix));
        }
        if let Some(delimiter) = request.delimiter.as_deref() {
            query.push(("delimiter", delimiter));
        }
        if let Some(marker) = request.marker.as_deref() {
            query.push(("marker", marker));
        }
        let body = self
            .text(self.url(&request.container, "", &query), "blob listing")
            .await
            .with_context(|| format!("list container '{}'", request.container))?;
        model::parse_blob_page(&body)
    }

    async fn get_blob(&self, container: &str, blob: &str) -> anyhow::Result<BlobStream> {
        let response = check(self.get(self.url(container, blob, &[])).await?).await?;
        Ok(Box::pin(response.bytes_stream().map_err(anyhow::Error::from)))
    }

    async fn blob_exists(&self, container: &str, blob: &str) -> anyhow::Result<bool> {
        self.exists(self.url(container, blob, &[])).await
    }

    async fn container_exists(&self, container: &str) -> anyhow::Result<bool> {
        self.exists(self.url(container, "", &[("restype", "container")])).await
    }

    async fn create_container_if_not_exists(&self, container: &str) -> anyhow::Result<bool> {
        let url = self.url(container, "", &[("restype", "container")]);
        let response = self.put(url, HeaderMap::new(), None).await?;
        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            _ => {
                check(response).await?;
                tracing::info!(container, "Created container");
                Ok(true)
            }
        }
    }

    async fn delete_container(&self, container: &str) -> anyhow::Result<()> {
        check(self.delete(self.url(container, "", &[("restype", "container")])).await?).await?;
        Ok(())
    }

    async fn delete_container_if_exists(&self, container: &str) -> anyhow::Result<bool> {
        self.delete_if_exists(self.url(container, "", &[("restype", "container")]))
            .await
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> anyhow::Result<()> {
        check(self.delete(self.url(container, blob, &[])).await?).await?;
        Ok(())
    }

    async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> anyhow::Result<bool> {
        self.delete_if_exists(self.url(container, blob, &[])).await
    }

    async fn create_block_blob(&self, container: &str, blob: &str, content_type: &str) -> anyhow::Result<()> {
        let mut headers = content_type_headers(content_type)?;
        headers.insert(MS_BLOB_TYPE, HeaderValue::from_static("BlockBlob"));
        check(self.put(self.url(container, blob, &[]), headers, None).await?).await?;
        Ok(())
    }

    async fn get_block_list(&self, container: &str, blob: &str) -> anyhow::Result<BlockListing> {
        let url = self.url(container, blob, &[("comp", "blocklist"), ("blocklisttype", "all")]);
        let body = self.text(url, "block list").await?;
        model::parse_block_listing(&body)
    }

    async fn put_block(&self, container: &str, blob: &str, block_id: &str, data: Bytes) -> anyhow::Result<()> {
        let url = self.url(container, blob, &[("comp", "block"), ("blockid", block_id)]);
        check(self.put(url, HeaderMap::new(), Some(data)).await?).await?;
        Ok(())
    }

    async fn put_block_list(&self, container: &str, blob: &str, blocks: &[BlockDescriptor]) -> anyhow::Result<()> {
        // the commit resets content headers it is not given
        let current = check(self.head(self.url(container, blob, &[])).await?).await?;
        let mut headers = match header(&current, &CONTENT_TYPE) {
            Some(content_type) => content_type_headers(content_type)?,
            None => HeaderMap::new(),
        };
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));

        let body = Bytes::from(model::block_list_xml(blocks));
        let url = self.url(container, blob, &[("comp", "blocklist")]);
        check(self.put(url, headers, Some(body)).await?).await?;
        Ok(())
    }

    async fn copy_blob(&self, container: &str, blob: &str, source_url: &str) -> anyhow::Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            MS_COPY_SOURCE,
            HeaderValue::from_str(source_url).context("copy source header")?,
        );
        let response = check(self.put(self.url(container, blob, &[]), headers, None).await?).await?;
        self.wait_for_copy(container, blob, response).await
    }

    async fn set_blob_properties(&self, container: &str, blob: &str, properties: &BlobProperties) -> anyhow::Result<()> {
        let headers = match properties.content_type.as_deref() {
            Some(content_type) => content_type_headers(content_type)?,
            None => HeaderMap::new(),
        };
        let url = self.url(container, blob, &[("comp", "properties")]);
        check(self.put(url, headers, None).await?).await?;
        Ok(())
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        self.url(container, blob, &[]).to_string()
    }
}

/// Builds [`AzureBlobService`] handles for the client cache
#[derive(Debug, Clone)]
pub struct AzureConnector {
    client: Client,
    emulator_url: Option<String>,
}

impl AzureConnector {
    /// Connector for the public cloud endpoints
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            emulator_url: None,
        })
    }

    /// Send every request to an emulator at `url` using path-style addressing
    pub fn with_emulator(mut self, url: impl Into<String>) -> Self {
        self.emulator_url = Some(url.into());
        self
    }
}

#[async_trait]
impl ServiceConnector for AzureConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> anyhow::Result<Arc<dyn BlobService>> {
        let service = AzureBlobService::new(self.client.clone(), descriptor, self.emulator_url.as_deref())?;
        tracing::debug!(account = %descriptor.account_name, base = %service.base, "Created blob service client");
        Ok(Arc::new(service))
    }
}
