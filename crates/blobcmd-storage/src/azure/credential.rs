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

//! Shared Key request signing
//!
//! Every request carries `Authorization: SharedKey {account}:{signature}`,
//! where the signature is the base64 HMAC-SHA256 of a canonical rendering of
//! the request under the decoded account key.

use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Request;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Standard headers that take part in the signature, in signing order
const SIGNED_HEADERS: &[&str] = &[
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Account name plus decoded shared key
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SharedKeyCredential {
    /// Credential from a base64 account key
    ///
    /// # Errors
    ///
    /// Fails when the key is not valid base64.
    pub fn new(account: impl Into<String>, key: &str) -> anyhow::Result<Self> {
        let key = STANDARD.decode(key.trim()).context("account key is not valid base64")?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    /// Account the credential signs for
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Add the `Authorization` header to a fully built request
    pub fn sign(&self, request: &mut Request) -> anyhow::Result<()> {
        let to_sign = string_to_sign(request.method().as_str(), request.headers(), request.url(), &self.account);
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| anyhow!("HMAC key error: {}", e))?;
        mac.update(to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let value = HeaderValue::from_str(&format!("SharedKey {}:{}", self.account, signature))
            .context("authorization header")?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

/// Canonical request text covered by the signature
pub(crate) fn string_to_sign(method: &str, headers: &HeaderMap, url: &Url, account: &str) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(method);
    out.push('\n');
    for name in SIGNED_HEADERS {
        let value = header_str(headers, name);
        // a zero length is signed as empty
        if *name == "content-length" && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(&canonicalized_headers(headers));
    out.push_str(&canonicalized_resource(url, account));
    out
}

/// `x-ms-*` headers, lower-cased and sorted, one `name:value\n` line each
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms: BTreeMap<&str, &str> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if name.starts_with("x-ms-") {
            ms.insert(name, value.to_str().unwrap_or_default().trim());
        }
    }
    ms.iter().map(|(name, value)| format!("{}:{}\n", name, value)).collect()
}

/// `/{account}{path}` followed by each query name with its sorted values
fn canonicalized_resource(url: &Url, account: &str) -> String {
    let mut out = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }
    out
}
