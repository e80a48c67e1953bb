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

//! Matching `container/blob` patterns against an account
//!
//! A pattern has exactly one `/`: the part before it selects containers, the
//! part after it selects blobs. `*` and `?` never match `/`, so `logs/*.csv`
//! does not reach `logs/2024/a.csv`.

use crate::error::{StorageError, StorageResult};
use crate::model::{ListBlobsRequest, ListContainersRequest};
use crate::BlobService;
use ::glob::{MatchOptions, Pattern};
use tracing::debug;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A parsed `container-pattern/blob-pattern`
#[derive(Debug, Clone)]
pub struct BlobPattern {
    container: Pattern,
    blob: Pattern,
}

impl BlobPattern {
    /// Parse `pattern`
    pub fn new(pattern: &str) -> StorageResult<Self> {
        let (container, blob) = match pattern.split('/').count() {
            2 => pattern.split_once('/').unwrap_or((pattern, "")),
            _ => {
                return Err(StorageError::invalid_pattern(
                    pattern,
                    "expected exactly one '/' separating container and blob patterns",
                ))
            }
        };
        let compile = |part: &str| {
            Pattern::new(part).map_err(|e| StorageError::invalid_pattern(pattern, e.to_string()))
        };
        Ok(Self {
            container: compile(container)?,
            blob: compile(blob)?,
        })
    }

    /// Whether a container name matches the container part
    pub fn matches_container(&self, name: &str) -> bool {
        self.container.matches_with(name, MATCH_OPTIONS)
    }

    /// Whether a blob name matches the blob part
    pub fn matches_blob(&self, name: &str) -> bool {
        self.blob.matches_with(name, MATCH_OPTIONS)
    }
}

/// Every `container/blob` of the account matching `pattern`, in listing order
pub async fn glob(service: &dyn BlobService, pattern: &str) -> StorageResult<Vec<String>> {
    let pattern = BlobPattern::new(pattern)?;

    let mut containers = Vec::new();
    let mut marker = None;
    loop {
        let page = service
            .list_containers(&ListContainersRequest {
                prefix: None,
                marker: marker.take(),
            })
            .await
            .map_err(|e| StorageError::list("containers", e))?;
        containers.extend(
            page.entries
                .iter()
                .filter(|c| pattern.matches_container(&c.name))
                .map(|c| c.name.clone()),
        );
        match page.continuation() {
            Some(next) => marker = Some(next.to_string()),
            None => break,
        }
    }

    let mut matches = Vec::new();
    for container in containers {
        let mut marker = None;
        loop {
            let page = service
                .list_blobs(&ListBlobsRequest {
                    container: container.clone(),
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|e| StorageError::list(container.as_str(), e))?;
            matches.extend(
                page.entries
                    .iter()
                    .filter(|b| pattern.matches_blob(&b.name))
                    .map(|b| format!("{}/{}", container, b.name)),
            );
            match page.continuation() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
    }

    debug!(matches = matches.len(), "Glob finished");
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_needs_one_separator() {
        assert!(BlobPattern::new("logs").is_err());
        assert!(BlobPattern::new("logs/2024/*.csv").is_err());
        assert!(BlobPattern::new("logs-*/*.csv").is_ok());
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let p = BlobPattern::new("lo?s/*.csv").unwrap();
        assert!(p.matches_container("logs"));
        assert!(!p.matches_container("logs2"));
        assert!(p.matches_blob("a.csv"));
        assert!(!p.matches_blob("2024/a.csv"));
    }

    #[test]
    fn test_bad_pattern_syntax() {
        let err = BlobPattern::new("c/[").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPattern { .. }));
    }
}
