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

//! Storage error types and utilities

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while addressing, listing, uploading or moving blobs
#[derive(Error, Debug)]
pub enum StorageError {
    /// The URI matches neither addressing grammar, or fails a bounds check
    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri {
        /// The offending input
        uri: String,
        /// What was wrong with it
        reason: String,
    },

    /// A service handle could not be constructed for an account
    #[error("cannot connect to account '{account}' at '{endpoint}': {source:#}")]
    Connection {
        /// Storage account name
        account: String,
        /// Endpoint suffix (e.g. `core.windows.net`)
        endpoint: String,
        /// Underlying cause
        source: anyhow::Error,
    },

    /// A page fetch failed while enumerating
    #[error("listing '{subject}' failed: {source:#}")]
    List {
        /// Container or account being listed
        subject: String,
        /// Underlying cause
        source: anyhow::Error,
    },

    /// Staging or committing blocks failed
    #[error("upload to '{subject}' failed: {source:#}")]
    Upload {
        /// Destination URI
        subject: String,
        /// Underlying cause
        source: anyhow::Error,
    },

    /// Reading blob content failed
    #[error("download of '{subject}' failed: {source:#}")]
    Download {
        /// Source URI
        subject: String,
        /// Underlying cause
        source: anyhow::Error,
    },

    /// Any other collaborator call failed
    #[error("{operation} on '{subject}' failed: {source:#}")]
    Service {
        /// Name of the collaborator call
        operation: &'static str,
        /// URI or path the call addressed
        subject: String,
        /// Underlying cause
        source: anyhow::Error,
    },

    /// Source container or blob does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Source and destination mix container-level and blob-level addresses
    #[error("cannot rename '{from}' to '{to}': {reason}")]
    InvalidRename {
        /// Source URI
        from: String,
        /// Destination URI
        to: String,
        /// Why the pair is rejected
        reason: String,
    },

    /// A container rename copied only some blobs; the source was kept
    #[error(
        "rename of '{from}' to '{to}' incomplete: {} of {} blob(s) not copied ({})",
        uncopied.len(),
        copied + uncopied.len(),
        uncopied.join(", ")
    )]
    PartialRename {
        /// Source container URI
        from: String,
        /// Destination container URI
        to: String,
        /// Number of blobs copied successfully
        copied: usize,
        /// Names of blobs whose copy failed
        uncopied: Vec<String>,
    },

    /// A glob pattern is not of the form `container-pattern/blob-pattern`
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as given
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// Required address fields are empty
    #[error("missing required fields: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    /// The operation was cancelled before it completed
    #[error("operation on '{0}' was cancelled")]
    Cancelled(String),

    /// Reading the local source or writing the local sink failed
    #[error("local I/O for '{subject}' failed: {source}")]
    Io {
        /// URI of the blob being transferred
        subject: String,
        /// Underlying cause
        source: io::Error,
    },

    /// Transparent error delegation for wrapped error types
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Create an InvalidUri error
    pub fn invalid_uri<U: Into<String>, R: Into<String>>(uri: U, reason: R) -> Self {
        StorageError::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a listing failure
    pub fn list<S: Into<String>>(subject: S, source: anyhow::Error) -> Self {
        StorageError::List {
            subject: subject.into(),
            source,
        }
    }

    /// Wrap an upload failure
    pub fn upload<S: Into<String>>(subject: S, source: anyhow::Error) -> Self {
        StorageError::Upload {
            subject: subject.into(),
            source,
        }
    }

    /// Wrap a download failure
    pub fn download<S: Into<String>>(subject: S, source: anyhow::Error) -> Self {
        StorageError::Download {
            subject: subject.into(),
            source,
        }
    }

    /// Wrap a failed collaborator call
    pub fn service<S: Into<String>>(operation: &'static str, subject: S, source: anyhow::Error) -> Self {
        StorageError::Service {
            operation,
            subject: subject.into(),
            source,
        }
    }

    /// Create a NotFound error with the given subject
    pub fn not_found<S: Into<String>>(subject: S) -> Self {
        StorageError::NotFound(subject.into())
    }

    /// Create an InvalidRename error
    pub fn invalid_rename<F, T, R>(from: F, to: T, reason: R) -> Self
    where
        F: Into<String>,
        T: Into<String>,
        R: Into<String>,
    {
        StorageError::InvalidRename {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidPattern error
    pub fn invalid_pattern<P: Into<String>, R: Into<String>>(pattern: P, reason: R) -> Self {
        StorageError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create an Io error for a transfer of `subject`
    pub fn io<S: Into<String>>(subject: S, source: io::Error) -> Self {
        StorageError::Io {
            subject: subject.into(),
            source,
        }
    }

    /// Create a generic error from any error type that can convert to anyhow::Error
    pub fn other<E: Into<anyhow::Error>>(error: E) -> Self {
        StorageError::Other(error.into())
    }

    /// Check if this is an InvalidUri error
    pub fn is_invalid_uri(&self) -> bool {
        matches!(self, StorageError::InvalidUri { .. })
    }

    /// Check if this is a Connection error
    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection { .. })
    }

    /// Check if this is a List error
    pub fn is_list(&self) -> bool {
        matches!(self, StorageError::List { .. })
    }

    /// Check if this is an Upload error
    pub fn is_upload(&self) -> bool {
        matches!(self, StorageError::Upload { .. })
    }

    /// Check if this is a local Io error
    pub fn is_io(&self) -> bool {
        matches!(self, StorageError::Io { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Check if this is an InvalidRename error
    pub fn is_invalid_rename(&self) -> bool {
        matches!(self, StorageError::InvalidRename { .. })
    }

    /// Check if this is a Cancelled error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled(_))
    }
}
