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

//! Content type inference from blob names

use crate::model::DEFAULT_CONTENT_TYPE;

/// Extensions whose type is fixed regardless of the system registry
const FIXED_TYPES: &[(&str, &str)] = &[
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("avro", "avro/binary"),
    ("gz", "application/gzip"),
];

/// Content type for a blob name, from its extension
///
/// Parameters such as `; charset=utf-8` are dropped.
pub fn detect_content_type(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let extension = match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return DEFAULT_CONTENT_TYPE.to_string(),
    };

    if let Some((_, mime)) = FIXED_TYPES.iter().find(|(ext, _)| *ext == extension) {
        return (*mime).to_string();
    }

    let guessed = mime_guess::from_ext(&extension)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    match guessed.split_once(';') {
        Some((essence, _)) => essence.trim().to_string(),
        None => guessed.to_string(),
    }
}
