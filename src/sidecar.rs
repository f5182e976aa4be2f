//! Sidecar metadata files.
//!
//! Authors override embedded metadata with files sitting next to the item,
//! named after it:
//!
//! ```text
//! animals/
//! ├── IMG_4056.jpeg
//! ├── IMG_4056.toml    # structured overrides
//! └── IMG_4056.txt     # plain-text description
//! ```
//!
//! The `.toml` sidecar is a flat table; every top-level key becomes a field:
//!
//! ```toml
//! title = "Sunrise"
//! date = 2019-09-10T06:49:11
//! keywords = ["wolf", "dawn"]
//! ```
//!
//! The `.txt` sidecar's trimmed contents become `description`. When both set
//! a description the `.toml` wins. A `.toml` or `.txt` file is a sidecar only
//! while an item with the same stem sits next to it; on its own it is an
//! ordinary content file.

use crate::metadata::{self, MetadataRecord, MetadataValue, Timestamp, TimestampError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of the structured sidecar.
pub const STRUCTURED_EXTENSION: &str = "toml";
/// Extension of the plain-text description sidecar.
pub const DESCRIPTION_EXTENSION: &str = "txt";

#[derive(Error, Debug)]
pub enum SidecarParseError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{}: invalid date: {source}", path.display())]
    InvalidDate {
        path: PathBuf,
        #[source]
        source: TimestampError,
    },
    #[error("{}: field `{key}` has an unsupported value (tables and mixed arrays are not allowed)", path.display())]
    UnsupportedValue { path: PathBuf, key: String },
}

/// Paths of the sidecars an item would have.
pub fn sidecar_paths(item: &Path) -> [PathBuf; 2] {
    [
        item.with_extension(STRUCTURED_EXTENSION),
        item.with_extension(DESCRIPTION_EXTENSION),
    ]
}

/// Whether `path` carries one of the sidecar extensions.
pub fn has_sidecar_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            e.eq_ignore_ascii_case(STRUCTURED_EXTENSION)
                || e.eq_ignore_ascii_case(DESCRIPTION_EXTENSION)
        })
}

/// Whether `path` is the sidecar of an item next to it. Content walking
/// skips these.
pub fn is_sidecar(path: &Path) -> bool {
    if !has_sidecar_extension(path) {
        return false;
    }
    let (Some(dir), Some(stem)) = (path.parent(), path.file_stem()) else {
        return false;
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let sibling = entry.path();
        sibling.file_stem() == Some(stem)
            && !has_sidecar_extension(&sibling)
            && sibling.is_file()
    })
}

/// Read the sidecars of `item`, if it has any.
///
/// Returns `Ok(None)` when neither file exists, and also when they exist but
/// set nothing (an empty `.txt`).
pub fn resolve(item: &Path) -> Result<Option<MetadataRecord>, SidecarParseError> {
    let [structured, description] = sidecar_paths(item);
    let mut record = MetadataRecord::new();

    if let Some(text) = read_optional(&description)? {
        let text = text.trim();
        if !text.is_empty() {
            record.insert(metadata::DESCRIPTION, text);
        }
    }
    if let Some(source) = read_optional(&structured)? {
        let parsed = parse_structured(&source, &structured)?;
        for (key, value) in parsed.iter() {
            record.insert(key, value.clone());
        }
    }

    Ok((!record.is_empty()).then_some(record))
}

fn read_optional(path: &Path) -> Result<Option<String>, SidecarParseError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SidecarParseError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse the contents of a structured sidecar.
pub fn parse_structured(source: &str, path: &Path) -> Result<MetadataRecord, SidecarParseError> {
    let table: toml::Table = toml::from_str(source).map_err(|source| SidecarParseError::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    let mut record = MetadataRecord::new();
    for (key, value) in table {
        let unsupported = || SidecarParseError::UnsupportedValue {
            path: path.to_path_buf(),
            key: key.clone(),
        };
        let value = match value {
            toml::Value::String(s) if key.eq_ignore_ascii_case(metadata::DATE) => {
                let ts = Timestamp::parse(&s).map_err(|source| SidecarParseError::InvalidDate {
                    path: path.to_path_buf(),
                    source,
                })?;
                MetadataValue::Timestamp(ts)
            }
            toml::Value::String(s) => {
                if s.trim().is_empty() {
                    continue;
                }
                MetadataValue::Text(s)
            }
            toml::Value::Datetime(dt) => {
                let ts = Timestamp::parse(&dt.to_string()).map_err(|source| {
                    SidecarParseError::InvalidDate {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                MetadataValue::Timestamp(ts)
            }
            toml::Value::Integer(i) => MetadataValue::Integer(i),
            toml::Value::Float(f) => MetadataValue::Float(f),
            toml::Value::Boolean(b) => MetadataValue::Bool(b),
            toml::Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .into_iter()
                    .map(|v| match v {
                        toml::Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                MetadataValue::List(strings.ok_or_else(unsupported)?)
            }
            toml::Value::Table(_) => return Err(unsupported()),
        };
        record.insert(&key, value);
    }
    Ok(record)
}
