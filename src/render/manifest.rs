//! Render manifest for incremental output.
//!
//! Records the SHA-256 of every file the renderer wrote, keyed by output
//! path. On the next render a node whose bytes hash the same (and whose file
//! is still on disk) is not rewritten, and files the manifest lists but the
//! model no longer has are deleted.
//!
//! The manifest is a JSON file at `<output_dir>/.render-manifest.json`. A
//! missing, corrupt or older-version manifest loads as empty, which just
//! means everything is rewritten once.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Name of the manifest file within the output directory.
pub const MANIFEST_FILENAME: &str = ".render-manifest.json";

/// Bump to invalidate every existing manifest.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderManifest {
    pub version: u32,
    /// Output path → hex SHA-256 of the written bytes.
    pub entries: BTreeMap<String, String>,
}

impl RenderManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load from the output directory, falling back to empty.
    pub fn load(output_dir: &Path) -> Self {
        let path = output_dir.join(MANIFEST_FILENAME);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::empty();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest,
            _ => Self::empty(),
        }
    }

    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(output_dir.join(MANIFEST_FILENAME), json)
    }

    /// Whether `output_path` was last written with exactly `hash`.
    pub fn is_current(&self, output_path: &str, hash: &str) -> bool {
        self.entries.get(output_path).is_some_and(|h| h == hash)
    }

    pub fn insert(&mut self, output_path: String, hash: String) {
        self.entries.insert(output_path, hash);
    }

    /// Paths this manifest lists that `next` does not.
    pub fn stale_paths<'a>(&'a self, next: &Self) -> Vec<&'a str> {
        self.entries
            .keys()
            .filter(|path| !next.entries.contains_key(*path))
            .map(String::as_str)
            .collect()
    }
}

/// SHA-256 of a byte string, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
