//! The in-memory site model.
//!
//! Handlers turn content items into [`SiteNode`]s; the [`SiteModel`] holds
//! every node of one build keyed by output path, which is the uniqueness
//! invariant: two nodes claiming one destination is an
//! [`OutputPathCollisionError`], never last-write-wins.
//!
//! Directory listings are derived, not produced by handlers. After the item
//! nodes are in place, [`SiteModel::derive_indexes`] gives every directory
//! with content (and its ancestors, and the root) an `index.html`:
//!
//! ```text
//! animals/wolf.jpg      → animals/wolf/index.html   (gallery entry)
//!                       → animals/wolf.jpg          (asset)
//! animals/index.md      → animals/index.html        (page, gets the listing)
//! about.md              → about/index.html          (page)
//!                       → index.html                (derived index)
//! ```
//!
//! Derivation only reads item nodes, so a model built incrementally and one
//! built from scratch derive the same indexes.

use crate::metadata::{self, MetadataRecord, Timestamp};
use crate::naming;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("output path collision at `{path}`: claimed by {} and {}", describe(.existing), describe(.incoming))]
pub struct OutputPathCollisionError {
    pub path: String,
    pub existing: Option<String>,
    pub incoming: Option<String>,
}

fn describe(source: &Option<String>) -> String {
    match source {
        Some(s) => format!("`{s}`"),
        None => "a derived index".to_string(),
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub title: String,
    /// Link target relative to the output root, ending in `/`.
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Timestamp>,
    /// Output path of an image representing the entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// An image's own page. `image` is the output path of its asset.
    GalleryEntry { image: String },
    /// A source file copied verbatim.
    Asset,
    /// Rendered markdown; `listing` is set for directory index pages.
    Page {
        html: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        listing: Option<Vec<ListingEntry>>,
    },
    /// A derived directory listing.
    Index { listing: Vec<ListingEntry> },
    /// Content produced by an external handler, written as-is.
    External { content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteNode {
    /// `/`-separated path under the output root.
    pub output_path: String,
    /// Content-relative path of the item that produced this node; `None` for
    /// derived nodes.
    pub source: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub metadata: MetadataRecord,
}

impl SiteNode {
    pub fn is_derived(&self) -> bool {
        matches!(self.kind, NodeKind::Index { .. })
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title()
    }

    /// A page written from an `index.*` source, standing in for its directory.
    fn is_index_page(&self) -> bool {
        matches!(self.kind, NodeKind::Page { .. })
            && self
                .source
                .as_deref()
                .and_then(|s| Path::new(s).file_stem())
                .is_some_and(|stem| stem == "index")
    }

    /// Whether this node shows up as an entry in its directory's listing.
    fn is_listed(&self) -> bool {
        match self.kind {
            NodeKind::GalleryEntry { .. } => true,
            NodeKind::Page { .. } => !self.is_index_page(),
            _ => false,
        }
    }
}

/// The complete set of output nodes for one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteModel {
    nodes: BTreeMap<String, SiteNode>,
}

impl SiteModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, refusing a destination another node already claims.
    pub fn insert(&mut self, node: SiteNode) -> Result<(), OutputPathCollisionError> {
        if let Some(existing) = self.nodes.get(&node.output_path) {
            return Err(OutputPathCollisionError {
                path: node.output_path,
                existing: existing.source.clone(),
                incoming: node.source,
            });
        }
        self.nodes.insert(node.output_path.clone(), node);
        Ok(())
    }

    pub fn get(&self, output_path: &str) -> Option<&SiteNode> {
        self.nodes.get(output_path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in output-path order.
    pub fn nodes(&self) -> impl Iterator<Item = &SiteNode> {
        self.nodes.values()
    }

    pub fn output_paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Content-relative paths of every item with at least one node.
    pub fn sources(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .filter_map(|n| n.source.as_deref())
            .collect()
    }

    /// Drop every node an item produced.
    pub fn remove_source(&mut self, source: &str) {
        self.nodes
            .retain(|_, node| node.source.as_deref() != Some(source));
    }

    /// Remove derived indexes and page listings, leaving only item nodes.
    pub fn strip_derived(&mut self) {
        self.nodes.retain(|_, node| !node.is_derived());
        for node in self.nodes.values_mut() {
            if let NodeKind::Page { listing, .. } = &mut node.kind {
                *listing = None;
            }
        }
    }

    /// Attach directory listings, creating `Index` nodes where no index
    /// page exists.
    ///
    /// Expects a model of item nodes only (see [`strip_derived`](Self::strip_derived)).
    pub fn derive_indexes(&mut self) -> Result<(), OutputPathCollisionError> {
        let mut entries: BTreeMap<String, Vec<ListingEntry>> = BTreeMap::new();
        let mut dirs: BTreeSet<String> = BTreeSet::from([String::new()]);
        let mut thumbnails: BTreeMap<String, String> = BTreeMap::new();
        let mut index_titles: BTreeMap<String, String> = BTreeMap::new();

        for node in self.nodes.values() {
            if node.is_index_page() {
                let dir = parent_dir(&node.output_path).trim_end_matches('/');
                dirs.extend(ancestors(dir));
                if let Some(title) = node.title() {
                    index_titles.insert(dir.to_string(), title.to_string());
                }
                continue;
            }
            if !node.is_listed() {
                continue;
            }
            let href = parent_dir(&node.output_path).to_string();
            let listing_dir = parent_dir(href.trim_end_matches('/')).to_string();
            let listing_dir = listing_dir.trim_end_matches('/').to_string();

            let thumbnail = match &node.kind {
                NodeKind::GalleryEntry { image } => Some(image.clone()),
                _ => None,
            };
            if let Some(image) = &thumbnail {
                for ancestor in ancestors(&listing_dir) {
                    thumbnails.entry(ancestor).or_insert_with(|| image.clone());
                }
            }
            for ancestor in ancestors(&listing_dir) {
                dirs.insert(ancestor);
            }

            entries.entry(listing_dir).or_default().push(ListingEntry {
                title: node.title().unwrap_or_default().to_string(),
                href,
                date: node.metadata.date().copied(),
                thumbnail,
            });
        }

        // Every non-root directory is an entry of its parent's listing.
        for dir in dirs.iter().filter(|d| !d.is_empty()) {
            let (parent, name) = dir.rsplit_once('/').unwrap_or(("", dir.as_str()));
            let title = index_titles
                .get(dir)
                .cloned()
                .unwrap_or_else(|| naming::title_from_stem(name));
            entries.entry(parent.to_string()).or_default().push(ListingEntry {
                title,
                href: format!("{dir}/"),
                date: None,
                thumbnail: thumbnails.get(dir).cloned(),
            });
        }

        for dir in dirs {
            let mut listing = entries.remove(&dir).unwrap_or_default();
            listing.sort_by(|a, b| a.href.cmp(&b.href));
            let path = index_path(&dir);

            match self.nodes.get_mut(&path) {
                Some(SiteNode {
                    kind: NodeKind::Page { listing: slot, .. },
                    ..
                }) => *slot = Some(listing),
                Some(other) => {
                    return Err(OutputPathCollisionError {
                        path,
                        existing: other.source.clone(),
                        incoming: None,
                    });
                }
                None => {
                    let title = dir
                        .rsplit('/')
                        .next()
                        .filter(|name| !name.is_empty())
                        .map(naming::title_from_stem);
                    let mut metadata = MetadataRecord::new();
                    if let Some(title) = title {
                        metadata.insert(metadata::TITLE, title);
                    }
                    self.nodes.insert(
                        path.clone(),
                        SiteNode {
                            output_path: path,
                            source: None,
                            kind: NodeKind::Index { listing },
                            metadata,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// SHA-256 over the model's canonical JSON. Equal models, equal prints.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&json)))
    }
}

/// Output path of a directory's index page.
pub fn index_path(dir: &str) -> String {
    if dir.is_empty() {
        "index.html".to_string()
    } else {
        format!("{dir}/index.html")
    }
}

/// Join a content directory and a path below it.
pub fn join_output(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// Everything up to and including the last `/`; empty at the root.
fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..=i]).unwrap_or("")
}

/// `a/b/c` → `a/b/c`, `a/b`, `a`, `` (the root).
fn ancestors(dir: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = dir;
    loop {
        out.push(current.to_string());
        if current.is_empty() {
            break;
        }
        current = current.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
    }
    out
}
