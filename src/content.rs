//! Content tree traversal.
//!
//! Walks the content root in file-name order and pairs every file with the
//! first [`Handler`] that claims it. Hidden entries (leading `.`) and sidecar
//! files are never content items. Files no handler claims are reported as
//! skipped, with a warning, and don't fail the build.

use crate::handlers::{Handler, HandlerSet};
use crate::sidecar;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("content root {} is not readable: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One file under the content root.
///
/// Identity is the forward-slash path relative to the content root, which is
/// also what output paths are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the content root, `/`-separated.
    pub relative: String,
    /// Lowercased extension without the dot; the item's content-type class.
    pub extension: String,
    pub modified: Option<SystemTime>,
}

impl ContentItem {
    /// Build an item for a file under `root`.
    pub fn new(root: &Path, path: &Path) -> Option<Self> {
        let relative = relative_key(root, path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        Some(Self {
            path: path.to_path_buf(),
            relative,
            extension,
            modified,
        })
    }

    /// File name without extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.relative)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Directory part of [`relative`](Self::relative); empty at the root.
    pub fn dir(&self) -> &str {
        self.relative
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("")
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// An item paired with the handler that will process it.
#[derive(Clone)]
pub struct Routed {
    pub item: ContentItem,
    pub handler: Arc<dyn Handler>,
}

/// Everything one pass over the content root found.
#[derive(Default)]
pub struct Walk {
    pub routed: Vec<Routed>,
    /// Relative paths of files no handler claimed.
    pub skipped: Vec<String>,
}

pub struct ContentWalker<'a> {
    root: &'a Path,
    handlers: &'a HandlerSet,
}

impl<'a> ContentWalker<'a> {
    pub fn new(root: &'a Path, handlers: &'a HandlerSet) -> Self {
        Self { root, handlers }
    }

    /// Enumerate every content item in deterministic order.
    pub fn walk(&self) -> Result<Walk, WalkError> {
        fs::read_dir(self.root).map_err(|source| WalkError::Root {
            path: self.root.to_path_buf(),
            source,
        })?;

        let mut walk = Walk::default();
        let entries = WalkDir::new(self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || sidecar::is_sidecar(entry.path()) {
                continue;
            }
            let Some(item) = ContentItem::new(self.root, entry.path()) else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 path");
                continue;
            };
            match self.handlers.select(&item) {
                Some(handler) => {
                    debug!(item = %item.relative, handler = handler.name(), "routed");
                    walk.routed.push(Routed { item, handler });
                }
                None => {
                    warn!(item = %item.relative, "no handler matches, skipping");
                    walk.skipped.push(item.relative);
                }
            }
        }

        Ok(walk)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::plugins::Registry;
    use tempfile::TempDir;

    fn handlers() -> HandlerSet {
        HandlerSet::from_registry(&Registry::builtin(), &config::stock_config())
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walks_in_name_order_and_routes_by_extension() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b/020-wolf.jpg");
        touch(tmp.path(), "b/010-bear.JPG");
        touch(tmp.path(), "about.md");
        touch(tmp.path(), "a/notes.md");

        let handlers = handlers();
        let walk = ContentWalker::new(tmp.path(), &handlers).walk().unwrap();
        let routed: Vec<(&str, &str)> = walk
            .routed
            .iter()
            .map(|r| (r.item.relative.as_str(), r.handler.name()))
            .collect();
        assert_eq!(
            routed,
            vec![
                ("a/notes.md", "page"),
                ("about.md", "page"),
                ("b/010-bear.JPG", "gallery"),
                ("b/020-wolf.jpg", "gallery"),
            ]
        );
    }

    #[test]
    fn sidecars_and_hidden_entries_are_not_items() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "wolf.jpg");
        touch(tmp.path(), "wolf.toml");
        touch(tmp.path(), "wolf.txt");
        touch(tmp.path(), ".DS_Store");
        touch(tmp.path(), ".git/config.md");

        let handlers = handlers();
        let walk = ContentWalker::new(tmp.path(), &handlers).walk().unwrap();
        assert_eq!(walk.routed.len(), 1);
        assert!(walk.skipped.is_empty());
    }

    #[test]
    fn text_files_without_an_owner_are_items() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "wolf.jpg");
        touch(tmp.path(), "wolf.txt");
        touch(tmp.path(), "journal/day-one.txt");
        touch(tmp.path(), "settings.toml");

        let mut site_config = config::stock_config();
        site_config.handlers.page.extensions.push("txt".into());
        let handlers = HandlerSet::from_registry(&Registry::builtin(), &site_config);
        let walk = ContentWalker::new(tmp.path(), &handlers).walk().unwrap();
        let routed: Vec<(&str, &str)> = walk
            .routed
            .iter()
            .map(|r| (r.item.relative.as_str(), r.handler.name()))
            .collect();
        assert_eq!(
            routed,
            vec![("journal/day-one.txt", "page"), ("wolf.jpg", "gallery")]
        );
        assert_eq!(walk.skipped, vec!["settings.toml"]);
    }

    #[test]
    fn unmatched_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "video.mov");
        let handlers = handlers();
        let walk = ContentWalker::new(tmp.path(), &handlers).walk().unwrap();
        assert!(walk.routed.is_empty());
        assert_eq!(walk.skipped, vec!["video.mov"]);
    }

    #[test]
    fn missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let handlers = handlers();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            ContentWalker::new(&missing, &handlers).walk(),
            Err(WalkError::Root { .. })
        ));
    }

    #[test]
    fn item_accessors() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "animals/IMG_4056.JPEG");
        let item = ContentItem::new(tmp.path(), &tmp.path().join("animals/IMG_4056.JPEG")).unwrap();
        assert_eq!(item.relative, "animals/IMG_4056.JPEG");
        assert_eq!(item.extension, "jpeg");
        assert_eq!(item.stem(), "IMG_4056");
        assert_eq!(item.dir(), "animals");
        assert!(item.modified.is_some());
    }
}
