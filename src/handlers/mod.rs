//! Content handlers.
//!
//! A [`Handler`] turns one content item plus its resolved metadata into site
//! nodes. Which handler gets an item is decided by a fixed priority list,
//! most specific first:
//!
//! 1. external handlers from plugin manifests, by name
//! 2. [`GalleryHandler`] (images)
//! 3. [`PageHandler`] (markdown)
//!
//! The first handler whose [`matches`](Handler::matches) returns true wins.
//!
//! Metadata resolution is split from processing so the orchestrator can apply
//! the default policy ([`metadata::with_defaults`](crate::metadata::with_defaults))
//! in one place. Recoverable metadata problems come back as [`Issue`]s next
//! to a best-effort record instead of failing the item.

mod external;
mod gallery;
mod page;

pub use external::ExternalHandler;
pub use gallery::GalleryHandler;
pub use page::PageHandler;

use crate::config::SiteConfig;
use crate::content::ContentItem;
use crate::extractor::MetadataParseError;
use crate::metadata::MetadataRecord;
use crate::model::SiteNode;
use crate::plugins::{BuiltinHandler, EntryPoint, PluginKind, Registry};
use crate::sidecar::SidecarParseError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("handler `{handler}` failed: {message}")]
    External { handler: String, message: String },
    #[error("handler `{handler}` produced invalid output: {source}")]
    ExternalOutput {
        handler: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("handler `{handler}` produced an invalid output path `{path}`")]
    OutputPath { handler: String, path: String },
}

/// A recoverable metadata problem found while resolving an item.
#[derive(Error, Debug)]
pub enum Issue {
    #[error(transparent)]
    Metadata(#[from] MetadataParseError),
    #[error(transparent)]
    Sidecar(#[from] SidecarParseError),
}

/// Metadata as far as it could be resolved, plus what went wrong on the way.
#[derive(Debug, Default)]
pub struct Resolved {
    pub record: MetadataRecord,
    pub issues: Vec<Issue>,
}

pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this handler claims the item.
    fn matches(&self, item: &ContentItem) -> bool;

    /// Gather the item's metadata from every source this handler knows.
    fn resolve_metadata(&self, _item: &ContentItem) -> Resolved {
        Resolved::default()
    }

    /// Produce the item's nodes from its final metadata.
    fn process(
        &self,
        item: &ContentItem,
        metadata: &MetadataRecord,
    ) -> Result<Vec<SiteNode>, HandlerError>;
}

/// Handlers in dispatch priority order.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerSet {
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self { handlers }
    }

    /// Instantiate every handler unit in the registry.
    pub fn from_registry(registry: &Registry, config: &SiteConfig) -> Self {
        let units = registry.plugins(PluginKind::Handler);
        let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();

        for unit in units.values() {
            if let EntryPoint::Executable {
                program,
                extensions,
            } = &unit.entry_point
            {
                handlers.push(Arc::new(ExternalHandler::new(
                    &unit.name,
                    program.clone(),
                    extensions.clone(),
                )));
            }
        }
        for builtin in [BuiltinHandler::Gallery, BuiltinHandler::Page] {
            let registered = units
                .values()
                .any(|u| u.entry_point == EntryPoint::Handler(builtin));
            if !registered {
                continue;
            }
            match builtin {
                BuiltinHandler::Gallery => handlers.push(Arc::new(GalleryHandler::new(
                    config.handlers.gallery.clone(),
                ))),
                BuiltinHandler::Page => {
                    handlers.push(Arc::new(PageHandler::new(config.handlers.page.clone())))
                }
            }
        }

        Self { handlers }
    }

    /// First handler claiming the item.
    pub fn select(&self, item: &ContentItem) -> Option<Arc<dyn Handler>> {
        self.handlers.iter().find(|h| h.matches(item)).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}
