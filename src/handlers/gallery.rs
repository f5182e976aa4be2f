//! Images: embedded metadata, sidecar overrides, one page plus the original.

use super::{Handler, HandlerError, Issue, Resolved};
use crate::config::HandlerOptions;
use crate::content::ContentItem;
use crate::extractor;
use crate::metadata::{self, MetadataRecord};
use crate::model::{NodeKind, SiteNode, join_output};
use crate::sidecar;
use tracing::warn;

pub struct GalleryHandler {
    options: HandlerOptions,
}

impl GalleryHandler {
    pub fn new(options: HandlerOptions) -> Self {
        Self { options }
    }
}

impl Handler for GalleryHandler {
    fn name(&self) -> &str {
        "gallery"
    }

    fn matches(&self, item: &ContentItem) -> bool {
        self.options.claims(&item.extension)
    }

    /// Embedded metadata overridden by sidecars.
    ///
    /// Either source failing degrades to "absent" for that source; the item
    /// still builds.
    fn resolve_metadata(&self, item: &ContentItem) -> Resolved {
        let mut issues = Vec::new();

        let extracted = extractor::extract(&item.path).unwrap_or_else(|e| {
            warn!(item = %item.relative, error = %e, "unreadable embedded metadata");
            issues.push(Issue::from(e));
            MetadataRecord::new()
        });
        let overrides = sidecar::resolve(&item.path).unwrap_or_else(|e| {
            warn!(item = %item.relative, error = %e, "ignoring sidecar");
            issues.push(Issue::from(e));
            None
        });

        Resolved {
            record: metadata::merge(extracted, overrides),
            issues,
        }
    }

    fn process(
        &self,
        item: &ContentItem,
        metadata: &MetadataRecord,
    ) -> Result<Vec<SiteNode>, HandlerError> {
        let page = SiteNode {
            output_path: join_output(item.dir(), &format!("{}/index.html", item.stem())),
            source: Some(item.relative.clone()),
            kind: NodeKind::GalleryEntry {
                image: item.relative.clone(),
            },
            metadata: metadata.clone(),
        };
        let asset = SiteNode {
            output_path: item.relative.clone(),
            source: Some(item.relative.clone()),
            kind: NodeKind::Asset,
            metadata: MetadataRecord::new(),
        };
        Ok(vec![page, asset])
    }
}
