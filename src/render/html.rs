//! HTML output with maud.
//!
//! Every node becomes one file. Links are relative, so the output directory
//! works from any URL prefix or straight off the filesystem.

use super::manifest::{RenderManifest, hash_bytes};
use super::{RenderError, Renderer, TemplateSet};
use crate::metadata::{self, MetadataRecord, MetadataValue};
use crate::model::{ListingEntry, NodeKind, SiteModel, SiteNode};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct HtmlRenderer {
    output_dir: PathBuf,
    content_dir: PathBuf,
    site_title: String,
}

impl HtmlRenderer {
    pub fn new(output_dir: &Path, content_dir: &Path, site_title: &str) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            content_dir: content_dir.to_path_buf(),
            site_title: site_title.to_string(),
        }
    }

    fn node_bytes(&self, node: &SiteNode, templates: &TemplateSet) -> Result<Vec<u8>, RenderError> {
        let markup = match &node.kind {
            NodeKind::Asset => {
                let source = node.source.as_deref().unwrap_or(&node.output_path);
                let path = self.content_dir.join(source);
                return fs::read(&path).map_err(|source| RenderError::Asset { path, source });
            }
            NodeKind::External { content } => return Ok(content.clone().into_bytes()),
            NodeKind::GalleryEntry { image } => self.gallery_entry(node, image, templates),
            NodeKind::Page { html, listing } => self.page(node, html, listing.as_deref(), templates),
            NodeKind::Index { listing } => self.index(node, listing, templates),
        };
        Ok(markup.into_string().into_bytes())
    }

    fn document(&self, node: &SiteNode, templates: &TemplateSet, content: Markup) -> Markup {
        let root = relative_root(&node.output_path);
        let title = match node.title() {
            Some(t) if !t.is_empty() => format!("{t} · {}", self.site_title),
            _ => self.site_title.clone(),
        };
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="UTF-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (title) }
                    style { (PreEscaped(templates.stylesheet())) }
                    @if let Some(head) = templates.get("head.html") {
                        (PreEscaped(head))
                    }
                }
                body {
                    header.site-header {
                        a href={ (root) "index.html" } { (self.site_title) }
                    }
                    main { (content) }
                    @let footer: Vec<&str> = templates.footer().collect();
                    @if !footer.is_empty() {
                        footer.site-footer {
                            @for fragment in footer {
                                (PreEscaped(fragment))
                            }
                        }
                    }
                }
            }
        }
    }

    fn gallery_entry(&self, node: &SiteNode, image: &str, templates: &TemplateSet) -> Markup {
        let root = relative_root(&node.output_path);
        let record = &node.metadata;
        let title = record.title().unwrap_or_default();
        let content = html! {
            figure.gallery-entry {
                img src={ (root) (image) } alt=(title);
                figcaption {
                    h1 { (title) }
                    @if let Some(description) = record.description() {
                        p.description { (description) }
                    }
                    (details(record, templates))
                }
            }
        };
        self.document(node, templates, content)
    }

    fn page(
        &self,
        node: &SiteNode,
        body: &str,
        listing: Option<&[ListingEntry]>,
        templates: &TemplateSet,
    ) -> Markup {
        let root = relative_root(&node.output_path);
        let content = html! {
            article.page { (PreEscaped(body)) }
            @if let Some(listing) = listing {
                (listing_markup(listing, &root, templates))
            }
        };
        self.document(node, templates, content)
    }

    fn index(&self, node: &SiteNode, listing: &[ListingEntry], templates: &TemplateSet) -> Markup {
        let root = relative_root(&node.output_path);
        let heading = node.title().unwrap_or(&self.site_title);
        let content = html! {
            h1 { (heading) }
            (listing_markup(listing, &root, templates))
        };
        self.document(node, templates, content)
    }
}

impl Renderer for HtmlRenderer {
    /// Every node is rendered in memory before the output directory is
    /// touched, so a node that fails to render leaves the previous output as
    /// it was.
    fn render(&self, model: &SiteModel, templates: &TemplateSet) -> Result<(), RenderError> {
        let rendered = model
            .nodes()
            .map(|node| {
                let bytes = self.node_bytes(node, templates)?;
                let hash = hash_bytes(&bytes);
                Ok((node.output_path.as_str(), bytes, hash))
            })
            .collect::<Result<Vec<_>, RenderError>>()?;

        fs::create_dir_all(&self.output_dir)?;
        let previous = RenderManifest::load(&self.output_dir);
        let mut next = RenderManifest::empty();
        let (mut written, mut unchanged) = (0usize, 0usize);

        for (output_path, bytes, hash) in rendered {
            let target = self.output_dir.join(output_path);
            if previous.is_current(output_path, &hash) && target.is_file() {
                unchanged += 1;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, &bytes)?;
                debug!(path = output_path, "wrote");
                written += 1;
            }
            next.insert(output_path.to_string(), hash);
        }

        let stale = previous.stale_paths(&next);
        for path in &stale {
            remove_output(&self.output_dir, path)?;
        }
        next.save(&self.output_dir)?;

        info!(written, unchanged, removed = stale.len(), "rendered site");
        Ok(())
    }
}

/// `../` once per directory level of `output_path`.
fn relative_root(output_path: &str) -> String {
    "../".repeat(output_path.matches('/').count())
}

fn details(record: &MetadataRecord, templates: &TemplateSet) -> Markup {
    let camera = [metadata::CAMERA_MAKE, metadata::CAMERA_MODEL]
        .iter()
        .filter_map(|k| record.get(k).and_then(MetadataValue::as_text))
        .collect::<Vec<_>>()
        .join(" ");
    let lens = record.get(metadata::LENS).and_then(MetadataValue::as_text);
    let location = record
        .get(metadata::LATITUDE)
        .and_then(MetadataValue::as_float)
        .zip(record.get(metadata::LONGITUDE).and_then(MetadataValue::as_float));

    html! {
        dl.details {
            @if let Some(date) = record.date() {
                dt { "Date" }
                dd { time datetime=(date.canonical()) { (templates.format_date(date)) } }
            }
            @if !camera.is_empty() {
                dt { "Camera" }
                dd { (camera) }
            }
            @if let Some(lens) = lens {
                dt { "Lens" }
                dd { (lens) }
            }
            @if let Some((lat, lon)) = location {
                dt { "Location" }
                dd { (format!("{lat:.5}, {lon:.5}")) }
            }
            @if !record.keywords().is_empty() {
                dt { "Keywords" }
                dd { (record.keywords().join(", ")) }
            }
        }
    }
}

fn listing_markup(listing: &[ListingEntry], root: &str, templates: &TemplateSet) -> Markup {
    html! {
        ul.listing {
            @for entry in listing {
                li {
                    a href={ (root) (entry.href) } {
                        @if let Some(thumbnail) = &entry.thumbnail {
                            img src={ (root) (thumbnail) } alt=(entry.title) loading="lazy";
                        }
                        span.title { (entry.title) }
                        @if let Some(date) = &entry.date {
                            time datetime=(date.canonical()) { (templates.format_date(date)) }
                        }
                    }
                }
            }
        }
    }
}

/// Delete a rendered file, then any directories it leaves empty.
fn remove_output(output_dir: &Path, rel: &str) -> io::Result<()> {
    let path = output_dir.join(rel);
    match fs::remove_file(&path) {
        Ok(()) => debug!(path = rel, "removed stale output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == output_dir || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
    Ok(())
}
