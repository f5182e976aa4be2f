//! # Gallerist
//!
//! A plugin-driven static site and photo gallery generator. A site is a
//! directory with a `site.toml`, a `content/` tree of images and markdown
//! pages, and a `templates/` directory of stylesheets and fragments.
//!
//! # Architecture: Registry, Pipeline, Orchestrator
//!
//! ```text
//! gallerist <command>
//!     │
//!     ▼
//! Registry ── command units ──▶ dispatch
//!                                  │ build / watch / serve / ...
//!                                  ▼
//!                         BuildOrchestrator
//!                                  │
//!     ContentWalker ──▶ Handler::resolve_metadata ──▶ Handler::process ──▶ SiteModel
//!                        (embedded ⊕ sidecar ⊕ defaults)                      │
//!                                                                        Renderer
//! ```
//!
//! - The [`plugins`] registry is built once at startup from the built-in
//!   units and `*.toml` manifests, then shared read-only.
//! - Every content item goes to the first [`handlers`] entry that claims it.
//!   Its metadata is layered: embedded EXIF/IPTC ([`extractor`]), then
//!   sidecar overrides ([`sidecar`]), then filename/mtime defaults.
//! - The [`orchestrator`] collects handler output into a [`model::SiteModel`]
//!   keyed by output path, rejects collisions, derives directory indexes, and
//!   only then hands the model to a [`render::Renderer`].
//! - [`watch`] turns filesystem events into debounced change sets that drive
//!   incremental builds equal to a full build of the same inputs.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`commands`] | Command context, dispatch, and the built-in commands |
//! | [`plugins`] | Plugin units, kinds, manifest discovery, the registry |
//! | [`config`] | `site.toml` loading, merging over stock defaults, validation |
//! | [`content`] | Content tree walk and handler routing |
//! | [`handlers`] | The handler trait; gallery, page and external handlers |
//! | [`extractor`] | Embedded EXIF/IPTC metadata from JPEG, TIFF, PNG, WebP |
//! | [`sidecar`] | `.toml` / `.txt` sidecar overrides |
//! | [`metadata`] | Metadata records, timestamps, merge and defaults |
//! | [`naming`] | `NNN-name` filename convention and slugs |
//! | [`model`] | Site nodes, the site model, derived indexes |
//! | [`orchestrator`] | Full and incremental builds, the build report |
//! | [`render`] | Renderer trait, HTML renderer, template set, render manifest |
//! | [`watch`] | Change sets, filesystem subscription, the rebuild loop |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Sidecars Always Win
//!
//! A field set in a sidecar replaces the embedded value, whatever the order
//! the sources were read in. Authors fix a wrong camera clock or a missing
//! title without touching the image file.
//!
//! ## Derived Indexes Are Not Handler Output
//!
//! Directory listings are computed from the item nodes after processing, and
//! recomputed from scratch on every build. An incremental build only has to
//! decide which items to reprocess; the indexes come out the same either way.
//!
//! ## A Failed Build Changes Nothing
//!
//! Output path collisions and render failures leave the previous model (and,
//! for collisions, the previous output) in place. Per-item errors do not fail
//! the build: the item is reported and built from whatever metadata resolved.

pub mod commands;
pub mod config;
pub mod content;
pub mod extractor;
pub mod handlers;
pub mod metadata;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod output;
pub mod plugins;
pub mod render;
pub mod sidecar;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
