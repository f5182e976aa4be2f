//! Full and incremental builds.
//!
//! ```text
//! Idle → Walking → Processing → Rendering → Done
//!           └──────────┴────────────┴──────→ Failed
//! ```
//!
//! A build walks the content root, resolves and processes every routed item
//! on a rayon pool, collects the nodes into a fresh [`SiteModel`] in walk
//! order, derives directory indexes, then hands the finished model to the
//! renderer. The previous model is only replaced once all of that succeeded,
//! so a failed build never leaves a half-built model behind.
//!
//! ## Per-item vs build-level failures
//!
//! Metadata, sidecar and handler errors are recorded as [`ItemError`]s in the
//! [`BuildReport`]; the item is skipped or built from partial metadata and the
//! build carries on. Only an output path collision, an unreadable content
//! root, or a render failure end the build in `Failed`.
//!
//! ## Incremental builds
//!
//! Given a [`ChangeSet`], items are reprocessed when they are affected:
//!
//! | Changed path | Affected items |
//! |--------------|----------------|
//! | anything under the templates root, or `site.toml` | all |
//! | a content item | that item |
//! | a sidecar (`x.toml`, `x.txt`) | the items it belongs to |
//! | a directory, or a path that no longer exists | every item under it |
//!
//! Items that are new since the last build, or had no nodes in it, are
//! processed as well. Everything else keeps its nodes from the previous
//! model. Indexes are re-derived from scratch, so the result equals what a
//! full build of the same inputs produces.

use crate::config::{SiteConfig, SitePaths, effective_threads};
use crate::content::{ContentWalker, Routed, WalkError, relative_key};
use crate::handlers::{HandlerSet, Issue};
use crate::metadata;
use crate::model::{OutputPathCollisionError, SiteModel, SiteNode};
use crate::plugins::{PluginKind, PluginUnit, Registry};
use crate::render::{RenderError, Renderer, TemplateSet};
use crate::sidecar;
use crate::watch::ChangeSet;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Collision(#[from] OutputPathCollisionError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Walking,
    Processing,
    Rendering,
    Done,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildState::Idle => "idle",
            BuildState::Walking => "walking",
            BuildState::Processing => "processing",
            BuildState::Rendering => "rendering",
            BuildState::Done => "done",
            BuildState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    Metadata,
    Sidecar,
    Handler,
}

impl fmt::Display for ItemErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemErrorKind::Metadata => "metadata",
            ItemErrorKind::Sidecar => "sidecar",
            ItemErrorKind::Handler => "handler",
        })
    }
}

/// A per-item problem that did not stop the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Content-relative path of the item.
    pub path: String,
    pub kind: ItemErrorKind,
    pub message: String,
}

impl ItemError {
    fn from_issue(path: &str, issue: &Issue) -> Self {
        let kind = match issue {
            Issue::Metadata(_) => ItemErrorKind::Metadata,
            Issue::Sidecar(_) => ItemErrorKind::Sidecar,
        };
        Self {
            path: path.to_string(),
            kind,
            message: issue.to_string(),
        }
    }
}

/// What one build did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Items run through their handler this build.
    pub processed: usize,
    /// Items whose nodes were carried over from the previous model.
    pub retained: usize,
    /// Files no handler claimed.
    pub skipped: Vec<String>,
    pub errors: Vec<ItemError>,
    /// Nodes in the finished model.
    pub nodes: usize,
    pub incremental: bool,
}

impl BuildReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Result of processing one routed item.
struct Outcome {
    relative: String,
    nodes: Vec<SiteNode>,
    errors: Vec<ItemError>,
}

pub struct BuildOrchestrator {
    paths: SitePaths,
    handlers: HandlerSet,
    helpers: Vec<PluginUnit>,
    renderer: Box<dyn Renderer + Send + Sync>,
    pool: rayon::ThreadPool,
    model: Option<SiteModel>,
    state: BuildState,
}

impl BuildOrchestrator {
    pub fn new(
        paths: SitePaths,
        config: &SiteConfig,
        registry: &Registry,
        renderer: Box<dyn Renderer + Send + Sync>,
    ) -> Result<Self, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_threads(&config.processing))
            .build()?;
        Ok(Self {
            paths,
            handlers: HandlerSet::from_registry(registry, config),
            helpers: registry
                .plugins(PluginKind::TemplateHelper)
                .values()
                .cloned()
                .collect(),
            renderer,
            pool,
            model: None,
            state: BuildState::Idle,
        })
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// The model of the last successful build.
    pub fn model(&self) -> Option<&SiteModel> {
        self.model.as_ref()
    }

    pub fn paths(&self) -> &SitePaths {
        &self.paths
    }

    /// Process every content item.
    pub fn full_build(&mut self) -> Result<BuildReport, BuildError> {
        info!(content = %self.paths.content.display(), "full build");
        let result = self.run(None);
        self.finish(result)
    }

    /// Reprocess only what `changes` affects. Falls back to a full build
    /// when there is no previous model.
    pub fn incremental_build(&mut self, changes: &ChangeSet) -> Result<BuildReport, BuildError> {
        if self.model.is_none() {
            return self.full_build();
        }
        info!(changed = changes.len(), "incremental build");
        let result = self.run(Some(changes));
        self.finish(result)
    }

    fn finish(
        &mut self,
        result: Result<(SiteModel, BuildReport), BuildError>,
    ) -> Result<BuildReport, BuildError> {
        match result {
            Ok((model, report)) => {
                self.model = Some(model);
                self.transition(BuildState::Done);
                Ok(report)
            }
            Err(e) => {
                self.transition(BuildState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: BuildState) {
        debug!(from = %self.state, to = %next, "build state");
        self.state = next;
    }

    fn run(&mut self, changes: Option<&ChangeSet>) -> Result<(SiteModel, BuildReport), BuildError> {
        self.transition(BuildState::Walking);
        let walk = ContentWalker::new(&self.paths.content, &self.handlers).walk()?;

        self.transition(BuildState::Processing);
        let previous = match changes {
            Some(changes) => self.model.as_ref().map(|m| (m, changes)),
            None => None,
        };
        let (mut model, to_process, retained) = match previous {
            Some((previous, changes)) => {
                let affected = self.affected(changes, &walk.routed);
                carry_over(previous, &walk.routed, &affected)
            }
            None => (SiteModel::new(), walk.routed.iter().collect(), 0),
        };

        let outcomes: Vec<Outcome> = self
            .pool
            .install(|| to_process.par_iter().map(|routed| process_item(routed)).collect());

        let mut report = BuildReport {
            processed: to_process.len(),
            retained,
            skipped: walk.skipped,
            incremental: changes.is_some(),
            ..BuildReport::default()
        };
        for outcome in outcomes {
            for node in outcome.nodes {
                model.insert(node)?;
            }
            if !outcome.errors.is_empty() {
                debug!(item = %outcome.relative, errors = outcome.errors.len(), "item errors");
            }
            report.errors.extend(outcome.errors);
        }
        model.derive_indexes()?;
        report.nodes = model.len();

        self.transition(BuildState::Rendering);
        let mut templates = TemplateSet::load(&self.paths.templates)?;
        templates.apply_helpers(&self.helpers, &model)?;
        self.renderer.render(&model, &templates)?;

        info!(
            processed = report.processed,
            retained = report.retained,
            errors = report.errors.len(),
            nodes = report.nodes,
            "build complete"
        );
        Ok((model, report))
    }

    /// Content-relative paths of walked items a change set affects.
    fn affected(&self, changes: &ChangeSet, routed: &[Routed]) -> BTreeSet<String> {
        let all = || routed.iter().map(|r| r.item.relative.clone()).collect();
        let mut affected = BTreeSet::new();

        for path in changes.paths() {
            if path == self.paths.config_file.as_path() || path.starts_with(&self.paths.templates) {
                debug!(path = %path.display(), "shared input changed, reprocessing everything");
                return all();
            }
            if path.starts_with(&self.paths.output) {
                continue;
            }
            let Some(rel) = relative_key(&self.paths.content, path) else {
                continue;
            };
            if rel.is_empty() {
                return all();
            }

            let prefix = format!("{rel}/");
            let is_sidecar = sidecar::has_sidecar_extension(path);
            for r in routed {
                let item = &r.item;
                let hit = item.relative == rel
                    || item.relative.starts_with(&prefix)
                    || (is_sidecar && sidecar::sidecar_paths(&item.path).iter().any(|p| p == path));
                if hit {
                    affected.insert(item.relative.clone());
                }
            }
        }
        affected
    }
}

/// Start from the previous model: keep nodes of unaffected items that still
/// exist, and list what must be processed.
fn carry_over<'a>(
    previous: &SiteModel,
    routed: &'a [Routed],
    affected: &BTreeSet<String>,
) -> (SiteModel, Vec<&'a Routed>, usize) {
    let mut model = previous.clone();
    model.strip_derived();

    let present: BTreeSet<&str> = routed.iter().map(|r| r.item.relative.as_str()).collect();
    let stale: Vec<String> = model
        .sources()
        .into_iter()
        .filter(|s| !present.contains(s) || affected.contains(*s))
        .map(str::to_string)
        .collect();
    for source in &stale {
        model.remove_source(source);
    }

    let kept = model.sources();
    let to_process: Vec<&Routed> = routed
        .iter()
        .filter(|r| !kept.contains(r.item.relative.as_str()))
        .collect();
    let retained = kept.len();
    (model, to_process, retained)
}

/// Resolve, default and process one item. Never fails: problems become
/// [`ItemError`]s in the outcome.
fn process_item(routed: &Routed) -> Outcome {
    let item = &routed.item;
    let resolved = routed.handler.resolve_metadata(item);
    let mut errors: Vec<ItemError> = resolved
        .issues
        .iter()
        .map(|issue| ItemError::from_issue(&item.relative, issue))
        .collect();
    let record = metadata::with_defaults(resolved.record, item.stem(), item.modified);

    let nodes = match routed.handler.process(item, &record) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!(item = %item.relative, handler = routed.handler.name(), error = %e, "handler failed");
            errors.push(ItemError {
                path: item.relative.clone(),
                kind: ItemErrorKind::Handler,
                message: e.to_string(),
            });
            Vec::new()
        }
    };

    Outcome {
        relative: item.relative.clone(),
        nodes,
        errors,
    }
}
