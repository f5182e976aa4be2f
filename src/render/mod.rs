//! Rendering a finished site model to disk.
//!
//! The build core hands a completed, read-only [`SiteModel`] and a
//! [`TemplateSet`] to a [`Renderer`]. The stock [`HtmlRenderer`] writes HTML
//! with maud; [`NullRenderer`] writes nothing and backs the `tests` command.
//!
//! ## Templates
//!
//! The templates root holds text fragments, read once per render:
//!
//! | File | Use |
//! |------|-----|
//! | `*.css` | inlined into every page's `<style>`, in file-name order |
//! | `head.html` | appended to `<head>` |
//! | `footer.html` | first fragment of the page footer |
//!
//! ## Template helpers
//!
//! Helper units from the registry run once per render: the built-in `date`
//! helper formats `date` fields for display; an external helper program gets
//! the model as JSON on stdin and its stdout is added to every page footer.

mod html;
mod manifest;

pub use html::HtmlRenderer;
pub use manifest::{RenderManifest, hash_bytes};

use crate::metadata::Timestamp;
use crate::model::SiteModel;
use crate::plugins::{self, BuiltinHelper, EntryPoint, PluginUnit};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot read templates from {}: {source}", path.display())]
    Templates {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read asset {}: {source}", path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template helper `{name}` failed: {message}")]
    Helper { name: String, message: String },
}

/// Turns a completed model into output files.
pub trait Renderer {
    fn render(&self, model: &SiteModel, templates: &TemplateSet) -> Result<(), RenderError>;
}

/// Renders nothing. Builds still run every handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&self, model: &SiteModel, _templates: &TemplateSet) -> Result<(), RenderError> {
        debug!(nodes = model.len(), "null render");
        Ok(())
    }
}

/// Template fragments plus helper output for one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
    /// File name → contents, text files only.
    files: BTreeMap<String, String>,
    /// Fragments appended to every page footer.
    footer: Vec<String>,
    builtin_helpers: Vec<BuiltinHelper>,
}

impl TemplateSet {
    /// Read the text files at the top of `dir`. A missing directory is an
    /// empty set.
    pub fn load(dir: &Path) -> Result<Self, RenderError> {
        let mut set = Self::default();
        if !dir.is_dir() {
            return Ok(set);
        }
        let templates_err = |source| RenderError::Templates {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(templates_err)? {
            let path = entry.map_err(templates_err)?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || name.starts_with('.') {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(text) => {
                    set.files.insert(name.to_string(), text);
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    debug!(file = name, "skipping binary template file");
                }
                Err(source) => return Err(RenderError::Templates { path, source }),
            }
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// All stylesheets, concatenated in file-name order.
    pub fn stylesheet(&self) -> String {
        self.files
            .iter()
            .filter(|(name, _)| name.ends_with(".css"))
            .map(|(_, css)| css.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn footer(&self) -> impl Iterator<Item = &str> {
        self.get("footer.html")
            .into_iter()
            .chain(self.footer.iter().map(String::as_str))
    }

    /// Run template helpers against the model.
    pub fn apply_helpers<'a>(
        &mut self,
        helpers: impl IntoIterator<Item = &'a PluginUnit>,
        model: &SiteModel,
    ) -> Result<(), RenderError> {
        let mut model_json = None;
        for unit in helpers {
            match &unit.entry_point {
                EntryPoint::Helper(helper) => self.builtin_helpers.push(*helper),
                EntryPoint::Executable { program, .. } => {
                    if model_json.is_none() {
                        model_json = Some(serde_json::to_vec(model)?);
                    }
                    let json = model_json.as_deref().unwrap_or_default();
                    let fragment = run_helper(&unit.name, program, json)?;
                    if !fragment.trim().is_empty() {
                        self.footer.push(fragment);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Display form of a date, through the `date` helper when it is active.
    pub fn format_date(&self, ts: &Timestamp) -> String {
        if self.builtin_helpers.contains(&BuiltinHelper::Date) {
            ts.display_date()
        } else {
            ts.canonical()
        }
    }
}

fn run_helper(name: &str, program: &Path, input: &[u8]) -> Result<String, RenderError> {
    let failed = |message: String| RenderError::Helper {
        name: name.to_string(),
        message,
    };
    debug!(helper = name, program = %program.display(), "running template helper");
    let output = plugins::run_with_input(&mut Command::new(program), input)
        .map_err(|e| failed(e.to_string()))?;
    if !output.status.success() {
        return Err(failed(format!(
            "{} ({})",
            String::from_utf8_lossy(&output.stderr).trim(),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
