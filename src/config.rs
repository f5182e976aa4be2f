//! Site configuration module.
//!
//! Handles loading, validating and merging `site.toml`. The file lives at the
//! site root and is layered over stock defaults: user files only need the
//! values they want to change.
//!
//! ## Site Layout
//!
//! ```text
//! my-site/
//! ├── site.toml          # This file (optional)
//! ├── content/           # Images, pages, sidecars
//! ├── templates/         # Stylesheets inlined into every page
//! ├── plugins/           # Plugin manifests (*.toml)
//! └── dist/              # Build output
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! title = "Gallery"
//!
//! [paths]
//! content = "content"
//! templates = "templates"
//! output = "dist"
//! plugins = "plugins"
//!
//! [build]
//! strict = false            # Per-item errors fail the build
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [watch]
//! debounce_ms = 250
//! ignore = []               # Path substrings to ignore
//!
//! [handlers.gallery]
//! extensions = ["jpg", "jpeg", "png", "tif", "tiff", "webp"]
//!
//! [handlers.page]
//! extensions = ["md", "markdown"]
//!
//! [publish]
//! command = []              # e.g. ["rsync", "-a", "{output}/", "host:/srv/www/"]
//!
//! [documentation]
//! source = "docs"
//! output = "dist-docs"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file at the site root.
pub const CONFIG_FILENAME: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `site.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub site: SiteSection,
    /// Directory layout, relative to the site root.
    pub paths: PathsConfig,
    pub build: BuildConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    pub watch: WatchConfig,
    /// Per-handler options.
    pub handlers: HandlersConfig,
    pub publish: PublishConfig,
    pub documentation: DocumentationConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("paths.content", &self.paths.content),
            ("paths.templates", &self.paths.templates),
            ("paths.output", &self.paths.output),
            ("paths.plugins", &self.paths.plugins),
        ];
        for (key, value) in paths {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.paths.output == self.paths.content || self.paths.output == self.paths.templates {
            return Err(ConfigError::Validation(
                "paths.output must differ from paths.content and paths.templates".into(),
            ));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be non-zero".into(),
            ));
        }
        if self.handlers.gallery.extensions.is_empty() && self.handlers.page.extensions.is_empty()
        {
            return Err(ConfigError::Validation(
                "at least one of handlers.gallery.extensions, handlers.page.extensions must be set"
                    .into(),
            ));
        }
        for ext in self
            .handlers
            .gallery
            .extensions
            .iter()
            .chain(&self.handlers.page.extensions)
        {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(ConfigError::Validation(format!(
                    "handler extension `{ext}` must be non-empty and given without a dot"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    /// Shown in page titles and the root index heading.
    pub title: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            title: "Gallery".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub content: String,
    pub templates: String,
    pub output: String,
    pub plugins: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content: "content".to_string(),
            templates: "templates".to_string(),
            output: "dist".to_string(),
            plugins: "plugins".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Treat per-item errors as failures (non-zero exit status).
    pub strict: bool,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel handler workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Events within this window are coalesced into one change set.
    pub debounce_ms: u64,
    /// Changed paths containing any of these substrings are ignored.
    pub ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlersConfig {
    pub gallery: HandlerOptions,
    pub page: HandlerOptions,
}

impl HandlersConfig {
    fn stock() -> Self {
        Self {
            gallery: HandlerOptions::with(&["jpg", "jpeg", "png", "tif", "tiff", "webp"]),
            page: HandlerOptions::with(&["md", "markdown"]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerOptions {
    /// File extensions (lowercase, no dot) this handler claims.
    pub extensions: Vec<String>,
}

impl HandlerOptions {
    fn with(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn claims(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Program and arguments; `{output}` is replaced by the output directory.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentationConfig {
    pub source: String,
    pub output: String,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            source: "docs".to_string(),
            output: "dist-docs".to_string(),
        }
    }
}

/// Absolute locations of everything a build touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub content: PathBuf,
    pub templates: PathBuf,
    pub output: PathBuf,
    pub plugins: PathBuf,
    pub config_file: PathBuf,
}

impl SitePaths {
    /// Resolve the configured directories against the site root.
    pub fn resolve(root: &Path, config: &SiteConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            content: root.join(&config.paths.content),
            templates: root.join(&config.paths.templates),
            output: root.join(&config.paths.output),
            plugins: root.join(&config.paths.plugins),
            config_file: root.join(CONFIG_FILENAME),
        }
    }

    /// The same site with a different content source and output directory.
    pub fn with_content(&self, content: &str, output: &str) -> Self {
        Self {
            content: self.root.join(content),
            output: self.root.join(output),
            ..self.clone()
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// The stock configuration: [`SiteConfig::default`] with the built-in
/// handler extension tables filled in.
pub fn stock_config() -> SiteConfig {
    SiteConfig {
        handlers: HandlersConfig::stock(),
        ..SiteConfig::default()
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(stock_config())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `site.toml` from the site root as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `site.toml` in the given site root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stock_config_has_handler_extensions() {
        let config = stock_config();
        assert!(config.handlers.gallery.claims("JPG"));
        assert!(config.handlers.page.claims("md"));
        assert!(!config.handlers.page.claims("jpg"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_config_returns_stock_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, stock_config());
        assert_eq!(config.paths.content, "content");
        assert_eq!(config.watch.debounce_ms, 250);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
[site]
title = "Field Notes"

[handlers.page]
extensions = ["md"]
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.site.title, "Field Notes");
        assert_eq!(config.handlers.page.extensions, vec!["md"]);
        // Sibling table untouched by the overlay
        assert!(config.handlers.gallery.claims("webp"));
        assert_eq!(config.paths.output, "dist");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[paths]\ncontnet = \"x\"\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn output_equal_to_content_is_invalid() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[paths]\noutput = \"content\"\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn zero_debounce_is_invalid() {
        let mut config = stock_config();
        config.watch.debounce_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn dotted_extension_is_invalid() {
        let mut config = stock_config();
        config.handlers.gallery.extensions = vec![".jpg".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
        assert_eq!(merged["b"]["z"].as_integer(), Some(4));
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 16),
        };
        assert_eq!(effective_threads(&config), cores);
        let one = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&one), 1);
    }

    #[test]
    fn site_paths_resolve_against_root() {
        let paths = SitePaths::resolve(Path::new("/srv/site"), &stock_config());
        assert_eq!(paths.content, Path::new("/srv/site/content"));
        assert_eq!(paths.output, Path::new("/srv/site/dist"));
        assert_eq!(paths.config_file, Path::new("/srv/site/site.toml"));

        let docs = paths.with_content("docs", "dist-docs");
        assert_eq!(docs.content, Path::new("/srv/site/docs"));
        assert_eq!(docs.templates, paths.templates);
    }
}
