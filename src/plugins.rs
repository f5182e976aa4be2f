//! Plugin registry.
//!
//! Every named operation gallerist knows about is a [`PluginUnit`] of one
//! extension-point [`PluginKind`]. The registry is built once at startup,
//! from the built-in units plus any manifests in the plugins directory, and
//! is read-only afterwards: it is shared through `Arc` by the command context
//! and the build workers without locking.
//!
//! ## Manifests
//!
//! External units are declared by `*.toml` files in the plugins directory:
//!
//! ```toml
//! name = "exif-dump"
//! kind = "handler"                 # command | handler | template-helper
//! entry_point = "bin/exif-dump"    # relative to the manifest
//! description = "Emit raw EXIF as JSON pages"
//! extensions = ["cr2", "nef"]      # handlers only
//! ```
//!
//! A name may appear once per kind. Redefining a built-in or another
//! manifest's name is a [`PluginLoadError::Duplicate`], never an override.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PluginLoadError {
    #[error("cannot read plugin directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed plugin manifest {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("duplicate {kind} plugin `{name}` in {}", path.display())]
    Duplicate {
        kind: PluginKind,
        name: String,
        path: PathBuf,
    },
    #[error("plugin manifest {}: entry point {} does not exist", path.display(), entry_point.display())]
    MissingEntryPoint { path: PathBuf, entry_point: PathBuf },
    #[error("invalid plugin manifest {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Extension point a unit plugs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    Command,
    Handler,
    TemplateHelper,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PluginKind::Command => "command",
            PluginKind::Handler => "handler",
            PluginKind::TemplateHelper => "template-helper",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    Add,
    Build,
    BuildDocumentation,
    Clean,
    Publish,
    Serve,
    Tests,
    Watch,
}

impl BuiltinCommand {
    pub const ALL: [BuiltinCommand; 8] = [
        BuiltinCommand::Add,
        BuiltinCommand::Build,
        BuiltinCommand::BuildDocumentation,
        BuiltinCommand::Clean,
        BuiltinCommand::Publish,
        BuiltinCommand::Serve,
        BuiltinCommand::Tests,
        BuiltinCommand::Watch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinCommand::Add => "add",
            BuiltinCommand::Build => "build",
            BuiltinCommand::BuildDocumentation => "build-documentation",
            BuiltinCommand::Clean => "clean",
            BuiltinCommand::Publish => "publish",
            BuiltinCommand::Serve => "serve",
            BuiltinCommand::Tests => "tests",
            BuiltinCommand::Watch => "watch",
        }
    }

    fn description(self) -> &'static str {
        match self {
            BuiltinCommand::Add => "Create a new page",
            BuiltinCommand::Build => "Build the site",
            BuiltinCommand::BuildDocumentation => "Build the documentation site",
            BuiltinCommand::Clean => "Remove the output directory",
            BuiltinCommand::Publish => "Build, then run the publish command",
            BuiltinCommand::Serve => "Build, watch and serve the output over HTTP",
            BuiltinCommand::Tests => "Check that every content item builds cleanly",
            BuiltinCommand::Watch => "Rebuild incrementally when content changes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinHandler {
    Gallery,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinHelper {
    /// Formats `date` fields for display.
    Date,
}

/// How a unit is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    Command(BuiltinCommand),
    Handler(BuiltinHandler),
    Helper(BuiltinHelper),
    /// An external program. `extensions` is only meaningful for handlers.
    Executable {
        program: PathBuf,
        extensions: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginUnit {
    pub name: String,
    pub kind: PluginKind,
    pub entry_point: EntryPoint,
    pub description: String,
}

impl PluginUnit {
    fn builtin(name: &str, kind: PluginKind, entry_point: EntryPoint, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            entry_point,
            description: description.to_string(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self.entry_point, EntryPoint::Executable { .. })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    name: String,
    kind: PluginKind,
    entry_point: PathBuf,
    #[serde(default)]
    description: String,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Name → unit, per kind.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: BTreeMap<String, PluginUnit>,
    handlers: BTreeMap<String, PluginUnit>,
    helpers: BTreeMap<String, PluginUnit>,
}

impl Registry {
    /// Only the units compiled into gallerist.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for command in BuiltinCommand::ALL {
            registry.slot(PluginKind::Command).insert(
                command.name().to_string(),
                PluginUnit::builtin(
                    command.name(),
                    PluginKind::Command,
                    EntryPoint::Command(command),
                    command.description(),
                ),
            );
        }
        let handlers = [
            (BuiltinHandler::Gallery, "gallery", "Images with EXIF/IPTC metadata and sidecars"),
            (BuiltinHandler::Page, "page", "Markdown pages with YAML front matter"),
        ];
        for (handler, name, description) in handlers {
            registry.slot(PluginKind::Handler).insert(
                name.to_string(),
                PluginUnit::builtin(name, PluginKind::Handler, EntryPoint::Handler(handler), description),
            );
        }
        registry.slot(PluginKind::TemplateHelper).insert(
            "date".to_string(),
            PluginUnit::builtin(
                "date",
                PluginKind::TemplateHelper,
                EntryPoint::Helper(BuiltinHelper::Date),
                "Format timestamps for display",
            ),
        );
        registry
    }

    /// Built-ins plus every manifest in `dir`.
    ///
    /// A missing directory (or `None`) yields the built-ins alone. Manifests
    /// are loaded in file-name order, so discovery is deterministic for a
    /// given directory snapshot.
    pub fn discover(dir: Option<&Path>) -> Result<Self, PluginLoadError> {
        let mut registry = Self::builtin();
        let Some(dir) = dir else {
            return Ok(registry);
        };
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no plugin directory");
            return Ok(registry);
        }

        let io_err = |source| PluginLoadError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut manifests = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "toml") {
                manifests.push(path);
            }
        }
        manifests.sort();

        for path in manifests {
            let unit = load_manifest(&path)?;
            info!(name = %unit.name, kind = %unit.kind, "discovered plugin");
            registry.register(unit, &path)?;
        }
        Ok(registry)
    }

    /// Add a unit, rejecting a name already taken within its kind.
    pub fn register(&mut self, unit: PluginUnit, origin: &Path) -> Result<(), PluginLoadError> {
        let slot = self.slot(unit.kind);
        if slot.contains_key(&unit.name) {
            return Err(PluginLoadError::Duplicate {
                kind: unit.kind,
                name: unit.name,
                path: origin.to_path_buf(),
            });
        }
        slot.insert(unit.name.clone(), unit);
        Ok(())
    }

    /// Every unit of one kind, by name.
    pub fn plugins(&self, kind: PluginKind) -> &BTreeMap<String, PluginUnit> {
        match kind {
            PluginKind::Command => &self.commands,
            PluginKind::Handler => &self.handlers,
            PluginKind::TemplateHelper => &self.helpers,
        }
    }

    pub fn get(&self, kind: PluginKind, name: &str) -> Option<&PluginUnit> {
        self.plugins(kind).get(name)
    }

    fn slot(&mut self, kind: PluginKind) -> &mut BTreeMap<String, PluginUnit> {
        match kind {
            PluginKind::Command => &mut self.commands,
            PluginKind::Handler => &mut self.handlers,
            PluginKind::TemplateHelper => &mut self.helpers,
        }
    }
}

fn load_manifest(path: &Path) -> Result<PluginUnit, PluginLoadError> {
    let source = fs::read_to_string(path).map_err(|source| PluginLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: Manifest = toml::from_str(&source).map_err(|source| PluginLoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |reason: &str| PluginLoadError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let name = manifest.name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(invalid("name must be a non-empty word"));
    }
    match manifest.kind {
        PluginKind::Handler if manifest.extensions.is_empty() => {
            return Err(invalid("handlers must declare at least one extension"));
        }
        PluginKind::Command | PluginKind::TemplateHelper if !manifest.extensions.is_empty() => {
            return Err(invalid("only handlers take extensions"));
        }
        _ => {}
    }

    let base = path.parent().unwrap_or(Path::new("."));
    let program = base.join(&manifest.entry_point);
    if !program.is_file() {
        return Err(PluginLoadError::MissingEntryPoint {
            path: path.to_path_buf(),
            entry_point: program,
        });
    }

    Ok(PluginUnit {
        name: name.to_string(),
        kind: manifest.kind,
        entry_point: EntryPoint::Executable {
            program,
            extensions: manifest
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        },
        description: manifest.description,
    })
}

/// Run an external unit's program with `input` on stdin, collecting stdout
/// and stderr.
///
/// Stdin is fed from a separate thread while the output pipes drain, so a
/// program that writes before it has read all of its input cannot stall on a
/// full pipe. A program that exits without reading its input closes the
/// pipe; its exit status is what counts.
pub fn run_with_input(command: &mut Command, input: &[u8]) -> io::Result<Output> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdin = child.stdin.take();
    thread::scope(|scope| {
        if let Some(mut stdin) = stdin {
            scope.spawn(move || {
                if let Err(e) = stdin.write_all(input) {
                    debug!(error = %e, "stdin closed early");
                }
            });
        }
        child.wait_with_output()
    })
}
