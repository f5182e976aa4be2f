//! Command dispatch.
//!
//! A command name is looked up among the registry's `command` units and run
//! with a shared [`Context`]. Built-in commands parse their own trailing
//! arguments with clap; external command units are spawned as programs.
//!
//! | Command | What it does |
//! |---------|--------------|
//! | `add [--dir DIR] TITLE` | create `content/[DIR/]slug.md` with front matter |
//! | `build [--strict] [--list]` | full build and render |
//! | `build-documentation [--output DIR]` | build the docs site |
//! | `clean` | remove the output directory |
//! | `publish [--skip-build]` | build, then run `[publish].command` |
//! | `serve [--host H] [--port P]` | build, watch, and serve the output over HTTP |
//! | `tests` | build without rendering; fail on any item error |
//! | `watch [--debounce-ms N]` | full build, then rebuild on every change |
//!
//! Every failure a command returns reaches the caller as
//! [`DispatchError::Execution`] with the cause attached; the dispatcher
//! itself never swallows one.

mod add;
mod build;
mod clean;
mod external;
mod publish;
mod serve;
mod watch;

use crate::config::{SiteConfig, SitePaths};
use crate::orchestrator::{BuildError, BuildOrchestrator, BuildReport};
use crate::output;
use crate::plugins::{BuiltinCommand, EntryPoint, PluginKind, Registry};
use crate::render::{HtmlRenderer, Renderer};
use crate::watch::{ChangeSet, StopHandle, WatchError};
use clap::Parser;
use clap::error::ErrorKind;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown command `{name}`")]
    UnknownCommand { name: String, available: Vec<String> },
    #[error("command `{command}` failed: {source}")]
    Execution {
        command: String,
        #[source]
        source: CommandError,
    },
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Args(#[from] clap::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{} already exists", .0.display())]
    Exists(PathBuf),
    #[error("refusing to remove {}: {reason}", path.display())]
    Refused { path: PathBuf, reason: &'static str },
    #[error("cannot derive a file name from title `{0}`")]
    EmptySlug(String),
    #[error("no publish command configured (set [publish].command in site.toml)")]
    PublishNotConfigured,
    #[error("cannot run {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid listen address `{0}`")]
    Address(String),
    #[error("`{0}` has no runnable entry point")]
    NotRunnable(String),
}

/// Process exit status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(u8);

impl ExitStatus {
    pub const SUCCESS: Self = Self(0);
    pub const FAILURE: Self = Self(1);

    /// From a child process exit code. Codes outside `0..=255` are failures.
    pub fn from_code(code: i32) -> Self {
        u8::try_from(code).map_or(Self::FAILURE, Self)
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.0)
    }
}

/// Everything a command runs against.
#[derive(Debug, Clone)]
pub struct Context {
    pub site_root: PathBuf,
    pub config: Arc<SiteConfig>,
    pub registry: Arc<Registry>,
    /// Arguments after the command name.
    pub args: Vec<String>,
}

impl Context {
    pub fn new(site_root: &Path, config: SiteConfig, registry: Registry) -> Self {
        Self {
            site_root: site_root.to_path_buf(),
            config: Arc::new(config),
            registry: Arc::new(registry),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn paths(&self) -> SitePaths {
        SitePaths::resolve(&self.site_root, &self.config)
    }
}

/// Run the command unit called `name`.
pub fn dispatch(name: &str, context: &Context) -> Result<ExitStatus, DispatchError> {
    let Some(unit) = context.registry.get(PluginKind::Command, name) else {
        return Err(DispatchError::UnknownCommand {
            name: name.to_string(),
            available: context
                .registry
                .plugins(PluginKind::Command)
                .keys()
                .cloned()
                .collect(),
        });
    };
    info!(command = name, "dispatch");

    let result = match &unit.entry_point {
        EntryPoint::Command(builtin) => run_builtin(*builtin, context),
        EntryPoint::Executable { program, .. } => external::run(name, program, context),
        _ => Err(CommandError::NotRunnable(name.to_string())),
    };
    result.map_err(|source| DispatchError::Execution {
        command: name.to_string(),
        source,
    })
}

fn run_builtin(command: BuiltinCommand, ctx: &Context) -> Result<ExitStatus, CommandError> {
    match command {
        BuiltinCommand::Add => add::run(ctx),
        BuiltinCommand::Build => build::build(ctx),
        BuiltinCommand::BuildDocumentation => build::build_documentation(ctx),
        BuiltinCommand::Clean => clean::run(ctx),
        BuiltinCommand::Publish => publish::run(ctx),
        BuiltinCommand::Serve => serve::run(ctx),
        BuiltinCommand::Tests => build::tests(ctx),
        BuiltinCommand::Watch => watch::run(ctx),
    }
}

/// Parse a command's trailing arguments. `--help` prints and yields `None`.
fn parse_args<T: Parser>(args: &[String]) -> Result<Option<T>, CommandError> {
    match T::try_parse_from(args) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn orchestrator(
    ctx: &Context,
    paths: SitePaths,
    renderer: Box<dyn Renderer + Send + Sync>,
) -> Result<BuildOrchestrator, CommandError> {
    Ok(BuildOrchestrator::new(paths, &ctx.config, &ctx.registry, renderer)?)
}

/// An orchestrator rendering HTML into `paths.output`.
fn html_orchestrator(ctx: &Context, paths: SitePaths) -> Result<BuildOrchestrator, CommandError> {
    let renderer = HtmlRenderer::new(&paths.output, &paths.content, &ctx.config.site.title);
    orchestrator(ctx, paths, Box::new(renderer))
}

/// Exit status for a finished build: item errors only fail a strict build.
fn report_status(report: &BuildReport, strict: bool) -> ExitStatus {
    if strict && report.has_errors() {
        ExitStatus::FAILURE
    } else {
        ExitStatus::SUCCESS
    }
}

fn print_rebuild(changes: &ChangeSet, result: &Result<BuildReport, BuildError>) {
    println!("Changed: {} path(s)", changes.len());
    match result {
        Ok(report) => output::print_build_report(report),
        Err(e) => output::print_error(e),
    }
}

/// Stop `stop` on the first Ctrl-C.
fn stop_on_ctrl_c(stop: StopHandle) -> Result<(), CommandError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupted, stopping after the current build");
                    stop.stop();
                }
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
            }
        });
    });
    Ok(())
}
