//! Command units provided by plugin manifests.
//!
//! The program runs in the site root with the command's trailing arguments
//! and these variables set:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `GALLERIST_SITE_ROOT` | site root |
//! | `GALLERIST_CONTENT` | content root |
//! | `GALLERIST_OUTPUT` | output directory |
//!
//! Its exit code becomes the command's exit status.

use super::{CommandError, Context, ExitStatus};
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub(super) fn run(name: &str, program: &Path, ctx: &Context) -> Result<ExitStatus, CommandError> {
    let paths = ctx.paths();
    debug!(command = name, program = %program.display(), "running external command");
    let status = Command::new(program)
        .args(&ctx.args)
        .current_dir(&paths.root)
        .env("GALLERIST_SITE_ROOT", &paths.root)
        .env("GALLERIST_CONTENT", &paths.content)
        .env("GALLERIST_OUTPUT", &paths.output)
        .status()
        .map_err(|source| CommandError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;
    Ok(status.code().map_or(ExitStatus::FAILURE, ExitStatus::from_code))
}
