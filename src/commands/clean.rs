use super::{CommandError, Context, ExitStatus, parse_args};
use clap::Parser;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gallerist clean", no_binary_name = true)]
struct CleanArgs {}

pub(super) fn run(ctx: &Context) -> Result<ExitStatus, CommandError> {
    if parse_args::<CleanArgs>(&ctx.args)?.is_none() {
        return Ok(ExitStatus::SUCCESS);
    }
    let paths = ctx.paths();
    let output = &paths.output;

    let protected: [(&Path, &'static str); 3] = [
        (&paths.root, "it contains the site root"),
        (&paths.content, "it contains the content root"),
        (&paths.templates, "it contains the templates root"),
    ];
    for (dir, reason) in protected {
        if is_same_or_ancestor(output, dir) {
            return Err(CommandError::Refused {
                path: output.clone(),
                reason,
            });
        }
    }

    if !output.exists() {
        println!("Nothing to clean");
        return Ok(ExitStatus::SUCCESS);
    }
    fs::remove_dir_all(output)?;
    info!(path = %output.display(), "removed output");
    println!("Removed {}", output.display());
    Ok(ExitStatus::SUCCESS)
}

/// Whether removing `target` would also remove `dir`.
fn is_same_or_ancestor(target: &Path, dir: &Path) -> bool {
    let normalize = |p: &Path| fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    normalize(dir).starts_with(normalize(target))
}
