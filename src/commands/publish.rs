use super::{CommandError, Context, ExitStatus, html_orchestrator, parse_args, report_status};
use crate::output;
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// Placeholder in `[publish].command` replaced by the output directory.
const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Parser, Debug)]
#[command(name = "gallerist publish", no_binary_name = true)]
struct PublishArgs {
    /// Publish the output directory as it is
    #[arg(long)]
    skip_build: bool,
}

pub(super) fn run(ctx: &Context) -> Result<ExitStatus, CommandError> {
    let Some(args) = parse_args::<PublishArgs>(&ctx.args)? else {
        return Ok(ExitStatus::SUCCESS);
    };
    let argv = &ctx.config.publish.command;
    let Some((program, rest)) = argv.split_first() else {
        return Err(CommandError::PublishNotConfigured);
    };
    let paths = ctx.paths();

    if !args.skip_build {
        let mut orchestrator = html_orchestrator(ctx, paths.clone())?;
        let report = orchestrator.full_build()?;
        output::print_build_report(&report);
        let status = report_status(&report, ctx.config.build.strict);
        if !status.is_success() {
            println!("Not publishing: build had errors");
            return Ok(status);
        }
    }

    let output_dir = paths.output.to_string_lossy();
    let rest: Vec<String> = rest
        .iter()
        .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output_dir))
        .collect();
    info!(program = %program, args = ?rest, "publishing");
    let status = Command::new(program)
        .args(&rest)
        .current_dir(&paths.root)
        .status()
        .map_err(|source| CommandError::Spawn {
            program: PathBuf::from(program),
            source,
        })?;
    Ok(status.code().map_or(ExitStatus::FAILURE, ExitStatus::from_code))
}
