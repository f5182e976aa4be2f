use super::{
    CommandError, Context, ExitStatus, html_orchestrator, orchestrator, parse_args, report_status,
};
use crate::output;
use crate::render::NullRenderer;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gallerist build", no_binary_name = true)]
struct BuildArgs {
    /// Exit non-zero when any item had errors
    #[arg(long)]
    strict: bool,
    /// Print every node of the built site
    #[arg(long)]
    list: bool,
}

#[derive(Parser, Debug)]
#[command(name = "gallerist build-documentation", no_binary_name = true)]
struct DocsArgs {
    /// Output directory, relative to the site root
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(name = "gallerist tests", no_binary_name = true)]
struct TestsArgs {}

pub(super) fn build(ctx: &Context) -> Result<ExitStatus, CommandError> {
    let Some(args) = parse_args::<BuildArgs>(&ctx.args)? else {
        return Ok(ExitStatus::SUCCESS);
    };
    let mut orchestrator = html_orchestrator(ctx, ctx.paths())?;
    let report = orchestrator.full_build()?;
    output::print_build_report(&report);
    if args.list
        && let Some(model) = orchestrator.model()
    {
        output::print_model(model);
    }
    Ok(report_status(&report, args.strict || ctx.config.build.strict))
}

pub(super) fn build_documentation(ctx: &Context) -> Result<ExitStatus, CommandError> {
    let Some(args) = parse_args::<DocsArgs>(&ctx.args)? else {
        return Ok(ExitStatus::SUCCESS);
    };
    let docs = &ctx.config.documentation;
    let output_dir = args
        .output
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| docs.output.clone());
    let paths = ctx.paths().with_content(&docs.source, &output_dir);
    println!("Documentation: {}", paths.content.display());

    let mut orchestrator = html_orchestrator(ctx, paths)?;
    let report = orchestrator.full_build()?;
    output::print_build_report(&report);
    Ok(report_status(&report, ctx.config.build.strict))
}

/// Consistency check: every item through its handler, nothing written.
pub(super) fn tests(ctx: &Context) -> Result<ExitStatus, CommandError> {
    if parse_args::<TestsArgs>(&ctx.args)?.is_none() {
        return Ok(ExitStatus::SUCCESS);
    }
    let mut orchestrator = orchestrator(ctx, ctx.paths(), Box::new(NullRenderer))?;
    let report = orchestrator.full_build()?;
    output::print_build_report(&report);
    Ok(report_status(&report, true))
}
