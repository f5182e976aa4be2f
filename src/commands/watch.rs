use super::{
    CommandError, Context, ExitStatus, html_orchestrator, parse_args, print_rebuild,
    stop_on_ctrl_c,
};
use crate::output;
use crate::watch::{self, StopHandle, WatchCoordinator};
use clap::Parser;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "gallerist watch", no_binary_name = true)]
struct WatchArgs {
    /// Debounce window in milliseconds (overrides [watch].debounce_ms)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    debounce_ms: Option<u64>,
}

pub(super) fn run(ctx: &Context) -> Result<ExitStatus, CommandError> {
    let Some(args) = parse_args::<WatchArgs>(&ctx.args)? else {
        return Ok(ExitStatus::SUCCESS);
    };
    let mut watch_config = ctx.config.watch.clone();
    if let Some(ms) = args.debounce_ms {
        watch_config.debounce_ms = ms;
    }

    let paths = ctx.paths();
    let mut orchestrator = html_orchestrator(ctx, paths.clone())?;
    // A broken initial build is reported; the next change retries it.
    match orchestrator.full_build() {
        Ok(report) => output::print_build_report(&report),
        Err(e) => {
            warn!(error = %e, "initial build failed");
            output::print_error(&e);
        }
    }

    let (_subscription, changes) = watch::subscribe(&paths, &watch_config)?;
    let stop = StopHandle::new();
    stop_on_ctrl_c(stop.clone())?;
    println!("Watching for changes (Ctrl-C to stop)");
    WatchCoordinator::new(stop).run(&mut orchestrator, &changes, print_rebuild);
    Ok(ExitStatus::SUCCESS)
}
