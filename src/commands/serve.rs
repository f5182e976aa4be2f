use super::{CommandError, Context, ExitStatus, html_orchestrator, parse_args, print_rebuild};
use crate::output;
use crate::watch::{self, StopHandle, WatchCoordinator};
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::thread;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gallerist serve", no_binary_name = true)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Port to serve on
    #[arg(long, short, default_value_t = 3000)]
    port: u16,
}

/// Build, rebuild on change in a background thread, and serve the output
/// directory until Ctrl-C.
pub(super) fn run(ctx: &Context) -> Result<ExitStatus, CommandError> {
    let Some(args) = parse_args::<ServeArgs>(&ctx.args)? else {
        return Ok(ExitStatus::SUCCESS);
    };
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|_| CommandError::Address(format!("{}:{}", args.host, args.port)))?;

    let paths = ctx.paths();
    let mut orchestrator = html_orchestrator(ctx, paths.clone())?;
    let report = orchestrator.full_build()?;
    output::print_build_report(&report);

    let (subscription, changes) = watch::subscribe(&paths, &ctx.config.watch)?;
    let stop = StopHandle::new();
    let coordinator = WatchCoordinator::new(stop.clone());
    let rebuilder = thread::spawn(move || {
        coordinator.run(&mut orchestrator, &changes, print_rebuild);
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let served = runtime.block_on(serve_dir(&paths.output, addr));

    stop.stop();
    drop(subscription);
    if rebuilder.join().is_err() {
        warn!("rebuild thread panicked");
    }
    served?;
    Ok(ExitStatus::SUCCESS)
}

async fn serve_dir(root: &Path, addr: SocketAddr) -> Result<(), CommandError> {
    let app = Router::new().fallback_service(ServeDir::new(root));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, root = %root.display(), "serving");
    println!("Serving at http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
