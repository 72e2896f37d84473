//! muster daemon entry point.

use clap::Parser;
use muster::agent::{Agent, GcSchedule};
use muster::cli::Cli;
use muster::logging;
use muster_runtime::DockerRuntime;
use muster_store::Cache;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.level, cli.json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| miette::miette!("failed to build async runtime: {err}"))?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> miette::Result<()> {
    info!(
        host = %cli.id,
        store = %cli.store_url,
        runtime = %cli.docker_url,
        interval = cli.update_interval,
        "muster starting"
    );

    // Both connections are fatal here; everything after startup retries on
    // its own schedule instead.
    let cache = Cache::connect(&cli.store_url, cli.id.clone(), cli.ttl()).await?;
    let docker = DockerRuntime::connect(&cli.docker_url)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        signal.cancel();
    });

    let agent = Agent::new(
        cache,
        docker,
        cli.interval(),
        GcSchedule::jittered(cli.interval()),
    );
    agent.run(shutdown).await;
    Ok(())
}
