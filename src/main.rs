use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zonewalk::config::{Args, Config, Upstreams};
use zonewalk::upstream::{system_servers, Trust, UpstreamResolver};
use zonewalk::{discover, logging};
use zonewalk::{DomainName, EndReason, Error, PartitionPlanner, Resolver};

/// The exit code after an interrupt.
const INTERRUPTED: u8 = 130;

/// The number of names buffered between walkers and the output.
const OUTPUT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("zonewalk: {}", err);
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(config.verbosity);
    match run(config).await {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<ExitCode, Error> {
    let planner = PartitionPlanner::new(
        config.zone.clone(),
        config.parallelism,
        config.start.clone(),
        config.walk,
    )?;
    let resolver: Arc<dyn Resolver> = Arc::new(connect(&config).await?);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                shutdown.cancel();
            }
        }
    });

    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
    let (summaries, written) = tokio::join!(
        planner.run(resolver, tx, shutdown.clone()),
        write_names(rx, shutdown.clone()),
    );
    written?;

    let mut complete = summaries.len() == planner.partitions().len();
    for summary in &summaries {
        info!(
            "partition {}: {} names, {} queries, {}",
            summary.partition, summary.names, summary.queries, summary.reason
        );
        complete &= summary.reason.is_complete();
    }
    if shutdown.is_cancelled()
        || summaries
            .iter()
            .any(|summary| summary.reason == EndReason::Cancelled)
    {
        return Ok(ExitCode::from(INTERRUPTED));
    }
    Ok(if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Creates the resolver for the configured upstreams.
///
/// The zone’s own servers are queried through a validating transport that
/// looks up the chain of trust via the system resolvers.
async fn connect(config: &Config) -> Result<UpstreamResolver, Error> {
    let resolver = match &config.upstreams {
        Upstreams::System => {
            UpstreamResolver::connect(&system_servers(), config.timeout)
                .await?
        }
        Upstreams::Servers(servers) => {
            UpstreamResolver::connect(servers, config.timeout).await?
        }
        Upstreams::Authoritative => {
            match discover::nameservers(&config.zone).await {
                Some(servers) => {
                    UpstreamResolver::validating(
                        &servers,
                        &system_servers(),
                        config.timeout,
                    )
                    .await?
                }
                None => {
                    warn!("falling back to the system resolvers");
                    UpstreamResolver::connect(
                        &system_servers(),
                        config.timeout,
                    )
                    .await?
                }
            }
        }
    };
    if resolver.trust() == Trust::Validated {
        info!("validating responses against the root trust anchor");
    }
    Ok(resolver)
}

/// Writes names to standard output, one per line.
///
/// Returns once all walkers have dropped their end of the channel.
async fn write_names(
    mut names: mpsc::Receiver<DomainName>,
    shutdown: CancellationToken,
) -> Result<(), io::Error> {
    let stdout = io::stdout();
    while let Some(name) = names.recv().await {
        let mut out = stdout.lock();
        if let Err(err) = writeln!(out, "{}", name).and_then(|_| out.flush())
        {
            shutdown.cancel();
            return Err(err);
        }
    }
    Ok(())
}
