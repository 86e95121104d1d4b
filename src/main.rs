use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use xnat_courier::utils::{logger, validation::Validate};
use xnat_courier::{AppConfig, BrokerConnection, CliArgs, JobOrchestrator, XnatClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    logger::init_logger(args.verbose);

    tracing::info!("Starting xnat-courier");

    let config = AppConfig::load_from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    config.validate().context("invalid configuration")?;

    let archive = XnatClient::new(&config.archive);
    let orchestrator = Arc::new(JobOrchestrator::new(archive, &config));

    let broker = BrokerConnection::open(&config.broker)
        .await
        .context("connecting to broker")?;

    // Run until ctrl-c; an in-flight job finishes before the loop exits.
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let consume_result = broker
        .consume(shutdown, move |job| {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.process(&job).await }
        })
        .await;

    // Close whatever happened to the loop, the keepalive task must not
    // outlive it.
    broker.close().await?;
    consume_result?;

    tracing::info!("✅ xnat-courier stopped cleanly");
    Ok(())
}
