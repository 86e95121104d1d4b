use anyhow::Context;
use clap::Parser;
use xnat_courier::utils::{logger, validation::Validate};
use xnat_courier::{AppConfig, BrokerConnection, JobMessage};

#[derive(Debug, Parser)]
#[command(name = "send-job")]
#[command(about = "Publishes folder-ready job messages to the courier queue")]
struct SendJobArgs {
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Folder of imaging objects to announce as ready.
    folder_path: String,

    #[arg(long, help = "Enable verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SendJobArgs::parse();
    logger::init_logger(args.verbose);

    let config = AppConfig::load_from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    config.validate().context("invalid configuration")?;

    let broker = BrokerConnection::open(&config.broker)
        .await
        .context("connecting to broker")?;
    broker
        .publish_job(&JobMessage {
            folder_path: args.folder_path,
        })
        .await?;
    broker.close().await?;

    Ok(())
}
