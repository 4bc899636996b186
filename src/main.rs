//! OSS Proxy - signing reverse proxy for Aliyun OSS

use anyhow::Context;
use clap::{Parser, ValueEnum};
use oss_proxy::metrics::server::MetricsServer;
use oss_proxy::{config::Config, server::ProxyServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// OSS Proxy - forwards `/<bucket>/<object>` to Aliyun OSS with signed requests
#[derive(Parser, Debug)]
#[command(name = "oss-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file. Without one, settings come from OSS_* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting OSS Proxy v{}", oss_proxy::VERSION);

    let config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config =
                Config::from_env().context("Failed to load configuration from environment")?;
            info!("Loaded configuration from environment");
            config
        }
    };
    config.validate().context("Invalid configuration")?;

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::new(config.metrics.address.clone());
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let server = ProxyServer::new(config).await?;
    let result = server.run().await;

    if let Some(metrics_server) = metrics_server.as_mut() {
        metrics_server.shutdown().await;
    }

    result?;
    Ok(())
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    match args.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.with_thread_ids(true).json().finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}
