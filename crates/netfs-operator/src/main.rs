//! NetworkFilesystem operator - exposes clustered block volumes as NFS shares

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use netfs_common::{Config, DEFAULT_NAMESPACE, LONGHORN_NAMESPACE};
use netfs_operator::controller_runner::build_controllers;
use netfs_operator::crds::{crd_yaml, ensure_crds_installed};

/// NetworkFilesystem operator
#[derive(Parser, Debug)]
#[command(name = "netfs-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Namespace holding NetworkFilesystem records
    #[arg(long, env = "NETFS_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the node this instance runs on
    #[arg(long, env = "NODE_NAME", default_value = "")]
    node_name: String,

    /// Namespace of the storage subsystem's resources
    #[arg(long, env = "LONGHORN_NAMESPACE", default_value = LONGHORN_NAMESPACE)]
    longhorn_namespace: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the lifecycle and endpoint-sync controllers (default mode)
    Controller,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    fn config(&self) -> Config {
        Config::new(&self.namespace, &self.node_name)
            .with_longhorn_namespace(&self.longhorn_namespace)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crd_yaml()?);
        return Ok(());
    }

    init_tracing(cli.log_format);

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config()).await,
    }
}

async fn run_controller(config: Config) -> anyhow::Result<()> {
    if config.node_name.is_empty() {
        anyhow::bail!("node name is required: pass --node-name or set NODE_NAME");
    }

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    tracing::info!(
        namespace = %config.namespace,
        node = %config.node_name,
        longhorn_namespace = %config.longhorn_namespace,
        "Starting NetworkFilesystem controllers"
    );
    let controllers = build_controllers(client, Arc::new(config));
    futures::future::join_all(controllers).await;

    tracing::info!("Controllers stopped");
    Ok(())
}
