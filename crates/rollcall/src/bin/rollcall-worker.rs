//! Delivery worker: drains the certificate queue until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use rollcall::delivery::{connect, LogMailer, Topology, Worker};
use rollcall::store::SqliteStore;
use rollcall::{init_logging, LedgerObserver, RollcallConfig};

#[derive(Parser)]
#[command(name = "rollcall-worker", about = "Rollcall certificate delivery worker")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Queue to consume, e.g. "sqlite://rollcall-queue.db".
    #[arg(long, env = "ROLLCALL_QUEUE_URL")]
    queue_url: Option<String>,

    /// Ledger database receiving delivery confirmations.
    #[arg(long, env = "ROLLCALL_DATABASE")]
    database: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ROLLCALL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Process what is queued now, then exit.
    #[arg(long)]
    drain: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RollcallConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RollcallConfig::default(),
    };
    config.apply_env();
    if let Some(url) = cli.queue_url {
        config.queue_url = url;
    }
    if let Some(db) = cli.database {
        config.database_path = db;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    anyhow::ensure!(
        config.delivery_timeout_secs < rollcall::delivery::DEFAULT_LEASE.as_secs(),
        "delivery_timeout_secs must stay below the {}s queue lease",
        rollcall::delivery::DEFAULT_LEASE.as_secs()
    );
    init_logging(config.log_format()?, &config.log_level)?;
    tracing::info!(config = ?config, "starting delivery worker");

    let broker = connect(&config.queue_url, Topology::default())
        .with_context(|| format!("opening queue {}", config.queue_url))?;
    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("opening ledger {}", config.database_path.display()))?,
    );
    let mailer = Arc::new(LogMailer::with_attachments_dir(&config.documents_dir));
    let worker = Worker::new(broker, mailer, config.worker_config())
        .with_observer(Arc::new(LedgerObserver::new(store)));

    if cli.drain {
        let report = worker.drain().await?;
        tracing::info!(delivered = report.delivered, dead_lettered = report.dead_lettered(), "queue drained");
        return Ok(());
    }

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing current message");
            let _ = stop.send(true);
        }
    });

    let report = worker.run(shutdown).await?;
    tracing::info!(
        delivered = report.delivered,
        dead_lettered = report.dead_lettered(),
        "delivery worker exited"
    );
    Ok(())
}
