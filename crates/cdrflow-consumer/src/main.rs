use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdrflow_consumer::config::ConsumerConfig;
use cdrflow_consumer::consumer::CdrConsumer;
use cdrflow_consumer::store::PostgresStore;
use cdrflow_middleware::{BrokerConfig, BrokerConnection, QueueTransport, RecordStore};

#[derive(Parser)]
#[command(name = "cdrflow-consumer")]
#[command(about = "Drain CDR shard queues into PostgreSQL")]
struct Args {
    /// Broker server URL
    #[arg(long, env = "BROKER_URL", default_value = "nats://localhost:4222")]
    broker_url: String,

    /// Prefix for shard queue names
    #[arg(long, env = "QUEUE_PREFIX", default_value = "cdr_queue")]
    queue_prefix: String,

    /// Number of shard queues; must match the producer deployment
    #[arg(long, env = "SHARD_COUNT", default_value_t = 4)]
    shard_count: u32,

    /// Total attempts when connecting to the broker
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Delay between connection attempts in milliseconds
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 500)]
    retry_delay_ms: u64,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ConsumerConfig {
        broker: BrokerConfig {
            url: args.broker_url,
            queue_prefix: args.queue_prefix,
            shard_count: args.shard_count,
            max_retries: args.max_retries,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
        },
        database_url: args.database_url,
    };
    config.validate()?;

    info!(
        url = %config.broker.url,
        prefix = %config.broker.queue_prefix,
        shards = config.broker.shard_count,
        "starting cdrflow-consumer"
    );

    let connection = Arc::new(BrokerConnection::new(config.broker.clone()));
    connection.connect().await?;

    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    store.ensure_schema().await?;

    let mut consumer = CdrConsumer::new(
        Arc::clone(&connection) as Arc<dyn QueueTransport>,
        store as Arc<dyn RecordStore>,
        &config.broker,
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received, stopping"),
                _ = sigint.recv() => info!("SIGINT received, stopping"),
            }
            shutdown.cancel();
        });
    }

    let result = consumer.run(shutdown).await;

    // Resource release does not depend on how the loop exited.
    if let Err(err) = connection.close().await {
        error!(error = %err, "broker close failed");
    }

    let stats = consumer.stats();
    info!(
        processed = stats.processed,
        dropped = stats.dropped,
        duplicates = stats.duplicates,
        store_errors = stats.store_errors,
        state = ?consumer.state(),
        "consumer exited"
    );

    result?;
    Ok(())
}
