use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdrflow_middleware::{BrokerConfig, BrokerConnection, QueueTransport};
use cdrflow_producer::config::ProducerConfig;
use cdrflow_producer::generator;
use cdrflow_producer::publisher::Producer;
use cdrflow_producer::Error;

#[derive(Parser)]
#[command(name = "cdrflow-producer")]
#[command(about = "Publish CDRs to sharded durable queues")]
struct Args {
    /// Broker server URL
    #[arg(long, env = "BROKER_URL", default_value = "nats://localhost:4222")]
    broker_url: String,

    /// Prefix for shard queue names
    #[arg(long, env = "QUEUE_PREFIX", default_value = "cdr_queue")]
    queue_prefix: String,

    /// Number of shard queues; must match the consumer deployment
    #[arg(long, env = "SHARD_COUNT", default_value_t = 4)]
    shard_count: u32,

    /// Total attempts for connecting and for each publish
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Base retry delay in milliseconds; doubles after each failed publish
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 500)]
    retry_delay_ms: u64,

    /// Number of synthetic CDRs to send
    #[arg(long, env = "NUM_MESSAGES", default_value_t = 500)]
    num_messages: u32,
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
    let config = ProducerConfig {
        broker: BrokerConfig {
            url: args.broker_url,
            queue_prefix: args.queue_prefix,
            shard_count: args.shard_count,
            max_retries: args.max_retries,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
        },
        num_messages: args.num_messages,
        progress_interval: 100,
        throttle: Duration::from_millis(220),
    };
    config.validate()?;

    info!(
        url = %config.broker.url,
        prefix = %config.broker.queue_prefix,
        shards = config.broker.shard_count,
        num_messages = config.num_messages,
        "starting cdrflow-producer"
    );

    let connection = Arc::new(BrokerConnection::new(config.broker.clone()));
    connection.connect().await?;

    let producer = Producer::new(
        Arc::clone(&connection) as Arc<dyn QueueTransport>,
        &config.broker,
    );

    let started = Instant::now();
    let result = run(&producer, &config).await;

    // Connection release does not depend on how the run went.
    if let Err(err) = connection.close().await {
        error!(error = %err, "broker close failed");
    }

    let (sent, failed) = result?;
    info!(
        sent,
        failed,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "producer finished"
    );
    Ok(())
}

/// Publish the configured number of synthetic records.
///
/// A record that permanently fails is logged and skipped — the run keeps
/// going — while any other error aborts the run. Returns (sent, failed).
async fn run(producer: &Producer, config: &ProducerConfig) -> cdrflow_producer::Result<(u64, u64)> {
    let started = Instant::now();
    let mut sent: u64 = 0;
    let mut failed: u64 = 0;

    for _ in 0..config.num_messages {
        let record = generator::generate();
        match producer.publish(&record).await {
            Ok(()) => sent += 1,
            Err(err @ Error::PublishFailed { .. }) => {
                // The dead-letter decision lives here, above the pipeline core.
                error!(error = %err, src = %record.src_number, "record permanently failed, skipping");
                failed += 1;
            }
            Err(err) => return Err(err),
        }

        let count = sent + failed;
        if count > 0 && count % u64::from(config.progress_interval) == 0 {
            info!(
                sent,
                failed,
                elapsed_secs = started.elapsed().as_secs_f64(),
                "publish progress"
            );
            tokio::time::sleep(config.throttle).await;
        }
    }

    Ok((sent, failed))
}
