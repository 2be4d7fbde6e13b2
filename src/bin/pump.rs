//! message-pump: worker entrypoint
//!
//! Overview
//! --------
//! Wires one consumer against a Redis source: resolves the queue or stream
//! by name, picks the configured processor, attaches dead-letter routing
//! when a destination is configured, and drives the receive → process → ack
//! loop until ctrl-c.
//!
//! Responsibilities
//! ----------------
//! - Initialize logging, configuration, and the Redis pool.
//! - Resolve names eagerly so a missing or ambiguous source fails startup.
//! - Stop the engine cleanly and report its counters on the way out.
//!
//! Error Model
//! -----------
//! - Initialization and resolution failures are fatal.
//! - Per-message failures are logged, routed, and do not terminate the loop.

use tokio::signal;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use message_pump::config::{load_config, Config, ProcessorKind, SourceKind};
use message_pump::consumer::stream::StreamConsumer;
use message_pump::consumer::PollingConsumer;
use message_pump::emit::dlq::DeadLetterForwarder;
use message_pump::emit::redis::RedisPublisher;
use message_pump::errors::PumpError;
use message_pump::process::builtin::{JsonProcessor, LogProcessor, PoisonPillProcessor};
use message_pump::process::Processor;
use message_pump::redis::stream::RedisCheckpointedStream;
use message_pump::redis::{init_redis_pool, pool, RedisStreamQueue};

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().compact())
        .with(ErrorLayer::default())
        .init();
}

/// Demo payload for the `json` processor mode.
#[derive(Debug, serde::Deserialize)]
struct WorkOrder {
    order_id: String,
    quantity: u32,
}

fn build_processor(config: &Config) -> Box<dyn Processor> {
    match config.processor {
        ProcessorKind::Log => Box::new(LogProcessor),
        ProcessorKind::Poison => Box::new(PoisonPillProcessor::new()),
        ProcessorKind::Json => Box::new(JsonProcessor::new(|order: WorkOrder| {
            info!(order_id = %order.order_id, quantity = order.quantity, "work order handled");
            Ok(())
        })),
    }
}

async fn dead_letter_router(
    config: &Config,
) -> Result<Option<DeadLetterForwarder<RedisPublisher>>, PumpError> {
    let Some(name) = &config.dead_letter_name else {
        return Ok(None);
    };
    let publisher = RedisPublisher::new(pool().clone(), name);
    publisher.resolve().await?;
    Ok(Some(DeadLetterForwarder::new(publisher, "dead-letter")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    info!("pump starting");

    let config = load_config()?;
    init_redis_pool(&config.redis_url).await?;

    match config.source {
        SourceKind::Queue => run_queue(&config).await,
        SourceKind::Stream => run_stream(&config).await,
    }
}

async fn run_queue(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let queue = RedisStreamQueue::resolve(
        pool().clone(),
        &config.queue_name,
        &config.consumer_group,
        &config.consumer_name,
    )
    .await?
    .with_poll_wait(config.poll_wait)
    .with_max_records(config.max_records)
    .with_reclaim_idle(config.reclaim_idle);
    info!(stream = %queue.stream_key(), group = %config.consumer_group, "queue resolved");

    let mut consumer =
        PollingConsumer::new(queue, build_processor(config)).with_policy(config.ack_policy);
    if let Some(router) = dead_letter_router(config).await? {
        consumer = consumer.with_router(router);
    }

    consumer.start();
    signal::ctrl_c().await?;
    info!("shutdown requested");
    consumer.stop();
    if let Some(stats) = consumer.join().await {
        info!(
            cycles = stats.cycles,
            processed = stats.processed,
            failed = stats.failed,
            commits = stats.commits,
            "pump stopped"
        );
    }
    Ok(())
}

async fn run_stream(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let stream = RedisCheckpointedStream::resolve(
        pool().clone(),
        &config.queue_name,
        &config.consumer_group,
    )
    .await?
    .with_poll_wait(config.poll_wait)
    .with_max_records(config.max_records);

    let mut consumer =
        StreamConsumer::new(stream, build_processor(config)).with_policy(config.ack_policy);
    if let Some(router) = dead_letter_router(config).await? {
        consumer = consumer.with_router(router);
    }

    consumer.start();
    signal::ctrl_c().await?;
    info!("shutdown requested");
    consumer.stop();
    if let Some(stats) = consumer.join().await {
        info!(
            cycles = stats.cycles,
            processed = stats.processed,
            failed = stats.failed,
            commits = stats.commits,
            "pump stopped"
        );
    }
    Ok(())
}
