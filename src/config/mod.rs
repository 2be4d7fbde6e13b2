use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::ack::AckPolicy;
use crate::errors::PumpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Queue,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    Log,
    Poison,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub queue_name: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub dead_letter_name: Option<String>,
    pub source: SourceKind,
    pub processor: ProcessorKind,
    pub ack_policy: AckPolicy,
    pub poll_wait: Duration,
    pub max_records: usize,
    pub reclaim_idle: Duration,
}

pub fn load_config() -> Result<Config, PumpError> {
    dotenv().ok();
    let redis_url = required("REDIS_URL")?;
    let queue_name = required("QUEUE_NAME")?;
    let consumer_group = env::var("CONSUMER_GROUP").unwrap_or_else(|_| "pumps".to_string());
    let consumer_name = env::var("CONSUMER_NAME").unwrap_or_else(|_| "pump-1".to_string());
    let dead_letter_name = env::var("DEAD_LETTER_NAME").ok();
    let source = parse_source(&env::var("SOURCE").unwrap_or_else(|_| "queue".to_string()))?;
    let processor = parse_processor(&env::var("PROCESSOR").unwrap_or_else(|_| "log".to_string()))?;
    let ack_interval = millis("ACK_INTERVAL_MS", 5_000)?;
    let ack_policy = parse_ack_policy(
        &env::var("ACK_POLICY").unwrap_or_else(|_| "every_batch".to_string()),
        ack_interval,
    )?;
    let poll_wait = millis("POLL_WAIT_MS", 8_000)?;
    let max_records = count("MAX_RECORDS", 1)?;
    let reclaim_idle = millis("RECLAIM_IDLE_MS", 30_000)?;

    Ok(Config {
        redis_url,
        queue_name,
        consumer_group,
        consumer_name,
        dead_letter_name,
        source,
        processor,
        ack_policy,
        poll_wait,
        max_records,
        reclaim_idle,
    })
}

pub fn parse_source(value: &str) -> Result<SourceKind, PumpError> {
    match value {
        "queue" => Ok(SourceKind::Queue),
        "stream" => Ok(SourceKind::Stream),
        other => Err(PumpError::Config(format!("unknown SOURCE '{other}'"))),
    }
}

pub fn parse_processor(value: &str) -> Result<ProcessorKind, PumpError> {
    match value {
        "log" => Ok(ProcessorKind::Log),
        "poison" => Ok(ProcessorKind::Poison),
        "json" => Ok(ProcessorKind::Json),
        other => Err(PumpError::Config(format!("unknown PROCESSOR '{other}'"))),
    }
}

pub fn parse_ack_policy(value: &str, periodic_interval: Duration) -> Result<AckPolicy, PumpError> {
    match value {
        "every_message" => Ok(AckPolicy::EveryMessage),
        "every_batch" => Ok(AckPolicy::EveryBatch),
        "periodic" => Ok(AckPolicy::Periodic(periodic_interval)),
        other => Err(PumpError::Config(format!("unknown ACK_POLICY '{other}'"))),
    }
}

fn required(key: &str) -> Result<String, PumpError> {
    env::var(key).map_err(|_| PumpError::Config(format!("{key} is not set")))
}

fn millis(key: &str, default_ms: u64) -> Result<Duration, PumpError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| PumpError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

fn count(key: &str, default: usize) -> Result<usize, PumpError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|e| PumpError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}
