//! Error types for message-pump
//!
//! Overview
//! --------
//! Canonical error enumeration used across ingestion, processing, and emit
//! layers. Keep variants stable and descriptive; prefer mapping external
//! libraries into these variants at module boundaries.
//!
//! Usage
//! -----
//! - Convert low-level errors at the edge (e.g., Redis/serde).
//! - Avoid leaking third-party error types across crate boundaries.
//! - Steady-state loop errors (`Backend`, `Commit`, `Process`, `Publish`)
//!   are logged and recovered locally; `Resolve` and `Config` abort startup.
//!
//! Concurrency / Logging
//! ---------------------
//! Errors are `Send + Sync` and implement Display via `thiserror`.
//! Use `tracing` for context at call sites (`error!(...);`).
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PumpError {
    /// Failure to initialize external services (pool creation, client wiring).
    #[error("Redis initialization failed: {0}")]
    RedisInit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A queue or stream name matched zero or multiple keys. Fatal at startup.
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// Pooled command/IO failures or protocol-level errors from the backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Acknowledge/checkpoint write failed. Work is redelivered, not lost.
    #[error("Commit error: {0}")]
    Commit(String),

    /// The backend rejected a checkpoint but will accept a retry shortly.
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Processor rejected a message. The failure router sees it next.
    #[error("Processing error: {0}")]
    Process(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] Box<dyn std::error::Error + Send + Sync>),
}
