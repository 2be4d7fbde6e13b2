//! Source abstractions
//!
//! Overview
//! --------
//! Two contracts cover the supported sources. Queue-style backends hand out
//! individually receipted deliveries and drop them on commit; anything
//! polled but never committed becomes visible again after the backend's
//! reclaim window. Stream-style backends share one monotonic position per
//! shard; a checkpoint covers everything before it.
//!
//! Concrete implementations live in `redis` (consumer groups and
//! checkpointed reads) and `ingest::memory` (in-process, for tests and
//! single-process demos).

use bytes::Bytes;

use crate::message::AckToken;

pub mod memory;

/// Raw unit handed out by a backend before decoding. `id` is the receipt
/// token for queues, the sequence id for streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub payload: Bytes,
}

#[async_trait::async_trait]
pub trait QueueBackend {
    type Error;

    /// Bounded wait for the next batch; empty when nothing arrived inside
    /// the window.
    async fn poll(&self) -> Result<Vec<Delivery>, Self::Error>;

    /// Acknowledge processed deliveries so the backend drops them. An empty
    /// slice is a no-op.
    async fn commit(&self, tokens: &[AckToken]) -> Result<(), Self::Error>;
}

#[async_trait::async_trait]
pub trait StreamBackend {
    type Error;

    /// Label for the partition this backend reads, used in logs.
    fn shard(&self) -> &str;

    /// Load the stored position and return where consumption resumes.
    async fn init(&self) -> Result<String, Self::Error>;

    async fn next_batch(&self) -> Result<Vec<Delivery>, Self::Error>;

    /// Persist progress at `position`, or at the last delivered record when
    /// `None`.
    async fn checkpoint(&self, position: Option<&str>) -> Result<(), Self::Error>;
}
