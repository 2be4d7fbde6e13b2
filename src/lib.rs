pub mod ack;
pub mod config;
pub mod consumer;
pub mod emit;
pub mod errors;
pub mod ingest;
pub mod message;
pub mod process;
pub mod redis;
pub mod transform;
pub mod util;
// Configure a global allocator optimized for throughput.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
