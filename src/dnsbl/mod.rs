//! DNS blocklist ingestion pipeline.
//!
//! ```text
//! enqueue(ips) ──► IngestionQueue ──► LookupWorker ──► BlocklistProber (domain × ip)
//!                  (bounded, drops        │
//!                   when full)            └──────────► RecordRepository::upsert
//! ```
//!
//! [`Consumer`] owns the queue and the single worker task.

mod consumer;
mod prober;
mod queue;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use consumer::Consumer;
pub use prober::{BlocklistProber, DnsProber};
pub use queue::{DEFAULT_CAPACITY, effective_capacity};

use std::time::Duration;

/// Response code stored when an IP is on none of the probed lists, or the
/// lookup failed.
pub const NO_MATCH_CODE: &str = "NXDOMAIN";

/// Runtime settings for the pipeline, resolved from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Number of batches the queue buffers before dropping.
    pub queue_capacity: usize,
    /// Blocklist zones, probed in this order.
    pub domains: Vec<String>,
    /// Upper bound for a single lookup.
    pub probe_timeout: Duration,
    /// How long shutdown waits for the in-flight batch before aborting it.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            domains: vec!["zen.spamhaus.org".to_string()],
            probe_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}
