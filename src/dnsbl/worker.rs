//! Background task that drains the ingestion queue.
//!
//! The worker is either waiting (for a batch or the stop signal) or
//! processing one batch. Stop is only observed between batches, so a batch
//! that has been dequeued is always finished unless the abort token fires.

use super::NO_MATCH_CODE;
use super::prober::{BlocklistProber, ProbeError, ProbeHit};
use super::queue::{Batch, BatchReceiver};
use crate::db::{Database, Record};
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one processed batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub probes: usize,
    pub stored: usize,
    pub failed: usize,
    pub aborted: bool,
}

pub struct LookupWorker {
    db: Database,
    prober: Arc<dyn BlocklistProber>,
    domains: Vec<String>,
    probe_timeout: Duration,
    stop: CancellationToken,
    abort: CancellationToken,
}

impl LookupWorker {
    pub fn new(
        db: Database,
        prober: Arc<dyn BlocklistProber>,
        domains: Vec<String>,
        probe_timeout: Duration,
        stop: CancellationToken,
        abort: CancellationToken,
    ) -> Self {
        Self {
            db,
            prober,
            domains,
            probe_timeout,
            stop,
            abort,
        }
    }

    /// Run until stopped or until every producer is gone.
    pub async fn run(self, mut batches: BatchReceiver) {
        info!(domains = ?self.domains, "Lookup worker started");

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    info!("Stop signal received, lookup worker exiting");
                    break;
                }
                batch = batches.recv() => {
                    let Some(batch) = batch else {
                        info!("Ingestion queue closed, lookup worker exiting");
                        break;
                    };
                    let report = self.process_batch(batch).await;
                    if report.aborted {
                        warn!(?report, "Batch aborted, lookup worker exiting");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every domain for every IP in the batch and store each outcome.
    ///
    /// Failures are contained to their (domain, ip) pair. When several
    /// domains answer for the same IP the last one probed is what remains
    /// stored.
    pub async fn process_batch(&self, batch: Batch) -> BatchReport {
        let mut report = BatchReport::default();

        if batch.is_empty() || self.domains.is_empty() {
            debug!(
                ips = batch.len(),
                domains = self.domains.len(),
                "Nothing to probe"
            );
            return report;
        }

        debug!(ips = batch.len(), "Processing batch");

        for ip in &batch {
            for domain in &self.domains {
                report.probes += 1;

                let code = match self.probe(domain, ip).await {
                    Ok(hits) => response_code(hits),
                    Err(ProbeError::Cancelled) => {
                        metrics::record_probe("cancelled");
                        report.aborted = true;
                        return report;
                    }
                    Err(e) => {
                        let outcome = if matches!(e, ProbeError::Timeout) {
                            "timeout"
                        } else {
                            "error"
                        };
                        metrics::record_probe(outcome);
                        warn!(ip = %ip, domain = %domain, error = %e, "DNSBL lookup failed");
                        NO_MATCH_CODE.to_string()
                    }
                };

                let record = Record::observed(ip, &code);
                match self.db.records().upsert(&record).await {
                    Ok(outcome) => {
                        metrics::record_upsert(outcome.as_str());
                        debug!(
                            ip = %ip,
                            domain = %domain,
                            code = %code,
                            outcome = outcome.as_str(),
                            "Record stored"
                        );
                        report.stored += 1;
                    }
                    Err(e) => {
                        metrics::record_upsert("failed");
                        error!(
                            record_id = %record.id,
                            ip = %ip,
                            domain = %domain,
                            error = %e,
                            "Failed to store record"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            ips = batch.len(),
            probes = report.probes,
            stored = report.stored,
            failed = report.failed,
            "Batch processed"
        );
        report
    }

    /// One bounded lookup. Races the prober against the deadline and the
    /// abort token.
    async fn probe(&self, domain: &str, ip: &str) -> Result<Vec<ProbeHit>, ProbeError> {
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(ProbeError::Cancelled),
            result = tokio::time::timeout(self.probe_timeout, self.prober.probe(domain, ip)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ProbeError::Timeout),
                }
            }
        };

        metrics::observe_probe_duration(started.elapsed().as_secs_f64());
        result
    }
}

/// First answer wins; no answer is the no-match sentinel.
fn response_code(hits: Vec<ProbeHit>) -> String {
    match hits.into_iter().next() {
        Some(hit) => {
            metrics::record_probe("listed");
            hit.code
        }
        None => {
            metrics::record_probe("no_match");
            NO_MATCH_CODE.to_string()
        }
    }
}
