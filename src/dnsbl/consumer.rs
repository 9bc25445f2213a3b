//! Pipeline coordinator: owns the ingestion queue and the worker task.

use super::PipelineSettings;
use super::prober::BlocklistProber;
use super::queue::IngestionQueue;
use super::worker::LookupWorker;
use crate::db::Database;
use crate::metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Accepts batches from callers and feeds them to exactly one lookup worker.
///
/// The configured pool size only bounds the queue; lookups run serially on
/// one task.
pub struct Consumer {
    queue: IngestionQueue,
    stop: CancellationToken,
    abort: CancellationToken,
    shutdown_timeout: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    /// Create the queue and spawn the worker. Must be called inside a tokio
    /// runtime.
    pub fn start(
        db: Database,
        prober: Arc<dyn BlocklistProber>,
        settings: PipelineSettings,
    ) -> Self {
        let (queue, batches) = IngestionQueue::bounded(settings.queue_capacity);
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();

        let worker = LookupWorker::new(
            db,
            prober,
            settings.domains.clone(),
            settings.probe_timeout,
            stop.clone(),
            abort.clone(),
        );
        let handle = tokio::spawn(worker.run(batches));

        info!(
            capacity = queue.capacity(),
            domains = ?settings.domains,
            "Started consumer"
        );

        Self {
            queue,
            stop,
            abort,
            shutdown_timeout: settings.shutdown_timeout,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a batch for lookup. Never blocks; `false` means the queue is
    /// full (or the worker has stopped) and the batch was dropped.
    pub fn enqueue(&self, ips: Vec<String>) -> bool {
        let count = ips.len();

        if self.queue.try_enqueue(ips) {
            metrics::record_batch("queued");
            debug!(count, "Added batch to ingestion queue");
            true
        } else {
            metrics::record_batch("dropped");
            warn!(
                count,
                capacity = self.queue.capacity(),
                "Ingestion queue is full, batch dropped"
            );
            false
        }
    }

    /// Batches waiting for the worker.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the worker after its in-flight batch. Batches still queued are
    /// discarded. If the batch doesn't finish within the shutdown timeout its
    /// remaining probes are cancelled. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.stop.cancel();

        let Some(mut handle) = self.worker.lock().take() else {
            return;
        };

        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => info!("Lookup worker stopped"),
            Ok(Err(e)) => error!(error = %e, "Lookup worker task failed"),
            Err(_) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "In-flight batch did not finish in time, aborting lookups"
                );
                self.abort.cancel();
                if let Err(e) = handle.await {
                    error!(error = %e, "Lookup worker task failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use crate::dnsbl::testing::{GatedProber, HangingProber, ScriptedProber};

    fn settings(capacity: usize, domains: &[&str]) -> PipelineSettings {
        PipelineSettings {
            queue_capacity: capacity,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            probe_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    async fn wait_for_code(db: &Database, ip: &str) -> String {
        for _ in 0..100 {
            match db.records().find(ip).await {
                Ok(record) => return record.response_code,
                Err(DbError::RecordNotFound(_)) => {
                    tokio::time::sleep(Duration::from_millis(20)).await
                }
                Err(e) => panic!("unexpected store error: {e}"),
            }
        }
        panic!("no record stored for {ip}");
    }

    #[tokio::test]
    async fn test_enqueue_below_capacity_succeeds() {
        let db = Database::new(":memory:").await.unwrap();
        let consumer = Consumer::start(
            db.clone(),
            Arc::new(ScriptedProber::new()),
            settings(99, &["bl.example"]),
        );

        assert!(consumer.enqueue(vec!["127.0.0.1".to_string()]));
        assert_eq!(wait_for_code(&db, "127.0.0.1").await, "NXDOMAIN");
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_end_to_end_listed_ip() {
        let db = Database::new(":memory:").await.unwrap();
        let prober = ScriptedProber::new().listed("bl.example", "127.0.0.3", "127.0.0.3");
        let consumer = Consumer::start(db.clone(), Arc::new(prober), settings(10, &["bl.example"]));

        assert!(consumer.enqueue(vec!["127.0.0.3".to_string()]));
        assert_eq!(wait_for_code(&db, "127.0.0.3").await, "127.0.0.3");
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_returns_false_while_worker_busy() {
        let db = Database::new(":memory:").await.unwrap();
        let prober = Arc::new(GatedProber::new());
        let consumer = Consumer::start(db.clone(), prober.clone(), settings(1, &["bl.example"]));

        // First batch is taken by the worker and parks in the prober.
        assert!(consumer.enqueue(vec!["1.2.3.4".to_string()]));
        prober.wait_started().await;

        // Second fills the single slot, third has nowhere to go.
        assert!(consumer.enqueue(vec!["5.6.7.8".to_string()]));
        assert!(!consumer.enqueue(vec!["9.9.9.9".to_string()]));
        assert_eq!(consumer.queue_depth(), 1);

        prober.release(2);
        assert_eq!(wait_for_code(&db, "5.6.7.8").await, "NXDOMAIN");
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_capacity_falls_back_to_default() {
        let db = Database::new(":memory:").await.unwrap();
        let prober = Arc::new(GatedProber::new());
        let consumer = Consumer::start(db, prober.clone(), settings(0, &["bl.example"]));

        assert!(consumer.enqueue(vec!["10.0.0.1".to_string()]));
        prober.wait_started().await;

        let mut accepted = 0;
        while consumer.enqueue(vec!["10.0.0.2".to_string()]) {
            accepted += 1;
        }
        assert_eq!(accepted, crate::dnsbl::DEFAULT_CAPACITY);

        prober.release(1 + accepted);
        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_finishes_in_flight_batch() {
        let db = Database::new(":memory:").await.unwrap();
        let prober = Arc::new(GatedProber::new());
        let consumer = Arc::new(Consumer::start(
            db.clone(),
            prober.clone(),
            settings(4, &["bl.example"]),
        ));

        assert!(consumer.enqueue(vec!["10.1.0.1".to_string(), "10.1.0.2".to_string()]));
        assert!(consumer.enqueue(vec!["10.1.0.3".to_string()]));
        prober.wait_started().await;

        let shutdown = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!shutdown.is_finished());

        prober.release(10);
        shutdown.await.unwrap();

        assert!(!consumer.is_running());
        assert!(db.records().find("10.1.0.1").await.is_ok());
        assert!(db.records().find("10.1.0.2").await.is_ok());
        // Queued but never started.
        assert!(matches!(
            db.records().find("10.1.0.3").await,
            Err(DbError::RecordNotFound(_))
        ));
        assert!(!consumer.enqueue(vec!["10.1.0.4".to_string()]));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_prober() {
        let db = Database::new(":memory:").await.unwrap();
        let mut cfg = settings(4, &["bl.example"]);
        cfg.probe_timeout = Duration::from_secs(3600);
        cfg.shutdown_timeout = Duration::from_millis(100);
        let consumer = Consumer::start(db.clone(), Arc::new(HangingProber), cfg);

        assert!(consumer.enqueue(vec!["10.2.0.1".to_string()]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), consumer.shutdown())
            .await
            .expect("shutdown should not hang on a stuck prober");
        assert!(!consumer.is_running());
        assert_eq!(db.records().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let db = Database::new(":memory:").await.unwrap();
        let consumer = Consumer::start(db, Arc::new(ScriptedProber::new()), settings(1, &["bl.example"]));
        consumer.shutdown().await;
        consumer.shutdown().await;
        assert!(!consumer.is_running());
    }
}
