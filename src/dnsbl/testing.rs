//! Probers used by the pipeline tests.

use super::prober::{BlocklistProber, ProbeError, ProbeHit};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

enum Answer {
    Hits(Vec<String>),
    Fail,
}

/// Answers from a fixed table; unknown pairs are "not listed".
#[derive(Default)]
pub struct ScriptedProber {
    answers: HashMap<(String, String), Answer>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listed(self, domain: &str, ip: &str, code: &str) -> Self {
        self.answers(domain, ip, &[code])
    }

    pub fn answers(mut self, domain: &str, ip: &str, codes: &[&str]) -> Self {
        self.answers.insert(
            (domain.to_string(), ip.to_string()),
            Answer::Hits(codes.iter().map(|c| c.to_string()).collect()),
        );
        self
    }

    pub fn failing(mut self, domain: &str, ip: &str) -> Self {
        self.answers
            .insert((domain.to_string(), ip.to_string()), Answer::Fail);
        self
    }

    /// Every (domain, ip) pair probed so far, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BlocklistProber for ScriptedProber {
    async fn probe(&self, domain: &str, ip: &str) -> Result<Vec<ProbeHit>, ProbeError> {
        self.calls.lock().push((domain.to_string(), ip.to_string()));

        match self.answers.get(&(domain.to_string(), ip.to_string())) {
            Some(Answer::Hits(codes)) => Ok(codes.iter().map(ProbeHit::new).collect()),
            Some(Answer::Fail) => Err(ProbeError::Resolve {
                query: format!("{}.{}", ip, domain),
                reason: "SERVFAIL".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Never answers.
pub struct HangingProber;

#[async_trait]
impl BlocklistProber for HangingProber {
    async fn probe(&self, _domain: &str, _ip: &str) -> Result<Vec<ProbeHit>, ProbeError> {
        std::future::pending().await
    }
}

/// Holds every probe until the test releases a permit, then answers
/// "not listed".
pub struct GatedProber {
    permits: Arc<Semaphore>,
    started: Arc<Semaphore>,
}

impl GatedProber {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            started: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let `n` blocked probes finish.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Wait until a probe has started.
    pub async fn wait_started(&self) {
        if let Ok(permit) = self.started.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl BlocklistProber for GatedProber {
    async fn probe(&self, _domain: &str, _ip: &str) -> Result<Vec<ProbeHit>, ProbeError> {
        self.started.add_permits(1);
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(Vec::new())
            }
            Err(_) => Err(ProbeError::Cancelled),
        }
    }
}
