//! Provider simulation harness.
//!
//! Drives a [`SyncProvider`] against a seeded, randomly slow and randomly
//! failing collaborator and reports what the coordinator did. Each round
//! issues, for every domain, a burst of overlapping loads: some plain, some
//! forced. The invariants checked at the end:
//! - nothing is left in flight
//! - no domain is left in `loading`
//! - every collaborator call was started by the coordinator

use async_trait::async_trait;
use dashsync_core::{CoordinatorStats, SyncConfig, SyncProvider};
use dashsync_model::{DomainFetcher, DomainKey, FetchError, Status};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Months requested from the snapshot endpoint; the last one does not exist
pub const SIMULATED_MONTHS: [&str; 3] = ["2025-08", "2025-09", "2025-13"];

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of load bursts
    pub rounds: u32,
    /// Loads per domain per burst
    pub burst: u32,
    /// Upper bound of simulated collaborator latency
    pub max_latency: Duration,
    /// Probability that a collaborator call fails with a 503
    pub failure_rate: f64,
    /// Probability that a load is forced
    pub force_rate: f64,
    /// Provider configuration
    pub sync: SyncConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rounds: 5,
            burst: 4,
            max_latency: Duration::from_millis(50),
            failure_rate: 0.1,
            force_rate: 0.2,
            sync: SyncConfig::default(),
        }
    }
}

/// Collaborator with seeded latency and failures
pub struct SimulatedFetcher {
    rng: Mutex<StdRng>,
    max_latency: Duration,
    failure_rate: f64,
    calls: AtomicU64,
}

impl SimulatedFetcher {
    /// Create fetcher
    pub fn new(seed: u64, max_latency: Duration, failure_rate: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            max_latency,
            failure_rate: probability(failure_rate),
            calls: AtomicU64::new(0),
        }
    }

    /// Calls made so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn draw(&self) -> (Duration, bool) {
        let mut rng = self.rng.lock();
        let max_ms = u64::try_from(self.max_latency.as_millis()).unwrap_or(u64::MAX);
        let latency = Duration::from_millis(rng.gen_range(0..=max_ms));
        (latency, rng.gen_bool(self.failure_rate))
    }
}

#[async_trait]
impl DomainFetcher for SimulatedFetcher {
    async fn fetch(&self, key: &DomainKey, signal: CancellationToken) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let (latency, fail) = self.draw();

        tokio::select! {
            () = tokio::time::sleep(latency) => {}
            () = signal.cancelled() => {
                return Err(FetchError::Cancelled(format!("{key} aborted")));
            }
        }

        if fail {
            return Err(FetchError::http(503, "simulated upstream failure"));
        }
        payload_for(key)
    }
}

fn payload_for(key: &DomainKey) -> Result<Value, FetchError> {
    let value = match key {
        DomainKey::Progress | DomainKey::Manpower | DomainKey::Risk => json!({
            "data": [
                { "id": 1, "activity": "excavation", "progressPct": 80 },
                { "id": 2, "activity": "formwork", "progressPct": 35 }
            ]
        }),
        DomainKey::AiInsights => json!({ "insights": { "summary": "schedule slipping on formwork" } }),
        DomainKey::MonthlyIndex => json!({
            "months": &SIMULATED_MONTHS[..2],
            "latestMonth": SIMULATED_MONTHS[1],
            "metaByMonth": {}
        }),
        DomainKey::MonthlySnapshot(month) => {
            if !month.is_calendar_month() {
                return Err(FetchError::not_found(format!("Snapshot for {month} not found")));
            }
            json!({
                "month": month.as_str(),
                "snapshot": {
                    "rows": [{ "id": 1, "progressPct": 57 }],
                    "summary": { "totalRows": 1, "avgProgressPct": 57.0, "totalManpower": 14 }
                }
            })
        }
    };
    Ok(value)
}

/// Clamp a rate into `0.0..=1.0`; non-finite rates count as zero
pub fn probability(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Keys exercised by the simulator
pub fn simulated_keys() -> Vec<DomainKey> {
    let mut keys: Vec<DomainKey> = DomainKey::fixed().into();
    keys.extend(
        SIMULATED_MONTHS
            .iter()
            .filter_map(|m| DomainKey::monthly_snapshot(m).ok()),
    );
    keys
}

/// Load outcome counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadTally {
    pub issued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub skipped: u64,
}

/// Cache counters at the end of the run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheSummary {
    pub entries: u64,
    pub fresh_hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
}

/// Final report from the simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub seed: u64,
    pub rounds: u32,
    pub collaborator_calls: u64,
    pub loads: LoadTally,
    pub coordinator: CoordinatorStats,
    pub cache: CacheSummary,
    pub error_notices: u64,
    pub left_in_flight: usize,
    pub final_status: BTreeMap<String, String>,
    pub violations: Vec<String>,
}

impl SimulatorReport {
    /// Check if simulation passed all invariants
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    pub fn generate_text(&self) -> String {
        let mut lines = vec![
            "=== dashsync simulation ===".to_string(),
            format!("Seed: {}", self.seed),
            format!("Rounds: {}", self.rounds),
            format!("Collaborator calls: {}", self.collaborator_calls),
            format!(
                "Loads: {} issued, {} ok, {} failed, {} timed out, {} cancelled, {} skipped",
                self.loads.issued,
                self.loads.succeeded,
                self.loads.failed,
                self.loads.timed_out,
                self.loads.cancelled,
                self.loads.skipped
            ),
            format!(
                "Coordinator: {} started, {} coalesced, {} cache hits, {} superseded, {} failed",
                self.coordinator.started,
                self.coordinator.coalesced,
                self.coordinator.cache_hits,
                self.coordinator.superseded,
                self.coordinator.failed
            ),
            format!(
                "Cache: {} entries, {} fresh hits, {} stale hits, {} misses",
                self.cache.entries, self.cache.fresh_hits, self.cache.stale_hits, self.cache.misses
            ),
            format!("Error notices: {}", self.error_notices),
            String::new(),
            "Final status:".to_string(),
        ];
        for (key, status) in &self.final_status {
            lines.push(format!("  {key:<24} {status}"));
        }
        if !self.violations.is_empty() {
            lines.push(String::new());
            lines.push("Violations:".to_string());
            for (i, v) in self.violations.iter().enumerate() {
                lines.push(format!("  {}. {v}", i + 1));
            }
        }
        lines.push(String::new());
        lines.push(format!(
            "=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        lines.join("\n")
    }
}

/// Run the simulation
///
/// # Errors
/// Fails if the provider configuration is invalid.
pub async fn run_simulator(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    let fetcher = Arc::new(SimulatedFetcher::new(
        config.seed,
        config.max_latency,
        config.failure_rate,
    ));
    let provider = SyncProvider::create(config.sync.clone(), Arc::clone(&fetcher))?;
    let mut notices = provider.notifications();
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let keys = simulated_keys();
    let mut loads = LoadTally::default();

    for round in 0..config.rounds {
        let mut handles = Vec::new();
        for key in &keys {
            for _ in 0..config.burst {
                let force = rng.gen_bool(probability(config.force_rate));
                let provider = provider.clone();
                let key = key.clone();
                handles.push(tokio::spawn(async move { provider.load(&key, force).await }));
            }
        }
        loads.issued += handles.len() as u64;

        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => loads.succeeded += 1,
                Ok(Err(e)) if e.is_cancelled() => loads.cancelled += 1,
                Ok(Err(e)) if e.is_timeout() => loads.timed_out += 1,
                Ok(Err(_)) => loads.failed += 1,
                Err(_) => loads.skipped += 1,
            }
        }
        info!(round, in_flight = provider.in_flight_count(), "round complete");
    }

    let mut error_notices = 0;
    loop {
        match notices.try_recv() {
            Ok(_) => error_notices += 1,
            Err(TryRecvError::Lagged(n)) => error_notices += n,
            Err(_) => break,
        }
    }

    let coordinator = provider.coordinator_stats();
    let cache_stats = provider.cache_stats();
    let left_in_flight = provider.in_flight_count();
    let final_status: BTreeMap<String, String> = keys
        .iter()
        .map(|key| (key.to_string(), provider.state(key).status().to_string()))
        .collect();

    let mut violations = Vec::new();
    if left_in_flight != 0 {
        violations.push(format!("{left_in_flight} fetches left in flight"));
    }
    for key in &keys {
        if provider.state(key).status() == Status::Loading {
            violations.push(format!("{key} left in loading"));
        }
    }
    if fetcher.calls() > coordinator.started {
        violations.push(format!(
            "{} collaborator calls for {} coordinator starts",
            fetcher.calls(),
            coordinator.started
        ));
    }

    provider.dispose();

    Ok(SimulatorReport {
        seed: config.seed,
        rounds: config.rounds,
        collaborator_calls: fetcher.calls(),
        loads,
        coordinator,
        cache: CacheSummary {
            entries: cache_stats.entry_count,
            fresh_hits: cache_stats.fresh_hits,
            stale_hits: cache_stats.stale_hits,
            misses: cache_stats.misses,
        },
        error_notices,
        left_in_flight,
        final_status,
        violations,
    })
}
