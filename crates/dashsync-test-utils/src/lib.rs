//! Testing utilities for dashsync workspace
//!
//! Scripted collaborator double and payload fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use dashsync_model::{DomainFetcher, DomainKey, FetchError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted reply
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub reply: Result<Value, FetchError>,
}

impl Step {
    pub fn ok(value: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Ok(value),
        }
    }

    pub fn err(error: FetchError) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Err(error),
        }
    }

    /// Reply only after `delay` (cancellable)
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Script {
    steps: HashMap<DomainKey, VecDeque<Step>>,
    calls: HashMap<DomainKey, usize>,
    signals: HashMap<DomainKey, CancellationToken>,
}

/// In-memory [`DomainFetcher`] answering from per-key queues
///
/// Each key pops its next queued step; once the queue is empty the key's
/// fallback (or the global fallback) repeats. Keys with nothing scripted get
/// an HTTP 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<Script>,
    fallback: Mutex<HashMap<DomainKey, Step>>,
    default: Mutex<Option<Step>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot step for `key`
    #[must_use]
    pub fn then(self, key: DomainKey, step: Step) -> Self {
        self.script
            .lock()
            .steps
            .entry(key)
            .or_default()
            .push_back(step);
        self
    }

    /// Answer `key` with `step` whenever its queue is empty
    #[must_use]
    pub fn always(self, key: DomainKey, step: Step) -> Self {
        self.fallback.lock().insert(key, step);
        self
    }

    /// Answer every unscripted key with `step`
    #[must_use]
    pub fn otherwise(self, step: Step) -> Self {
        *self.default.lock() = Some(step);
        self
    }

    /// Calls made for `key`
    pub fn calls(&self, key: &DomainKey) -> usize {
        self.script.lock().calls.get(key).copied().unwrap_or(0)
    }

    /// Calls made for every key
    pub fn total_calls(&self) -> usize {
        self.script.lock().calls.values().sum()
    }

    /// Signal handed to the most recent call for `key`
    pub fn last_signal(&self, key: &DomainKey) -> Option<CancellationToken> {
        self.script.lock().signals.get(key).cloned()
    }

    fn next_step(&self, key: &DomainKey, signal: CancellationToken) -> Step {
        let queued = {
            let mut script = self.script.lock();
            *script.calls.entry(key.clone()).or_default() += 1;
            script.signals.insert(key.clone(), signal);
            script.steps.get_mut(key).and_then(VecDeque::pop_front)
        };
        queued
            .or_else(|| self.fallback.lock().get(key).cloned())
            .or_else(|| self.default.lock().clone())
            .unwrap_or_else(|| Step::err(FetchError::not_found(format!("{key} not scripted"))))
    }
}

#[async_trait]
impl DomainFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &DomainKey, signal: CancellationToken) -> Result<Value, FetchError> {
        let step = self.next_step(key, signal.clone());
        if !step.delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(step.delay) => {}
                () = signal.cancelled() => {
                    return Err(FetchError::Cancelled(format!("{key} aborted")));
                }
            }
        }
        step.reply
    }
}

/// `{ "data": [...] }` with `n` rows
pub fn rows_payload(n: usize) -> Value {
    let rows: Vec<Value> = (0..n)
        .map(|i| json!({ "id": i, "activity": format!("activity-{i}"), "progressPct": 50 }))
        .collect();
    json!({ "data": rows })
}

/// `{ "insights": ... }`
pub fn insights_payload() -> Value {
    json!({ "insights": { "summary": "on track", "risks": ["weather"] } })
}

/// Monthly index over `months`, latest last
pub fn index_payload(months: &[&str]) -> Value {
    let meta: serde_json::Map<String, Value> = months
        .iter()
        .map(|m| ((*m).to_string(), json!({ "rows": 2 })))
        .collect();
    json!({
        "months": months,
        "latestMonth": months.last(),
        "metaByMonth": meta,
    })
}

/// Snapshot for `month` with two rows
pub fn snapshot_payload(month: &str) -> Value {
    json!({
        "month": month,
        "snapshot": {
            "rows": [
                { "id": 1, "progressPct": 40 },
                { "id": 2, "progressPct": 60 }
            ],
            "summary": {
                "totalRows": 2,
                "avgProgressPct": 50.0,
                "totalManpower": 12
            }
        }
    })
}
