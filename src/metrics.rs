// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for finance-sync.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host
//! application picks the exporter.
//!
//! # Metric Naming Convention
//! - `finance_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: local, remote, backend
//! - `operation`: get, set, fetch, put, pull, push
//! - `status`: hit, miss, success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

pub const TIER_LOCAL: &str = "local";
pub const TIER_REMOTE: &str = "remote";
pub const TIER_BACKEND: &str = "backend";

/// Record a tier operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "finance_sync_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "finance_sync_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Collections waiting for a backend push
pub fn set_pending_writes(count: usize) {
    gauge!("finance_sync_pending_writes").set(count as f64);
}

/// Record a push pass and how many collections it carried
pub fn record_push(collections: usize, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("finance_sync_push_total", "status" => status).increment(1);
    if success {
        histogram!("finance_sync_push_collections").record(collections as f64);
    }
}

/// Cloud storage chunk set found with a missing fragment
pub fn record_incomplete_chunk_set(key: &str) {
    counter!(
        "finance_sync_incomplete_chunk_sets_total",
        "key" => key.to_string()
    )
    .increment(1);
}

/// Mirror write to cloud storage failed
pub fn record_mirror_failure(key: &str) {
    counter!(
        "finance_sync_mirror_failures_total",
        "key" => key.to_string()
    )
    .increment(1);
}

/// Timer guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}
