// Copyright 2025 Islet Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::snapshot::{LatencySummary, MetricsSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Nine bins per decade, covering 1µs up to 100s.
const BINS_PER_DECADE: usize = 9;
const NUM_DECADES: usize = 8;
const NUM_HISTOGRAM_BINS: usize = BINS_PER_DECADE * NUM_DECADES;

/// How a single page request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Server-rendered page delivered.
    Rendered,
    /// Render failed; the fallback page was delivered.
    Fallback,
    /// Render exceeded its time budget; the fallback page was delivered.
    Timeout,
    /// The script engine faulted; the fallback page was delivered.
    Fault,
    /// The data-fetch handler failed and the request was rejected.
    DataFetchFailed,
}

/// Logarithmic latency histogram for percentile estimation.
///
/// Each decade (1-10µs, 10-100µs, ...) is split into nine bins by leading
/// digit, so the relative error of a reported percentile stays below one
/// leading digit regardless of magnitude. Recording is lock-free.
#[derive(Debug)]
struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency: AtomicU64,
    sample_count: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_us: u64) {
        self.bins[Self::latency_to_bin(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.total_latency.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    fn latency_to_bin(latency_us: u64) -> usize {
        if latency_us == 0 {
            return 0;
        }
        let decade = latency_us.ilog10() as usize;
        let base = 10u64.pow(decade as u32);
        let leading = (latency_us / base).saturating_sub(1) as usize;
        (decade * BINS_PER_DECADE + leading).min(NUM_HISTOGRAM_BINS - 1)
    }

    /// Upper bound (exclusive) of a bin in microseconds.
    fn bin_upper_bound(bin: usize) -> u64 {
        let decade = (bin / BINS_PER_DECADE) as u32;
        let leading = (bin % BINS_PER_DECADE) as u64;
        10u64.pow(decade) * (leading + 2)
    }

    fn percentile(&self, p: f64) -> u64 {
        let counts: Vec<u64> = self.bins.iter().map(|b| b.load(Ordering::Relaxed)).collect();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return 0;
        }

        let target = ((total as f64) * p).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (bin, count) in counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                return Self::bin_upper_bound(bin);
            }
        }
        Self::bin_upper_bound(NUM_HISTOGRAM_BINS - 1)
    }

    fn summary(&self) -> LatencySummary {
        let count = self.sample_count.load(Ordering::Relaxed);
        let avg_us = if count == 0 {
            0
        } else {
            self.total_latency.load(Ordering::Relaxed) / count
        };

        LatencySummary {
            avg_us,
            p50_us: self.percentile(0.50),
            p95_us: self.percentile(0.95),
            p99_us: self.percentile(0.99),
        }
    }
}

/// Thread-safe storage for render metrics.
///
/// All counters are atomics; the registry is shared behind an `Arc` by the
/// page service and the HTTP router.
#[derive(Debug)]
pub struct MetricsRegistry {
    rendered: AtomicU64,
    fallbacks: AtomicU64,
    timeouts: AtomicU64,
    faults: AtomicU64,
    data_fetch_failures: AtomicU64,
    in_flight: AtomicU64,
    latency: LatencyHistogram,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            rendered: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            data_fetch_failures: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, outcome: RenderOutcome, latency_us: u64) {
        let counter = match outcome {
            RenderOutcome::Rendered => &self.rendered,
            RenderOutcome::Fallback => &self.fallbacks,
            RenderOutcome::Timeout => &self.timeouts,
            RenderOutcome::Fault => &self.faults,
            RenderOutcome::DataFetchFailed => &self.data_fetch_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.latency.record(latency_us);
    }

    pub(crate) fn enter(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let rendered = self.rendered.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);
        let timeouts = self.timeouts.load(Ordering::Relaxed);
        let faults = self.faults.load(Ordering::Relaxed);
        let data_fetch_failures = self.data_fetch_failures.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: rendered + fallbacks + timeouts + faults + data_fetch_failures,
            rendered,
            fallbacks,
            timeouts,
            faults,
            data_fetch_failures,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            uptime_ms: self.uptime_ms(),
            latency: self.latency.summary(),
            pool: None,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
