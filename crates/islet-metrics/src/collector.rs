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

use crate::registry::{MetricsRegistry, RenderOutcome};
use crate::snapshot::{MetricsSnapshot, ServerInfo};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for the page-rendering path.
///
/// Every page request is bracketed by [`RenderMetricsCollector::begin`], which
/// returns a guard tracking the in-flight gauge, and a final
/// [`RenderGuard::finish`] recording the outcome and latency.
///
/// # Example
///
/// ```rust
/// use islet_metrics::{RenderMetricsCollector, RenderOutcome};
///
/// let collector = RenderMetricsCollector::new();
/// let guard = collector.begin();
/// // ... fetch data, render, assemble ...
/// guard.finish(RenderOutcome::Rendered);
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.rendered, 1);
/// assert_eq!(snapshot.in_flight, 0);
/// ```
#[derive(Clone, Default)]
pub struct RenderMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl RenderMetricsCollector {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn begin(&self) -> RenderGuard {
        self.registry.enter();
        RenderGuard {
            registry: self.registry.clone(),
            start: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo::new(self.registry.uptime_ms())
    }
}

/// Tracks one in-flight page request.
///
/// Dropping the guard without calling [`finish`](RenderGuard::finish) (for
/// example when the connection is cancelled) only decrements the in-flight
/// gauge; no outcome is recorded.
pub struct RenderGuard {
    registry: Arc<MetricsRegistry>,
    start: Instant,
}

impl RenderGuard {
    pub fn finish(self, outcome: RenderOutcome) {
        let latency_us = self.start.elapsed().as_micros() as u64;
        self.registry.record(outcome, latency_us);
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.registry.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_in_flight() {
        let collector = RenderMetricsCollector::new();
        let first = collector.begin();
        let second = collector.begin();
        assert_eq!(collector.snapshot().in_flight, 2);

        first.finish(RenderOutcome::Rendered);
        assert_eq!(collector.snapshot().in_flight, 1);

        drop(second);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.total_requests, 1);
    }

    #[test]
    fn test_record_outcomes() {
        let collector = RenderMetricsCollector::new();
        collector.begin().finish(RenderOutcome::Fallback);
        collector.begin().finish(RenderOutcome::Fault);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.fallbacks, 1);
        assert_eq!(snapshot.faults, 1);
        assert_eq!(snapshot.total_requests, 2);
    }

    #[test]
    fn test_info_reports_version() {
        let collector = RenderMetricsCollector::new();
        let info = collector.info();
        assert_eq!(info.server_type, "ssr");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
