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

//! Islet Metrics Collection
//!
//! Lock-free render metrics for the Islet page server: outcome counters
//! (rendered, fallback, timeout, fault, data-fetch failure), an in-flight
//! gauge, and latency percentiles from a logarithmic histogram.
//!
//! # Components
//!
//! - [`RenderMetricsCollector`]: the handle the page service records through
//! - [`MetricsSnapshot`] / [`ServerInfo`]: serializable views served at the
//!   built-in `/_metrics` and `/_info` endpoints
//!
//! # Usage Example
//!
//! ```rust
//! use islet_metrics::{RenderMetricsCollector, RenderOutcome};
//!
//! let collector = RenderMetricsCollector::new();
//! collector.begin().finish(RenderOutcome::Timeout);
//! assert_eq!(collector.snapshot().timeouts, 1);
//! ```

mod collector;
mod registry;
mod snapshot;

pub use collector::{RenderGuard, RenderMetricsCollector};
pub use registry::RenderOutcome;
pub use snapshot::{LatencySummary, MetricsSnapshot, PoolStats, ServerInfo};
