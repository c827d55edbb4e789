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

use serde::{Deserialize, Serialize};

/// Static information about a running Islet server, served at `/_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_type: String,
    pub version: String,
    pub uptime_ms: u64,
}

impl ServerInfo {
    pub fn new(uptime_ms: u64) -> Self {
        Self {
            server_type: "ssr".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms,
        }
    }
}

/// Latency summary in microseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatencySummary {
    pub avg_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

/// Point-in-time view of the execution context pool
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub leased: usize,
    pub created: u64,
    pub discarded: u64,
}

/// Complete render metrics snapshot, served at `/_metrics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub rendered: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    pub faults: u64,
    pub data_fetch_failures: u64,
    pub in_flight: u64,
    pub uptime_ms: u64,
    pub latency: LatencySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

impl MetricsSnapshot {
    pub fn with_pool(mut self, pool: PoolStats) -> Self {
        self.pool = Some(pool);
        self
    }
}
