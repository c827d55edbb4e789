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

use crate::runtime::isolate::{Isolate, IsolateConfig};
use crate::runtime::renderer::RenderResult;
use islet_common::{IsletError, Result, SsrPayload};
use islet_metrics::PoolStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Configuration for the context pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on isolates alive at once, idle or leased.
    pub pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl PoolConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(IsletError::InvalidConfig(
                "pool_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

struct PoolInner {
    idle: Mutex<Vec<Isolate>>,
    slots: Arc<Semaphore>,
    isolate_config: Arc<IsolateConfig>,
    config: PoolConfig,
    next_id: AtomicUsize,
    created: AtomicU64,
    discarded: AtomicU64,
}

impl PoolInner {
    /// Pops the most recently returned live isolate, dropping dead ones.
    fn take_idle(&self) -> Option<Isolate> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(isolate) = idle.pop() {
            if isolate.is_alive() {
                return Some(isolate);
            }
            self.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(isolate = isolate.id(), "dropping dead idle isolate");
        }
        None
    }

    fn put_back(&self, isolate: Isolate) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(isolate);
    }

    async fn create(&self) -> Result<Isolate> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let isolate = Isolate::spawn(id, self.isolate_config.clone()).await?;
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(isolate = id, "created isolate");
        Ok(isolate)
    }
}

/// Bounded, lazily-grown pool of isolates sharing one render bundle.
///
/// At most `pool_size` isolates exist at any moment. [`acquire`](Self::acquire)
/// waits for a free slot, then reuses an idle isolate or spawns a fresh one.
/// An isolate is leased by exactly one render at a time and returns to the
/// pool when its [`PooledIsolate`] guard is dropped.
#[derive(Clone)]
pub struct ContextPool {
    inner: Arc<PoolInner>,
}

impl ContextPool {
    pub fn new(isolate_config: IsolateConfig, config: PoolConfig) -> Result<Self> {
        isolate_config.validate()?;
        config.validate()?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(config.pool_size)),
                slots: Arc::new(Semaphore::new(config.pool_size)),
                isolate_config: Arc::new(isolate_config),
                config,
                next_id: AtomicUsize::new(0),
                created: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        })
    }

    /// Lease an isolate, waiting while all slots are taken.
    ///
    /// If a fresh isolate fails to initialize, the error is returned and the
    /// slot is released.
    pub async fn acquire(&self) -> Result<PooledIsolate> {
        let permit = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IsletError::Fault(format!("Failed to acquire pool slot: {}", e)))?;

        let isolate = match self.inner.take_idle() {
            Some(isolate) => isolate,
            None => self.inner.create().await?,
        };

        Ok(PooledIsolate {
            isolate: Some(isolate),
            pool: self.inner.clone(),
            discard: false,
            _permit: permit,
        })
    }

    /// Eagerly fill the pool up to its capacity.
    ///
    /// Returns the number of isolates now idle.
    pub async fn prewarm(&self) -> Result<usize> {
        let mut leases = Vec::with_capacity(self.capacity());
        for _ in 0..self.capacity() {
            leases.push(self.acquire().await?);
        }
        let warmed = leases.len();
        drop(leases);

        tracing::info!(isolates = warmed, "context pool prewarmed");
        Ok(warmed)
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.pool_size
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let capacity = self.capacity();

        PoolStats {
            capacity,
            idle,
            leased: capacity.saturating_sub(self.inner.slots.available_permits()),
            created: self.inner.created.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Guard that holds a leased isolate and returns it to the pool when dropped
pub struct PooledIsolate {
    isolate: Option<Isolate>,
    pool: Arc<PoolInner>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledIsolate {
    pub async fn render(&self, path: String, payload: SsrPayload) -> Result<RenderResult> {
        match &self.isolate {
            Some(isolate) => isolate.render(path, payload).await,
            None => Err(IsletError::Fault("lease has no isolate".to_string())),
        }
    }

    pub fn id(&self) -> Option<usize> {
        self.isolate.as_ref().map(Isolate::id)
    }

    /// Drop the isolate instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Drop for PooledIsolate {
    fn drop(&mut self) {
        // Runs before `_permit` is released, so a waiter woken by the permit
        // always finds this isolate already back in the idle list.
        let Some(isolate) = self.isolate.take() else {
            return;
        };

        if self.discard || !isolate.is_alive() {
            self.pool.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(isolate = isolate.id(), "discarding isolate");
        } else {
            self.pool.put_back(isolate);
        }
    }
}
