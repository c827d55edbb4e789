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

//! Concurrency and time budget for renders.
//!
//! Every render runs under a [`RenderBudget`]: a cap on how many renders may
//! execute at once across the whole process, and a wall-clock timeout per
//! render measured from the moment the request asks for a render (time spent
//! waiting for a slot counts against it).

use crate::runtime::{Render, RenderInterest, RenderResult};
use islet_common::{IsletError, Result, SsrPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Limits applied to each render.
///
/// # Fields
///
/// - `timeout` - Maximum wall-clock time for one render (default: 3 seconds)
/// - `max_parallel` - Maximum renders in flight at once; `0` means unbounded
///   (default: available parallelism)
///
/// # Example
///
/// ```
/// use islet_server::RenderBudget;
/// use std::time::Duration;
///
/// let budget = RenderBudget::new()
///     .with_timeout(Duration::from_millis(500))
///     .with_max_parallel(4);
/// assert!(budget.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBudget {
    pub timeout: Duration,
    pub max_parallel: usize,
}

impl Default for RenderBudget {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_parallel: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl RenderBudget {
    /// Creates a budget with default values.
    ///
    /// ```
    /// use islet_server::RenderBudget;
    ///
    /// let budget = RenderBudget::new();
    /// assert_eq!(budget.timeout.as_millis(), 3000);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-render timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the global render cap. `0` disables the cap.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Validates the budget.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the timeout is zero or longer than one hour.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(IsletError::InvalidConfig(
                "render timeout must be greater than 0".to_string(),
            ));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(IsletError::InvalidConfig(format!(
                "render timeout must not exceed {} seconds",
                MAX_TIMEOUT.as_secs()
            )));
        }
        Ok(())
    }
}

/// Enforces a [`RenderBudget`] around any [`Render`] implementation.
///
/// The render itself runs in a spawned task. When the timeout fires the
/// caller gets [`IsletError::Timeout`] right away. A render that already
/// started keeps its global slot and its isolate lease until the script
/// finishes; one still queued for a slot or a lease is dropped once it gets
/// there. An isolate is
/// therefore never handed to another request while a timed-out render is
/// still executing on it; runaway scripts are cut off by the isolate's loop
/// and recursion limits.
pub struct RenderGovernor {
    budget: RenderBudget,
    slots: Option<Arc<Semaphore>>,
}

impl RenderGovernor {
    /// A zero timeout falls back to the default of three seconds.
    pub fn new(mut budget: RenderBudget) -> Self {
        if budget.timeout.is_zero() {
            budget.timeout = DEFAULT_TIMEOUT;
        }
        let slots = (budget.max_parallel > 0).then(|| Arc::new(Semaphore::new(budget.max_parallel)));
        Self { budget, slots }
    }

    pub fn budget(&self) -> &RenderBudget {
        &self.budget
    }

    /// Free global render slots, or `None` when unbounded.
    pub fn available_slots(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }

    /// Renders `path` through `renderer` within the budget.
    ///
    /// # Errors
    ///
    /// - `Timeout` if the render (including slot wait) outlives the timeout
    /// - `Fault` if the render task panicked or was cancelled
    /// - whatever the renderer itself returned
    pub async fn render_with_budget(
        &self,
        renderer: Arc<dyn Render>,
        path: String,
        payload: SsrPayload,
    ) -> Result<RenderResult> {
        let slots = self.slots.clone();
        let interest = RenderInterest::new();
        let task_interest = interest.clone();
        let task = tokio::spawn(async move {
            let _slot = match slots {
                Some(slots) => Some(slots.acquire_owned().await.map_err(|e| {
                    IsletError::Fault(format!("Failed to acquire render slot: {}", e))
                })?),
                None => None,
            };
            renderer.render_for(path, payload, task_interest).await
        });

        let outcome = tokio::time::timeout(self.budget.timeout, task).await;
        if outcome.is_err() {
            interest.abandon();
        }
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    "render task panicked".to_string()
                } else {
                    format!("render task failed: {}", join_error)
                };
                Err(IsletError::Fault(message))
            }
            Err(_) => Err(IsletError::Timeout(self.budget.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for a fixed delay and records peak concurrency.
    struct SlowRenderer {
        delay: Duration,
        started: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl SlowRenderer {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                started: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }
    }

    #[derive(Clone)]
    struct SharedSlow(Arc<SlowRenderer>);

    impl Render for SharedSlow {
        fn render(&self, path: String, _payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>> {
            let inner = self.0.clone();
            async move {
                inner.started.fetch_add(1, Ordering::SeqCst);
                let now = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
                inner.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(inner.delay).await;
                inner.active.fetch_sub(1, Ordering::SeqCst);
                inner.finished.fetch_add(1, Ordering::SeqCst);
                Ok(RenderResult::new(format!("<p>{}</p>", path), ""))
            }
            .boxed()
        }
    }

    struct FailingRenderer;

    impl Render for FailingRenderer {
        fn render(&self, _path: String, _payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>> {
            async { Err(IsletError::JavaScriptExecution("render entry: boom".to_string())) }.boxed()
        }
    }

    struct PanickingRenderer;

    impl Render for PanickingRenderer {
        fn render(&self, _path: String, _payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>> {
            async { panic!("renderer exploded") }.boxed()
        }
    }

    #[test]
    fn test_budget_validation() {
        assert!(RenderBudget::new().validate().is_ok());
        assert!(RenderBudget::new().with_timeout(Duration::ZERO).validate().is_err());
        assert!(RenderBudget::new()
            .with_timeout(Duration::from_secs(7200))
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let governor = RenderGovernor::new(RenderBudget::new().with_timeout(Duration::ZERO));
        assert_eq!(governor.budget().timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_unbounded_has_no_slots() {
        let governor = RenderGovernor::new(RenderBudget::new().with_max_parallel(0));
        assert_eq!(governor.available_slots(), None);
    }

    #[tokio::test]
    async fn test_render_within_budget() {
        let governor = RenderGovernor::new(RenderBudget::new().with_max_parallel(2));
        let renderer = SharedSlow(SlowRenderer::new(Duration::from_millis(5)));

        let result = governor
            .render_with_budget(Arc::new(renderer), "/a".to_string(), SsrPayload::new())
            .await
            .unwrap();
        assert_eq!(result.html, "<p>/a</p>");
        assert_eq!(governor.available_slots(), Some(2));
    }

    #[tokio::test]
    async fn test_timeout() {
        let governor = RenderGovernor::new(
            RenderBudget::new().with_timeout(Duration::from_millis(20)),
        );
        let slow = SlowRenderer::new(Duration::from_millis(500));

        let err = governor
            .render_with_budget(Arc::new(SharedSlow(slow)), "/".to_string(), SsrPayload::new())
            .await
            .unwrap_err();
        match err {
            IsletError::Timeout(after) => assert_eq!(after, Duration::from_millis(20)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timed_out_render_keeps_slot_until_done() {
        let governor = RenderGovernor::new(
            RenderBudget::new()
                .with_timeout(Duration::from_millis(20))
                .with_max_parallel(1),
        );
        let slow = SlowRenderer::new(Duration::from_millis(200));

        let err = governor
            .render_with_budget(Arc::new(SharedSlow(slow.clone())), "/".to_string(), SsrPayload::new())
            .await;
        assert!(matches!(err, Err(IsletError::Timeout(_))));
        assert_eq!(governor.available_slots(), Some(0));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(slow.finished.load(Ordering::SeqCst), 1);
        assert_eq!(governor.available_slots(), Some(1));
    }

    #[tokio::test]
    async fn test_timed_out_callers_do_not_queue_renders() {
        let governor = RenderGovernor::new(
            RenderBudget::new()
                .with_timeout(Duration::from_millis(20))
                .with_max_parallel(1),
        );
        let slow = SlowRenderer::new(Duration::from_millis(200));

        for i in 0..6 {
            let err = governor
                .render_with_budget(
                    Arc::new(SharedSlow(slow.clone())),
                    format!("/{}", i),
                    SsrPayload::new(),
                )
                .await;
            assert!(matches!(err, Err(IsletError::Timeout(_))));
        }
        assert_eq!(slow.started.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(slow.started.load(Ordering::SeqCst), 1);
        assert_eq!(slow.finished.load(Ordering::SeqCst), 1);
        assert_eq!(governor.available_slots(), Some(1));
    }

    #[tokio::test]
    async fn test_parallelism_is_capped() {
        let governor = Arc::new(RenderGovernor::new(
            RenderBudget::new()
                .with_timeout(Duration::from_secs(10))
                .with_max_parallel(2),
        ));
        let slow = SlowRenderer::new(Duration::from_millis(30));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let governor = governor.clone();
            let renderer: Arc<dyn Render> = Arc::new(SharedSlow(slow.clone()));
            tasks.push(tokio::spawn(async move {
                governor
                    .render_with_budget(renderer, format!("/{}", i), SsrPayload::new())
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(slow.finished.load(Ordering::SeqCst), 8);
        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_renderer_error_passes_through() {
        let governor = RenderGovernor::new(RenderBudget::new());
        let err = governor
            .render_with_budget(Arc::new(FailingRenderer), "/".to_string(), SsrPayload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IsletError::JavaScriptExecution(_)));
    }

    #[tokio::test]
    async fn test_panic_becomes_fault() {
        let governor = RenderGovernor::new(RenderBudget::new().with_max_parallel(1));
        let err = governor
            .render_with_budget(Arc::new(PanickingRenderer), "/".to_string(), SsrPayload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IsletError::Fault(_)));
        assert_eq!(governor.available_slots(), Some(1));
    }
}
