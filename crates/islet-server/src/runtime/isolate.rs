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

use crate::runtime::bindings;
use crate::runtime::renderer::{self, RenderResult};
use boa_engine::{Context, Source};
use islet_common::{IsletError, Result, SsrPayload};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Resource limits applied to every isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateLimits {
    /// Maximum iterations of any single loop before the script is aborted.
    pub loop_iteration_limit: u64,
    /// Maximum JavaScript call depth.
    pub recursion_limit: usize,
    /// Native stack size of the isolate thread in bytes.
    pub stack_size: usize,
}

impl Default for IsolateLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 10_000_000,
            recursion_limit: 512,
            stack_size: 8 * 1024 * 1024,
        }
    }
}

impl IsolateLimits {
    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.loop_iteration_limit == 0 {
            return Err(IsletError::InvalidConfig(
                "loop_iteration_limit must be greater than 0".to_string(),
            ));
        }
        if self.recursion_limit == 0 {
            return Err(IsletError::InvalidConfig(
                "recursion_limit must be greater than 0".to_string(),
            ));
        }
        if self.stack_size < 256 * 1024 {
            return Err(IsletError::InvalidConfig(format!(
                "stack_size must be at least 256 KiB (got {} bytes)",
                self.stack_size
            )));
        }
        Ok(())
    }
}

/// Everything an isolate needs to initialize itself: the bundle source, the
/// name of the global render entry, and its limits.
#[derive(Debug, Clone)]
pub struct IsolateConfig {
    pub bundle: Arc<str>,
    pub entry: String,
    pub limits: IsolateLimits,
}

impl IsolateConfig {
    pub fn new(bundle: impl Into<Arc<str>>) -> Self {
        Self {
            bundle: bundle.into(),
            entry: "ssrRender".to_string(),
            limits: IsolateLimits::default(),
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn with_limits(mut self, limits: IsolateLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The entry is spliced into a call expression, so it must be a plain or
    /// dotted identifier.
    pub fn validate(&self) -> Result<()> {
        if !is_entry_name(&self.entry) {
            return Err(IsletError::InvalidConfig(format!(
                "render entry `{}` is not a valid identifier path",
                self.entry
            )));
        }
        self.limits.validate()
    }
}

fn is_entry_name(entry: &str) -> bool {
    !entry.is_empty()
        && entry.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

struct RenderJob {
    path: String,
    payload: SsrPayload,
    reply: oneshot::Sender<Result<RenderResult>>,
}

/// Handle to a Boa context living on its own thread.
///
/// Boa contexts are neither `Send` nor `Sync`, so each one is created on and
/// never leaves a dedicated OS thread. The handle talks to that thread over a
/// channel and can be moved freely between tasks. Jobs are executed one at a
/// time in arrival order.
#[derive(Debug)]
pub struct Isolate {
    id: usize,
    jobs: mpsc::UnboundedSender<RenderJob>,
}

impl Isolate {
    /// Starts the isolate thread and waits until the bundle has been evaluated.
    pub async fn spawn(id: usize, config: Arc<IsolateConfig>) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let stack_size = config.limits.stack_size;

        std::thread::Builder::new()
            .name(format!("islet-isolate-{}", id))
            .stack_size(stack_size)
            .spawn(move || run_isolate(id, config, ready_tx, job_rx))
            .map_err(|e| IsletError::IsolateInit(format!("Failed to spawn isolate thread: {}", e)))?;

        ready_rx.await.map_err(|_| {
            IsletError::IsolateInit(format!("isolate {} exited during initialization", id))
        })??;

        tracing::debug!(isolate = id, "isolate ready");
        Ok(Self { id, jobs: job_tx })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// False once the isolate thread has exited, e.g. after a panic.
    pub fn is_alive(&self) -> bool {
        !self.jobs.is_closed()
    }

    pub async fn render(&self, path: impl Into<String>, payload: SsrPayload) -> Result<RenderResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = RenderJob {
            path: path.into(),
            payload,
            reply: reply_tx,
        };

        self.jobs
            .send(job)
            .map_err(|_| IsletError::Fault(format!("isolate {} is no longer running", self.id)))?;

        reply_rx.await.map_err(|_| {
            IsletError::Fault(format!("isolate {} dropped the render without replying", self.id))
        })?
    }
}

fn create_context(config: &IsolateConfig) -> Result<Context> {
    let mut ctx = Context::default();
    ctx.runtime_limits_mut()
        .set_loop_iteration_limit(config.limits.loop_iteration_limit);
    ctx.runtime_limits_mut()
        .set_recursion_limit(config.limits.recursion_limit);

    bindings::install_console(&mut ctx)?;

    ctx.eval(Source::from_bytes(config.bundle.as_bytes()))
        .map_err(|e| IsletError::IsolateInit(format!("Bundle evaluation error: {}", e)))?;

    let entry_check = format!("typeof {}", config.entry);
    let kind = ctx
        .eval(Source::from_bytes(&entry_check))
        .and_then(|value| value.to_string(&mut ctx))
        .map_err(|e| IsletError::IsolateInit(format!("Failed to resolve render entry: {}", e)))?
        .to_std_string_escaped();
    if kind != "function" {
        return Err(IsletError::IsolateInit(format!(
            "render entry `{}` is not a function (found {})",
            config.entry, kind
        )));
    }

    Ok(ctx)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_isolate(
    id: usize,
    config: Arc<IsolateConfig>,
    ready: oneshot::Sender<Result<()>>,
    mut jobs: mpsc::UnboundedReceiver<RenderJob>,
) {
    let mut ctx = match create_context(&config) {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Some(job) = jobs.blocking_recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            renderer::render_in_context(&mut ctx, &config.entry, &job.path, &job.payload)
        }));

        match outcome {
            Ok(result) => {
                let _ = job.reply.send(result);
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(isolate = id, path = %job.path, "isolate panicked during render: {}", message);
                let _ = job.reply.send(Err(IsletError::Fault(format!(
                    "isolate {} panicked: {}",
                    id, message
                ))));
                // The context may be inconsistent; exiting closes the channel
                // and the pool replaces this isolate.
                return;
            }
        }
    }

    tracing::debug!(isolate = id, "isolate shutting down");
}
