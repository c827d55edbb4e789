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

use crate::runtime::pool::ContextPool;
use boa_engine::{
    builtins::promise::PromiseState, object::builtins::JsPromise, Context, JsString, JsValue,
    Source,
};
use futures::future::{BoxFuture, FutureExt};
use islet_common::escape::js_escape_string;
use islet_common::{IsletError, Result, SsrPayload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global the render bundle reads its data from.
pub const DATA_GLOBAL: &str = "__SSR_DATA__";
/// Global the render bundle may assign head markup to.
pub const HEAD_GLOBAL: &str = "__SSR_HEAD__";

const RESET_GLOBALS: &str = "globalThis.__SSR_DATA__ = undefined; globalThis.__SSR_HEAD__ = undefined;";

/// Output of one render: the application body markup and the head markup the
/// bundle published through `__SSR_HEAD__` (empty when it published none).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub html: String,
    pub head: String,
}

impl RenderResult {
    pub fn new(html: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            head: head.into(),
        }
    }
}

/// Shared flag raised when the caller of a render stops waiting for it.
///
/// A render that has not started yet checks the flag and skips the work; a
/// render already running on an isolate is left to finish.
#[derive(Debug, Clone, Default)]
pub struct RenderInterest {
    abandoned: Arc<AtomicBool>,
}

impl RenderInterest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

/// Something that can turn a request path and its payload into markup.
///
/// The production implementation is [`PoolRenderer`]; the governor only sees
/// this trait, which keeps budget enforcement testable with instrumented
/// renderers.
pub trait Render: Send + Sync + 'static {
    fn render(&self, path: String, payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>>;

    /// Like [`render`](Self::render), but skips work nobody waits for any
    /// more once `interest` is abandoned.
    fn render_for(
        &self,
        path: String,
        payload: SsrPayload,
        interest: RenderInterest,
    ) -> BoxFuture<'static, Result<RenderResult>> {
        if interest.is_abandoned() {
            return futures::future::ready(Err(abandoned_error())).boxed();
        }
        self.render(path, payload)
    }
}

pub(crate) fn abandoned_error() -> IsletError {
    IsletError::Fault("render abandoned before it started".to_string())
}

/// Renders on isolates leased from a [`ContextPool`].
///
/// A lease whose isolate faulted is discarded instead of being returned to the
/// pool.
#[derive(Clone)]
pub struct PoolRenderer {
    pool: ContextPool,
}

impl PoolRenderer {
    pub fn new(pool: ContextPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }
}

impl Render for PoolRenderer {
    fn render(&self, path: String, payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>> {
        self.render_for(path, payload, RenderInterest::new())
    }

    fn render_for(
        &self,
        path: String,
        payload: SsrPayload,
        interest: RenderInterest,
    ) -> BoxFuture<'static, Result<RenderResult>> {
        let pool = self.pool.clone();
        async move {
            let mut lease = pool.acquire().await?;
            if interest.is_abandoned() {
                tracing::debug!(path = %path, "caller gone, skipping render");
                return Err(abandoned_error());
            }
            let result = lease.render(path, payload).await;
            if matches!(result, Err(IsletError::Fault(_))) {
                lease.discard();
            }
            result
        }
        .boxed()
    }
}

fn eval(ctx: &mut Context, script: &str, stage: &str) -> Result<JsValue> {
    ctx.eval(Source::from_bytes(script))
        .map_err(|e| IsletError::JavaScriptExecution(format!("{}: {}", stage, e)))
}

fn value_to_string(ctx: &mut Context, value: &JsValue, stage: &str) -> Result<String> {
    value
        .to_string(ctx)
        .map(|s| s.to_std_string_escaped())
        .map_err(|e| IsletError::JavaScriptExecution(format!("{}: {}", stage, e)))
}

/// Drives a promise returned by the entry function to settlement.
///
/// Only the microtask queue is drained; a promise that is still pending once
/// the queue is empty can never settle inside this isolate, so it is reported
/// as an error instead of being waited on.
fn settle(ctx: &mut Context, value: JsValue) -> Result<JsValue> {
    let promise = value
        .as_object()
        .and_then(|object| JsPromise::from_object(object.clone()).ok());
    let Some(promise) = promise else {
        return Ok(value);
    };
    ctx.run_jobs();

    match promise.state() {
        PromiseState::Fulfilled(value) => Ok(value),
        PromiseState::Rejected(reason) => {
            let reason = value_to_string(ctx, &reason, "render promise")?;
            Err(IsletError::JavaScriptExecution(format!(
                "render promise rejected: {}",
                reason
            )))
        }
        PromiseState::Pending => Err(IsletError::JavaScriptExecution(
            "render promise still pending after the job queue drained".to_string(),
        )),
    }
}

/// Renders `path` inside an initialized context.
///
/// Both globals are reset first so nothing from a previous render on the same
/// context is visible. A non-empty payload is published as `__SSR_DATA__`
/// before the entry function is called with the path.
pub(crate) fn render_in_context(
    ctx: &mut Context,
    entry: &str,
    path: &str,
    payload: &SsrPayload,
) -> Result<RenderResult> {
    eval(ctx, RESET_GLOBALS, "global reset")?;

    if !payload.is_empty() {
        let json = payload.to_json()?;
        let script = format!(
            "globalThis.{} = JSON.parse(\"{}\");",
            DATA_GLOBAL,
            js_escape_string(&json)
        );
        eval(ctx, &script, "data injection")?;
    }

    let quoted_path = serde_json::to_string(path)?;
    let value = eval(ctx, &format!("{}({})", entry, quoted_path), "render entry")?;
    let value = settle(ctx, value)?;
    let html = value_to_string(ctx, &value, "render result")?;

    let head = ctx
        .global_object()
        .get(JsString::from(HEAD_GLOBAL), ctx)
        .map_err(|e| IsletError::JavaScriptExecution(format!("head read: {}", e)))?;
    let head = if head.is_null_or_undefined() {
        String::new()
    } else {
        value_to_string(ctx, &head, "head read")?
    };

    tracing::debug!(path, html_len = html.len(), head_len = head.len(), "render complete");
    Ok(RenderResult { html, head })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{IsolateConfig, PoolConfig};
    use serde_json::json;

    fn context_with(bundle: &str) -> Context {
        let mut ctx = Context::default();
        ctx.eval(Source::from_bytes(bundle)).unwrap();
        ctx
    }

    fn payload(value: serde_json::Value) -> SsrPayload {
        SsrPayload::from_serialize(&value).unwrap()
    }

    #[test]
    fn test_sync_entry() {
        let mut ctx = context_with(
            r#"function ssrRender(url) {
                globalThis.__SSR_HEAD__ = "<title>" + url + "</title>";
                return "<p>" + __SSR_DATA__.greeting + "</p>";
            }"#,
        );

        let result =
            render_in_context(&mut ctx, "ssrRender", "/hi/Ada", &payload(json!({"greeting": "Hello"})))
                .unwrap();
        assert_eq!(result.html, "<p>Hello</p>");
        assert_eq!(result.head, "<title>/hi/Ada</title>");
    }

    #[test]
    fn test_async_entry_resolves() {
        let mut ctx = context_with(
            r#"async function ssrRender(url) {
                const body = await Promise.resolve("<main>" + url + "</main>");
                return body;
            }"#,
        );

        let result = render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).unwrap();
        assert_eq!(result.html, "<main>/</main>");
        assert_eq!(result.head, "");
    }

    #[test]
    fn test_plain_object_result_is_not_awaited() {
        let mut ctx = context_with(
            "function ssrRender() { return { toString: function () { return '<b>obj</b>'; } }; }",
        );

        let result = render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).unwrap();
        assert_eq!(result.html, "<b>obj</b>");
    }

    #[test]
    fn test_rejected_promise_is_execution_error() {
        let mut ctx = context_with(r#"async function ssrRender() { throw new Error("boom"); }"#);

        let err = render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).unwrap_err();
        match err {
            IsletError::JavaScriptExecution(message) => assert!(message.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_never_settling_promise_is_error() {
        let mut ctx = context_with("function ssrRender() { return new Promise(() => {}); }");

        let err = render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).unwrap_err();
        assert!(matches!(err, IsletError::JavaScriptExecution(_)));
    }

    #[test]
    fn test_thrown_error_names_stage() {
        let mut ctx = context_with("function ssrRender() { throw new TypeError('bad'); }");

        let err = render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).unwrap_err();
        assert!(err.to_string().contains("render entry"));
    }

    #[test]
    fn test_missing_entry_is_error() {
        let mut ctx = context_with("var unrelated = 1;");
        assert!(render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).is_err());
    }

    #[test]
    fn test_globals_reset_between_renders() {
        let mut ctx = context_with(
            r#"function ssrRender() {
                if (globalThis.__SSR_DATA__ === undefined) { return "none"; }
                globalThis.__SSR_HEAD__ = "<meta>";
                return __SSR_DATA__.user;
            }"#,
        );

        let first =
            render_in_context(&mut ctx, "ssrRender", "/", &payload(json!({"user": "alice"}))).unwrap();
        assert_eq!(first.html, "alice");
        assert_eq!(first.head, "<meta>");

        let second = render_in_context(&mut ctx, "ssrRender", "/", &SsrPayload::new()).unwrap();
        assert_eq!(second.html, "none");
        assert_eq!(second.head, "");
    }

    #[test]
    fn test_payload_survives_hostile_strings() {
        let mut ctx = context_with("function ssrRender() { return __SSR_DATA__.text; }");
        let text = "</script><script>alert(\"x\")</script> \u{2028} 'quote' \\ done";

        let result =
            render_in_context(&mut ctx, "ssrRender", "/", &payload(json!({"text": text}))).unwrap();
        assert_eq!(result.html, text);
    }

    #[tokio::test]
    async fn test_abandoned_render_never_reaches_isolate() {
        let pool = ContextPool::new(
            IsolateConfig::new("var n = 0; function ssrRender() { n += 1; return String(n); }"),
            PoolConfig::default().with_pool_size(1),
        )
        .unwrap();
        let renderer = PoolRenderer::new(pool.clone());

        let held = pool.acquire().await.unwrap();
        let interest = RenderInterest::new();
        let queued = tokio::spawn(renderer.render_for(
            "/".to_string(),
            SsrPayload::new(),
            interest.clone(),
        ));
        interest.abandon();
        drop(held);

        let err = queued.await.unwrap().unwrap_err();
        assert!(matches!(err, IsletError::Fault(_)));

        let next = renderer.render("/".to_string(), SsrPayload::new()).await.unwrap();
        assert_eq!(next.html, "1");
        assert_eq!(pool.stats().discarded, 0);
    }

    #[test]
    fn test_path_is_passed_verbatim() {
        let mut ctx = context_with("function ssrRender(url) { return url; }");
        let path = "/hi/O\"Brien\\";

        let result = render_in_context(&mut ctx, "ssrRender", path, &SsrPayload::new()).unwrap();
        assert_eq!(result.html, path);
    }
}
