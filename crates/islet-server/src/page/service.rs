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

use crate::governor::RenderGovernor;
use crate::page::assembler::PageAssembler;
use crate::page::session::{cookie_value, session_payload, SESSION_COOKIE};
use crate::routing::DataFetcher;
use crate::runtime::Render;
use islet_common::{IsletError, LocaleSet, Result, SsrPayload};
use islet_metrics::{RenderMetricsCollector, RenderOutcome};
use std::sync::Arc;
use uuid::Uuid;

/// The parts of an HTTP request the page service needs.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub cookie: Option<String>,
    pub host: Option<String>,
    pub forwarded_proto: Option<String>,
    pub tls: bool,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_forwarded_proto(mut self, proto: impl Into<String>) -> Self {
        self.forwarded_proto = Some(proto.into());
        self
    }

    /// `scheme://host` as seen by the client, honoring the first value of
    /// `X-Forwarded-Proto`. `None` without a host.
    pub fn origin(&self) -> Option<String> {
        let host = self.host.as_deref().filter(|h| !h.is_empty())?;
        let mut scheme = if self.tls { "https" } else { "http" };
        if let Some(proto) = self.forwarded_proto.as_deref() {
            let first = proto.split(',').next().unwrap_or_default().trim();
            if !first.is_empty() {
                scheme = first;
            }
        }
        Some(format!("{}://{}", scheme, host))
    }
}

/// How a page was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Rendered,
    /// Rendering failed; the client-only document was served instead.
    Fallback { request_id: String },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub html: String,
    pub outcome: PageOutcome,
}

/// Turns page requests into complete HTML documents.
///
/// Pipeline: data fetch, payload augmentation (session, locale, origin),
/// budgeted render, assembly. Render failures of any kind produce the
/// fallback document; only data-fetch failures surface as errors.
pub struct PageService {
    fetcher: Arc<dyn DataFetcher>,
    renderer: Arc<dyn Render>,
    governor: RenderGovernor,
    assembler: PageAssembler,
    locales: LocaleSet,
    metrics: RenderMetricsCollector,
}

impl PageService {
    pub fn new(
        fetcher: Arc<dyn DataFetcher>,
        renderer: Arc<dyn Render>,
        governor: RenderGovernor,
        assembler: PageAssembler,
        locales: LocaleSet,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            governor,
            assembler,
            locales,
            metrics: RenderMetricsCollector::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: RenderMetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &RenderMetricsCollector {
        &self.metrics
    }

    pub fn locales(&self) -> &LocaleSet {
        &self.locales
    }

    /// Runs the data-fetch step alone, for client-side navigation.
    pub async fn fetch_payload(&self, path: &str, query: &str) -> Result<Option<SsrPayload>> {
        self.fetcher.fetch(path, query).await
    }

    /// Builds the payload a render receives: handler output plus the
    /// `session`, `locale` and `siteOrigin` keys.
    pub async fn build_payload(&self, request: &PageRequest) -> Result<SsrPayload> {
        let mut payload = self
            .fetcher
            .fetch(&request.path, &request.query)
            .await?
            .unwrap_or_default();

        let session = request
            .cookie
            .as_deref()
            .and_then(|header| cookie_value(header, SESSION_COOKIE))
            .and_then(session_payload);
        if let Some(session) = session {
            payload.insert("session", session);
        }

        payload.insert("locale", self.locales.from_path(&request.path));

        if let Some(origin) = request.origin() {
            payload.insert("siteOrigin", origin);
        }

        Ok(payload)
    }

    /// Renders the page for `request`.
    ///
    /// # Errors
    ///
    /// Only data-fetch failures are returned; they should become HTTP 500.
    pub async fn render_page(&self, request: &PageRequest) -> Result<Page> {
        let guard = self.metrics.begin();

        let payload = match self.build_payload(request).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(path = %request.path, error = %e, "data fetch failed");
                guard.finish(RenderOutcome::DataFetchFailed);
                return Err(match e {
                    IsletError::DataFetch(_) => e,
                    other => IsletError::DataFetch(other.to_string()),
                });
            }
        };
        let locale = self.locales.from_path(&request.path);

        let rendered = self
            .governor
            .render_with_budget(self.renderer.clone(), render_path(&request.path), payload.clone())
            .await;

        match rendered {
            Ok(rendered) => {
                guard.finish(RenderOutcome::Rendered);
                Ok(Page {
                    html: self.assembler.assemble(&rendered, &payload, Some(locale)),
                    outcome: PageOutcome::Rendered,
                })
            }
            Err(e) => {
                let request_id = Uuid::new_v4().to_string();
                tracing::warn!(
                    request_id = %request_id,
                    path = %request.path,
                    error = %e,
                    "ssr render failed, serving fallback"
                );
                guard.finish(match e {
                    IsletError::Timeout(_) => RenderOutcome::Timeout,
                    IsletError::Fault(_) => RenderOutcome::Fault,
                    _ => RenderOutcome::Fallback,
                });

                Ok(Page {
                    html: self.assembler.fallback(&payload, Some(locale), &request_id),
                    outcome: PageOutcome::Fallback { request_id },
                })
            }
        }
    }
}

/// The path handed to the render entry, percent-decoded. Routing still sees
/// the raw path so captures are decoded exactly once.
fn render_path(path: &str) -> String {
    urlencoding::decode(path)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::RenderBudget;
    use crate::routing::{Route, RouteMatcher, RouteParams};
    use crate::runtime::RenderResult;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use futures::future::{BoxFuture, FutureExt};
    use serde_json::json;
    use std::time::Duration;

    const SHELL: &str = "<html><head></head><body><!--app-html--></body></html>";

    /// Echoes the payload keys it was given.
    struct KeysRenderer;

    impl Render for KeysRenderer {
        fn render(&self, path: String, payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>> {
            async move {
                let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
                Ok(RenderResult::new(format!("<main data-path=\"{}\">{}</main>", path, keys.join(",")), ""))
            }
            .boxed()
        }
    }

    struct StuckRenderer;

    impl Render for StuckRenderer {
        fn render(&self, _path: String, _payload: SsrPayload) -> BoxFuture<'static, Result<RenderResult>> {
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(RenderResult::default())
            }
            .boxed()
        }
    }

    fn service(renderer: Arc<dyn Render>, timeout: Duration) -> PageService {
        let routes = vec![
            Route::new("/hi/:name", |params: RouteParams, _query| {
                let name = params.get("name").unwrap_or_default().to_string();
                async move { Ok(json!({"greeting": format!("Hello, {}!", name)})) }
            }),
            Route::new("/broken", |_params, _query| async {
                Err::<serde_json::Value, _>(IsletError::DataFetch("db down".to_string()))
            }),
        ];
        PageService::new(
            Arc::new(RouteMatcher::new(routes).unwrap()),
            renderer,
            RenderGovernor::new(RenderBudget::new().with_timeout(timeout)),
            PageAssembler::new(SHELL),
            LocaleSet::default(),
        )
    }

    #[test]
    fn test_origin() {
        assert_eq!(PageRequest::new("/").origin(), None);
        assert_eq!(
            PageRequest::new("/").with_host("example.com").origin().as_deref(),
            Some("http://example.com")
        );
        assert_eq!(
            PageRequest::new("/")
                .with_host("example.com:8443")
                .with_forwarded_proto("https, http")
                .origin()
                .as_deref(),
            Some("https://example.com:8443")
        );
    }

    #[tokio::test]
    async fn test_payload_augmentation() {
        let token = STANDARD.encode(json!({"id": "1", "name": "Ada", "email": "ada@x.io", "provider": "github"}).to_string());
        let request = PageRequest::new("/zh-cn/hi/Li")
            .with_cookie(format!("theme=dark; session_token={}", token))
            .with_host("islet.test");

        let payload = service(Arc::new(KeysRenderer), Duration::from_secs(1))
            .build_payload(&request)
            .await
            .unwrap();
        assert_eq!(payload.get("locale"), Some(&json!("zh-CN")));
        assert_eq!(payload.get("siteOrigin"), Some(&json!("http://islet.test")));
        assert_eq!(payload.get("session").unwrap()["user"]["name"], json!("Ada"));
        assert!(payload.get("greeting").is_none());
    }

    #[tokio::test]
    async fn test_rendered_page() {
        let svc = service(Arc::new(KeysRenderer), Duration::from_secs(1));
        let page = svc.render_page(&PageRequest::new("/hi/Ada")).await.unwrap();

        assert_eq!(page.outcome, PageOutcome::Rendered);
        assert!(page.html.contains(r#"<main data-path="/hi/Ada">greeting,locale</main>"#));
        assert!(page.html.contains(r#"<html lang="en">"#));
        assert!(page.html.contains("Hello, Ada!"));
        assert_eq!(svc.metrics().snapshot().rendered, 1);
    }

    #[tokio::test]
    async fn test_render_sees_decoded_path() {
        let svc = service(Arc::new(KeysRenderer), Duration::from_secs(1));
        let page = svc
            .render_page(&PageRequest::new("/hi/%E5%B0%8F%20Li"))
            .await
            .unwrap();

        assert!(page.html.contains(r#"<main data-path="/hi/小 Li">"#));
        assert!(page.html.contains("Hello, 小 Li!"));
        assert_eq!(render_path("/bad/%FF"), "/bad/%FF");
    }

    #[tokio::test]
    async fn test_timeout_serves_fallback() {
        let svc = service(Arc::new(StuckRenderer), Duration::from_millis(30));
        let page = svc.render_page(&PageRequest::new("/hi/Ada")).await.unwrap();

        let PageOutcome::Fallback { request_id } = &page.outcome else {
            panic!("expected fallback, got {:?}", page.outcome);
        };
        assert!(page.html.contains(request_id.as_str()));
        assert!(page.html.contains(r#"<div id="app"></div>"#));
        assert!(page.html.contains("Hello, Ada!"));
        assert_eq!(svc.metrics().snapshot().timeouts, 1);
    }

    #[tokio::test]
    async fn test_data_fetch_failure_is_error() {
        let svc = service(Arc::new(KeysRenderer), Duration::from_secs(1));
        let err = svc.render_page(&PageRequest::new("/broken")).await.unwrap_err();

        assert!(matches!(err, IsletError::DataFetch(_)));
        assert_eq!(svc.metrics().snapshot().data_fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_unmatched_path_still_renders() {
        let svc = service(Arc::new(KeysRenderer), Duration::from_secs(1));
        let page = svc.render_page(&PageRequest::new("/about")).await.unwrap();
        assert!(page.html.contains(">locale</main>"));
    }
}
