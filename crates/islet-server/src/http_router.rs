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

//! HTTP router for the Islet page server.
//!
//! # Routes
//!
//! | Path                    | Behavior                                            |
//! |-------------------------|-----------------------------------------------------|
//! | `/_metrics`, `/_info`   | built-in JSON introspection                         |
//! | `/__ssr_fetch/<path>`   | data-fetch payload for client-side navigation       |
//! | `/i/<invite_code>`      | stores the invite cookie and redirects to `/`       |
//! | `/assets/*`             | static client assets                                |
//! | anything else           | server-rendered page                                |
//!
//! In development mode every request other than the built-ins, the
//! data-fetch endpoint and invite links goes to the [`DevProxy`] instead.

use crate::dev_proxy::DevProxy;
use crate::page::{PageRequest, PageService};
use crate::routing::clean_path;
use crate::runtime::ContextPool;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, COOKIE, HOST, LOCATION, SET_COOKIE,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type HyperResponse = Response<Full<Bytes>>;

/// Prefix of the data-fetch endpoint.
pub const SSR_FETCH_PREFIX: &str = "/__ssr_fetch";
/// Cookie set by `/i/<invite_code>`.
pub const INVITE_COOKIE: &str = "invite_code";
const INVITE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HyperResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HyperResponse {
    match serde_json::to_vec(value) {
        Ok(body) => response(status, "application/json; charset=utf-8", body),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize JSON response");
            response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                "Internal Server Error",
            )
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("map") => "application/json; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: hyper::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// All `Cookie` headers joined into one header value.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}

/// Extracts what the page service needs from an HTTP request.
pub fn page_request<B>(req: &Request<B>) -> PageRequest {
    let headers = req.headers();
    PageRequest {
        path: req.uri().path().to_string(),
        query: req.uri().query().unwrap_or_default().to_string(),
        cookie: cookie_header(headers),
        host: header_str(headers, HOST)
            .map(str::to_string)
            .or_else(|| req.uri().authority().map(|a| a.to_string())),
        forwarded_proto: headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        tls: false,
    }
}

/// HTTP router for the page server.
pub struct SiteRouter {
    service: Arc<PageService>,
    assets_dir: Option<PathBuf>,
    pool: Option<ContextPool>,
    dev_proxy: Option<DevProxy>,
}

impl SiteRouter {
    pub fn new(service: Arc<PageService>) -> Self {
        Self {
            service,
            assets_dir: None,
            pool: None,
            dev_proxy: None,
        }
    }

    /// Serve `/assets/*` from `dir`.
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    /// Report statistics of `pool` at `/_metrics`.
    pub fn with_pool(mut self, pool: ContextPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_dev_proxy(mut self, proxy: DevProxy) -> Self {
        self.dev_proxy = Some(proxy);
        self
    }

    pub fn service(&self) -> &PageService {
        &self.service
    }

    pub fn is_dev(&self) -> bool {
        self.dev_proxy.is_some()
    }

    /// Routes one request.
    pub async fn handle(&self, req: Request<Incoming>) -> HyperResponse {
        let path = req.uri().path().to_string();

        match path.as_str() {
            "/_metrics" => return self.metrics(),
            "/_info" => return json_response(StatusCode::OK, &self.service.metrics().info()),
            _ => {}
        }

        if let Some(rest) = ssr_fetch_target(&path) {
            let query = req.uri().query().unwrap_or_default().to_string();
            return self.ssr_fetch(rest, &query).await;
        }

        if req.method() == Method::GET || req.method() == Method::HEAD {
            if let Some(code) = invite_target(&path) {
                return invite_redirect(code);
            }
        }

        if let Some(proxy) = &self.dev_proxy {
            return proxy.forward(req).await;
        }

        if req.method() != Method::GET && req.method() != Method::HEAD {
            let mut resp = response(
                StatusCode::METHOD_NOT_ALLOWED,
                "text/plain; charset=utf-8",
                "Method Not Allowed",
            );
            resp.headers_mut()
                .insert(hyper::header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return resp;
        }

        if let Some(relative) = path.strip_prefix("/assets/") {
            return self.serve_asset(relative).await;
        }

        self.page(page_request(&req)).await
    }

    fn metrics(&self) -> HyperResponse {
        let mut snapshot = self.service.metrics().snapshot();
        if let Some(pool) = &self.pool {
            snapshot = snapshot.with_pool(pool.stats());
        }
        json_response(StatusCode::OK, &snapshot)
    }

    async fn ssr_fetch(&self, path: &str, query: &str) -> HyperResponse {
        match self.service.fetch_payload(path, query).await {
            Ok(Some(payload)) => json_response(StatusCode::OK, &payload),
            Ok(None) => json_response(
                StatusCode::NOT_FOUND,
                &json!({ "error": format!("no data route matches {}", path) }),
            ),
            Err(e) => {
                tracing::error!(path, error = %e, "data fetch failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({ "error": e.to_string() }),
                )
            }
        }
    }

    async fn serve_asset(&self, relative: &str) -> HyperResponse {
        let not_found = || response(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "Not Found");
        let Some(assets_dir) = &self.assets_dir else {
            return not_found();
        };

        let cleaned = clean_path(relative);
        let file_path = assets_dir.join(cleaned.trim_start_matches('/'));
        if !file_path.starts_with(assets_dir) || file_path == *assets_dir {
            return response(StatusCode::FORBIDDEN, "text/plain; charset=utf-8", "Forbidden");
        }

        match tokio::fs::read(&file_path).await {
            Ok(contents) => {
                tracing::debug!(path = %file_path.display(), "serving asset");
                let mut resp = response(StatusCode::OK, content_type_for(&file_path), contents);
                resp.headers_mut().insert(
                    CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=31536000, immutable"),
                );
                resp
            }
            Err(_) => not_found(),
        }
    }

    async fn page(&self, request: PageRequest) -> HyperResponse {
        match self.service.render_page(&request).await {
            Ok(page) => response(StatusCode::OK, "text/html; charset=utf-8", page.html),
            Err(_) => response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                "Internal Server Error",
            ),
        }
    }
}

/// Path to resolve for a data-fetch request, or `None` for other paths.
fn ssr_fetch_target(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(SSR_FETCH_PREFIX)?;
    match rest {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// Invite code of `/i/<code>`, a single non-empty segment.
fn invite_target(path: &str) -> Option<&str> {
    path.strip_prefix("/i/")
        .filter(|code| !code.is_empty() && !code.contains('/'))
}

fn invite_redirect(raw_code: &str) -> HyperResponse {
    let code = urlencoding::decode(raw_code)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    let mut resp = response(StatusCode::FOUND, "text/plain; charset=utf-8", "");
    resp.headers_mut()
        .insert(LOCATION, HeaderValue::from_static("/"));

    if !code.is_empty() {
        let cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly",
            INVITE_COOKIE,
            urlencoding::encode(&code),
            INVITE_MAX_AGE_SECS
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                resp.headers_mut().insert(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "invalid invite cookie"),
        }
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssr_fetch_target() {
        assert_eq!(ssr_fetch_target("/__ssr_fetch"), Some("/"));
        assert_eq!(ssr_fetch_target("/__ssr_fetch/"), Some("/"));
        assert_eq!(ssr_fetch_target("/__ssr_fetch/hi/Ada"), Some("/hi/Ada"));
        assert_eq!(ssr_fetch_target("/__ssr_fetchx"), None);
        assert_eq!(ssr_fetch_target("/hi/Ada"), None);
    }

    #[test]
    fn test_invite_target() {
        assert_eq!(invite_target("/i/WELCOME42"), Some("WELCOME42"));
        assert_eq!(invite_target("/i/"), None);
        assert_eq!(invite_target("/i/a/b"), None);
        assert_eq!(invite_target("/invite"), None);
    }

    #[test]
    fn test_invite_redirect() {
        let resp = invite_redirect("ABC%20123");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[LOCATION], "/");
        assert_eq!(
            resp.headers()[SET_COOKIE],
            "invite_code=ABC%20123; Path=/; Max-Age=2592000; HttpOnly"
        );

        let blank = invite_redirect("%20");
        assert_eq!(blank.status(), StatusCode::FOUND);
        assert!(blank.headers().get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a/index-3f2a.js")), "application/javascript; charset=utf-8");
        assert_eq!(content_type_for(Path::new("style.css")), "text/css; charset=utf-8");
        assert_eq!(content_type_for(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_page_request_from_headers() {
        let req = Request::builder()
            .uri("/zh-CN/hi/Li?title=Dr")
            .header(HOST, "islet.test")
            .header(COOKIE, "a=1")
            .header(COOKIE, "session_token=xyz")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();

        let page = page_request(&req);
        assert_eq!(page.path, "/zh-CN/hi/Li");
        assert_eq!(page.query, "title=Dr");
        assert_eq!(page.cookie.as_deref(), Some("a=1; session_token=xyz"));
        assert_eq!(page.origin().as_deref(), Some("https://islet.test"));
    }
}
