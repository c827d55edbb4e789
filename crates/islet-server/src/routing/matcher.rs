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

use crate::routing::params::{QueryParams, RouteParams};
use futures::future::{BoxFuture, FutureExt};
use islet_common::{IsletError, Result, SsrPayload};
use regex::Regex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

type Handler = dyn Fn(RouteParams, QueryParams) -> BoxFuture<'static, Result<SsrPayload>> + Send + Sync;

/// A data-fetch route: a path pattern with `:name` segments and the handler
/// producing the payload for matching requests.
#[derive(Clone)]
pub struct Route {
    pattern: String,
    handler: Arc<Handler>,
}

impl Route {
    /// Registers `handler` for `pattern`.
    ///
    /// The handler may return any serializable value; it must serialize to a
    /// JSON object (or `null`, treated as an empty payload).
    pub fn new<F, Fut, T>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RouteParams, QueryParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let handler: Arc<Handler> = Arc::new(move |params: RouteParams, query: QueryParams| {
            let pending = handler(params, query);
            async move {
                let value = pending.await?;
                SsrPayload::from_serialize(&value)
            }
            .boxed()
        });

        Self {
            pattern: pattern.into(),
            handler,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("pattern", &self.pattern).finish()
    }
}

/// A route with its pattern compiled to an anchored regular expression.
pub struct CompiledRoute {
    route: Route,
    regex: Regex,
    params: Vec<String>,
}

impl CompiledRoute {
    pub fn compile(route: Route) -> Result<Self> {
        let trimmed = route.pattern.trim_matches('/');
        let mut params = Vec::new();
        let mut source = String::from("^");

        if trimmed.is_empty() {
            source.push('/');
        }
        for segment in trimmed.split('/').filter(|_| !trimmed.is_empty()) {
            source.push('/');
            match segment.strip_prefix(':') {
                Some(name) if name.is_empty() => {
                    return Err(IsletError::InvalidConfig(format!(
                        "route `{}` has an unnamed parameter",
                        route.pattern
                    )));
                }
                Some(name) => {
                    params.push(name.to_string());
                    source.push_str("([^/]+)");
                }
                None => source.push_str(&regex::escape(segment)),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| {
            IsletError::InvalidConfig(format!("route `{}` failed to compile: {}", route.pattern, e))
        })?;

        Ok(Self {
            route,
            regex,
            params,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.route.pattern
    }

    /// The anchored expression this route matches against.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Matches an already-cleaned path, returning the decoded captures.
    pub fn captures(&self, path: &str) -> Option<RouteParams> {
        let captures = self.regex.captures(path)?;
        let raw: Vec<&str> = captures
            .iter()
            .skip(1)
            .map(|m| m.map_or("", |m| m.as_str()))
            .collect();
        Some(RouteParams::from_captures(&self.params, raw))
    }
}

/// Canonical form of a request path: rooted, no `.`/`..` segments, no
/// duplicate or trailing slashes.
///
/// ```
/// use islet_server::routing::clean_path;
///
/// assert_eq!(clean_path("hi//Ada/"), "/hi/Ada");
/// assert_eq!(clean_path("/a/./b/../../c"), "/c");
/// assert_eq!(clean_path("/../.."), "/");
/// ```
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Produces the payload for a request, if any route claims it.
pub trait DataFetcher: Send + Sync + 'static {
    /// `Ok(None)` means no route matched.
    fn fetch<'a>(&'a self, path: &'a str, query: &'a str) -> BoxFuture<'a, Result<Option<SsrPayload>>>;
}

/// Ordered table of compiled routes. The first match wins.
pub struct RouteMatcher {
    routes: Vec<CompiledRoute>,
}

impl RouteMatcher {
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        let routes = routes
            .into_iter()
            .map(CompiledRoute::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    /// Finds the first route matching `path`.
    pub fn find(&self, path: &str) -> Option<(&CompiledRoute, RouteParams)> {
        let path = clean_path(path);
        self.routes
            .iter()
            .find_map(|route| route.captures(&path).map(|params| (route, params)))
    }

    /// Runs the handler of the first route matching `path`.
    ///
    /// `query` is the raw query string without the leading `?`.
    pub async fn resolve(&self, path: &str, query: &str) -> Result<Option<SsrPayload>> {
        let Some((route, params)) = self.find(path) else {
            return Ok(None);
        };

        tracing::debug!(
            path,
            pattern = route.pattern(),
            rule = route.regex().as_str(),
            "data-fetch route matched"
        );
        let payload = (route.route.handler)(params, QueryParams::parse(query)).await?;
        Ok(Some(payload))
    }
}

impl DataFetcher for RouteMatcher {
    fn fetch<'a>(&'a self, path: &'a str, query: &'a str) -> BoxFuture<'a, Result<Option<SsrPayload>>> {
        self.resolve(path, query).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn echo(pattern: &str) -> Route {
        let name = pattern.to_string();
        Route::new(pattern, move |params: RouteParams, _query| {
            let name = name.clone();
            async move {
                let captured: serde_json::Map<String, Value> = params
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(v)))
                    .collect();
                Ok(json!({"route": name, "params": captured}))
            }
        })
    }

    #[test]
    fn test_compile_patterns() {
        let root = CompiledRoute::compile(echo("/")).unwrap();
        assert_eq!(root.regex().as_str(), "^/$");

        let hi = CompiledRoute::compile(echo("/hi/:name")).unwrap();
        assert_eq!(hi.regex().as_str(), "^/hi/([^/]+)$");
        assert_eq!(hi.param_names(), ["name".to_string()]);

        let literal = CompiledRoute::compile(echo("/v1.0/a+b")).unwrap();
        assert!(literal.captures("/v1.0/a+b").is_some());
        assert!(literal.captures("/v1x0/aab").is_none());
    }

    #[test]
    fn test_unnamed_param_rejected() {
        assert!(matches!(
            CompiledRoute::compile(echo("/hi/:")),
            Err(IsletError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("/hi/Ada/"), "/hi/Ada");
        assert_eq!(clean_path("//hi///Ada"), "/hi/Ada");
        assert_eq!(clean_path("/zh-CN/./hi/../hi/Li"), "/zh-CN/hi/Li");
    }

    #[test]
    fn test_params_in_declaration_order() {
        let matcher = RouteMatcher::new(vec![echo("/:locale/hi/:name")]).unwrap();
        let (_, params) = matcher.find("/zh-CN/hi/Li").unwrap();
        assert_eq!(
            params.iter().collect::<Vec<_>>(),
            vec![("locale", "zh-CN"), ("name", "Li")]
        );
    }

    #[test]
    fn test_captures_are_decoded() {
        let matcher = RouteMatcher::new(vec![echo("/hi/:name")]).unwrap();
        let (_, params) = matcher.find("/hi/Ada%20Lovelace").unwrap();
        assert_eq!(params.get("name"), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_registration_order_wins() {
        let matcher = RouteMatcher::new(vec![
            echo("/"),
            echo("/hi/:name"),
            echo("/:locale"),
            echo("/:locale/hi/:name"),
        ])
        .unwrap();

        let hi = matcher.resolve("/hi/Ada", "").await.unwrap().unwrap();
        assert_eq!(hi.get("route"), Some(&json!("/hi/:name")));

        let locale = matcher.resolve("/zh-CN", "").await.unwrap().unwrap();
        assert_eq!(locale.get("route"), Some(&json!("/:locale")));

        let root = matcher.resolve("/", "").await.unwrap().unwrap();
        assert_eq!(root.get("route"), Some(&json!("/")));
    }

    #[tokio::test]
    async fn test_no_match_is_not_an_error() {
        let matcher = RouteMatcher::new(vec![echo("/hi/:name")]).unwrap();
        assert!(matcher.resolve("/about/team", "").await.unwrap().is_none());
        assert!(matcher.resolve("/hi", "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_reaches_handler() {
        let route = Route::new("/search", |_params, query: QueryParams| async move {
            Ok(json!({"q": query.get("q").unwrap_or_default()}))
        });
        let matcher = RouteMatcher::new(vec![route]).unwrap();

        let payload = matcher.resolve("/search/", "q=rust+lang").await.unwrap().unwrap();
        assert_eq!(payload.get("q"), Some(&json!("rust lang")));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let route = Route::new("/broken", |_params, _query| async {
            Err::<Value, _>(IsletError::DataFetch("upstream unavailable".to_string()))
        });
        let matcher = RouteMatcher::new(vec![route]).unwrap();

        let err = matcher.resolve("/broken", "").await.unwrap_err();
        assert!(matches!(err, IsletError::DataFetch(_)));
    }

    #[tokio::test]
    async fn test_non_object_payload_is_error() {
        let route = Route::new("/list", |_params, _query| async { Ok(vec![1, 2, 3]) });
        let null = Route::new("/null", |_params, _query| async { Ok(Value::Null) });
        let matcher = RouteMatcher::new(vec![route, null]).unwrap();

        assert!(matches!(
            matcher.resolve("/list", "").await,
            Err(IsletError::Serialization(_))
        ));
        assert!(matcher.resolve("/null", "").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_matcher_as_data_fetcher() {
        let fetcher: Arc<dyn DataFetcher> =
            Arc::new(RouteMatcher::new(vec![echo("/hi/:name")]).unwrap());
        let payload = fetcher.fetch("/hi/Ada", "").await.unwrap().unwrap();
        assert_eq!(payload.get("params"), Some(&json!({"name": "Ada"})));
    }
}
