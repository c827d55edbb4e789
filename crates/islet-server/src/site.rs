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

//! Data-fetch routes of the bundled demo site.
//!
//! A home page with a localized announcement and a greeting page with an
//! optional salutation, each reachable with and without a locale prefix.

use crate::routing::{QueryParams, Route, RouteParams};
use chrono::{Local, SecondsFormat};
use islet_common::LocaleSet;
use serde::Serialize;
use std::sync::Arc;

/// `Mon, 02 Jan 2006 15:04:05 -0700`
const RFC1123_NUMERIC_ZONE: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePayload {
    pub announcement: String,
    pub server_time: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GreetingPayload {
    pub greeting: String,
    pub generated_at: String,
    pub locale: String,
}

fn announcement(locale: &str) -> &'static str {
    match locale {
        "zh-CN" => "欢迎体验 Islet 服务端渲染示例",
        _ => "Welcome to the Islet server-side rendering demo",
    }
}

fn default_name(locale: &str) -> &'static str {
    match locale {
        "zh-CN" => "朋友",
        _ => "friend",
    }
}

fn greeting(locale: &str, name: &str) -> String {
    match locale {
        "zh-CN" => format!("你好，{}！", name),
        _ => format!("Hello, {}!", name),
    }
}

pub fn home(locale: &str) -> HomePayload {
    HomePayload {
        announcement: announcement(locale).to_string(),
        server_time: Local::now().format(RFC1123_NUMERIC_ZONE).to_string(),
        locale: locale.to_string(),
    }
}

/// Greets `name` (or the localized default), prefixed by the `title` query
/// parameter when present.
pub fn greet(locale: &str, name: Option<&str>, query: &QueryParams) -> GreetingPayload {
    let mut name = name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name(locale))
        .to_string();
    if let Some(title) = query.get("title").filter(|t| !t.is_empty()) {
        name = format!("{} {}", title, name);
    }

    GreetingPayload {
        greeting: greeting(locale, &name),
        generated_at: Local::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        locale: locale.to_string(),
    }
}

/// The demo route table, in precedence order.
pub fn demo_routes(locales: LocaleSet) -> Vec<Route> {
    let locales = Arc::new(locales);

    let home_locales = locales.clone();
    let hi_locales = locales.clone();
    let home_locale_locales = locales.clone();
    let hi_locale_locales = locales;

    vec![
        Route::new("/", move |_params, _query| {
            let payload = home(home_locales.default_locale());
            async move { Ok(payload) }
        }),
        Route::new("/hi/:name", move |params: RouteParams, query: QueryParams| {
            let payload = greet(hi_locales.default_locale(), params.get("name"), &query);
            async move { Ok(payload) }
        }),
        Route::new("/:locale", move |params: RouteParams, _query| {
            let locale = home_locale_locales.normalize(params.get("locale").unwrap_or_default());
            let payload = home(locale);
            async move { Ok(payload) }
        }),
        Route::new("/:locale/hi/:name", move |params: RouteParams, query: QueryParams| {
            let locale = hi_locale_locales.normalize(params.get("locale").unwrap_or_default());
            let payload = greet(locale, params.get("name"), &query);
            async move { Ok(payload) }
        }),
    ]
}
