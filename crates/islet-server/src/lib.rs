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

//! Islet Server
//!
//! Server-side rendering of a JavaScript application bundle with the Boa
//! engine, behind a hyper HTTP server.
//!
//! A page request flows through the [`routing`] table (data fetch), the
//! [`page::PageService`] (payload augmentation), the [`RenderGovernor`]
//! (concurrency cap and timeout), a pooled [`runtime::Isolate`] (render), and
//! finally the [`page::PageAssembler`]. Any render failure degrades to a
//! client-rendered fallback page.

pub mod config;
pub mod dev_proxy;
pub mod governor;
pub mod http_router;
pub mod http_server;
pub mod page;
pub mod routing;
pub mod runtime;
pub mod site;

pub use config::ServerConfig;
pub use governor::{RenderBudget, RenderGovernor};
pub use http_server::HttpServer;
pub use page::{PageAssembler, PageService};
pub use routing::{Route, RouteMatcher};
pub use runtime::{ContextPool, PoolRenderer, Render, RenderResult};
