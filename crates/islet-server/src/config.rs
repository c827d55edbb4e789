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

//! Server configuration and assembly of the running server from it.

use crate::dev_proxy::DevProxy;
use crate::governor::{RenderBudget, RenderGovernor};
use crate::http_router::SiteRouter;
use crate::http_server::HttpServer;
use crate::page::{PageAssembler, PageService, APP_PLACEHOLDER};
use crate::routing::{Route, RouteMatcher};
use crate::runtime::{ContextPool, IsolateConfig, IsolateLimits, PoolConfig, PoolRenderer};
use crate::site::demo_routes;
use islet_common::{IsletError, LocaleSet, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Dev server used when development mode is enabled without a URL.
pub const DEFAULT_DEV_SERVER_URL: &str = "http://127.0.0.1:3333";

/// Everything needed to start a page server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Client build output: `index.html` plus `assets/`.
    pub client_dist: PathBuf,
    /// Server render bundle evaluated by every isolate.
    pub server_bundle: PathBuf,
    pub bind: SocketAddr,
    pub entry: String,
    pub pool: PoolConfig,
    pub budget: RenderBudget,
    pub limits: IsolateLimits,
    pub locales: LocaleSet,
    pub prewarm: bool,
    /// Dev server to proxy to; `Some` enables development mode.
    pub dev_server: Option<String>,
}

impl ServerConfig {
    /// Defaults for a client build at `client_dist`, with the server bundle
    /// at `<client_dist>/../server/server.js`.
    pub fn new(client_dist: impl Into<PathBuf>) -> Self {
        let client_dist = client_dist.into();
        let server_bundle = default_server_bundle(&client_dist);
        Self {
            client_dist,
            server_bundle,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            entry: "ssrRender".to_string(),
            pool: PoolConfig::default(),
            budget: RenderBudget::default(),
            limits: IsolateLimits::default(),
            locales: LocaleSet::default(),
            prewarm: false,
            dev_server: None,
        }
    }

    pub fn with_server_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_bundle = path.into();
        self
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_budget(mut self, budget: RenderBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_limits(mut self, limits: IsolateLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_locales(mut self, locales: LocaleSet) -> Self {
        self.locales = locales;
        self
    }

    pub fn with_prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm = prewarm;
        self
    }

    pub fn with_dev_server(mut self, url: Option<String>) -> Self {
        self.dev_server = url;
        self
    }

    pub fn is_dev(&self) -> bool {
        self.dev_server.is_some()
    }

    pub fn index_html(&self) -> PathBuf {
        self.client_dist.join("index.html")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.client_dist.join("assets")
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.budget.validate()?;
        self.limits.validate()?;
        self.isolate_config(String::new()).validate()
    }

    fn isolate_config(&self, bundle: String) -> IsolateConfig {
        IsolateConfig::new(bundle)
            .with_entry(self.entry.clone())
            .with_limits(self.limits.clone())
    }

    /// Builds the server with the demo site's data-fetch routes.
    pub async fn build(&self) -> Result<HttpServer> {
        self.build_with_routes(demo_routes(self.locales.clone())).await
    }

    /// Builds the server with a custom data-fetch route table.
    ///
    /// In development mode a missing shell or bundle is tolerated, since pages
    /// are served by the dev server.
    pub async fn build_with_routes(&self, routes: Vec<Route>) -> Result<HttpServer> {
        self.validate()?;

        let assembler = match PageAssembler::from_file(self.index_html()) {
            Ok(assembler) => assembler,
            Err(e) if self.is_dev() => {
                tracing::warn!(error = %e, "no HTML shell, continuing in dev mode");
                PageAssembler::new(APP_PLACEHOLDER)
            }
            Err(e) => return Err(e),
        };

        let bundle = match read_bundle(&self.server_bundle) {
            Ok(bundle) => bundle,
            Err(e) if self.is_dev() => {
                tracing::warn!(error = %e, "no server bundle, continuing in dev mode");
                String::new()
            }
            Err(e) => return Err(e),
        };

        let pool = ContextPool::new(self.isolate_config(bundle), self.pool.clone())?;
        if self.prewarm && !self.is_dev() {
            pool.prewarm().await?;
        }

        let service = PageService::new(
            Arc::new(RouteMatcher::new(routes)?),
            Arc::new(PoolRenderer::new(pool.clone())),
            RenderGovernor::new(self.budget.clone()),
            assembler,
            self.locales.clone(),
        );

        let mut router = SiteRouter::new(Arc::new(service))
            .with_assets_dir(self.assets_dir())
            .with_pool(pool);
        if let Some(url) = &self.dev_server {
            router = router.with_dev_proxy(DevProxy::new(url.clone())?);
            tracing::info!(dev_server = %url, "development mode: proxying pages to dev server");
        }

        tracing::info!(
            pool_size = self.pool.pool_size,
            max_parallel = self.budget.max_parallel,
            timeout_ms = self.budget.timeout.as_millis() as u64,
            entry = %self.entry,
            "page server configured"
        );
        Ok(HttpServer::new(router))
    }
}

fn default_server_bundle(client_dist: &Path) -> PathBuf {
    client_dist
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("server")
        .join("server.js")
}

fn read_bundle(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        IsletError::InvalidConfig(format!("Failed to read server bundle {}: {}", path.display(), e))
    })
}

/// Interprets a development-mode switch such as the `DEV_MODE` variable.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "dev"
    )
}
