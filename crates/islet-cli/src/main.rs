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

//! # Islet CLI Entry Point
//!
//! Main binary for the Islet server-side rendering server.
//!
//! ## Usage
//!
//! ```bash
//! # Serve a production build (dist/client + dist/server/server.js)
//! islet serve --client-dist dist/client -b 0.0.0.0:8080
//!
//! # Tighter render budget
//! islet serve --client-dist dist/client --render-limit 4 --render-timeout-ms 1500
//!
//! # Development mode: pages are proxied to the dev server
//! DEV_MODE=1 islet serve --client-dist dist/client
//! islet serve --client-dist dist/client --dev --dev-server-url http://127.0.0.1:5173
//! ```
//!
//! ## Environment
//!
//! - `SSR_RENDER_LIMIT`: global render cap when `--render-limit` is not given
//! - `DEV_MODE`: enables development mode when truthy (`1`, `true`, `yes`, `on`)
//! - `DEV_SERVER_URL`: dev server URL when `--dev-server-url` is not given
//! - `RUST_LOG`: log filter, defaults to `info`

use anyhow::{Context, Result};
use argh::FromArgs;
use islet_common::LocaleSet;
use islet_server::config::{is_truthy, DEFAULT_DEV_SERVER_URL};
use islet_server::runtime::{IsolateLimits, PoolConfig};
use islet_server::{RenderBudget, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// Islet - server-side rendering for JavaScript application bundles
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
}

/// Serve server-rendered pages, static assets and the data endpoint
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
struct ServeArgs {
    /// client build output directory (index.html and assets/)
    #[argh(option, short = 'c', long = "client-dist", default = "\"dist/client\".into()")]
    client_dist: String,

    /// server render bundle (default: <client-dist>/../server/server.js)
    #[argh(option, long = "server-bundle")]
    server_bundle: Option<String>,

    /// address to bind to (default: 0.0.0.0:8080)
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// maximum concurrent renders, 0 for unbounded (env: SSR_RENDER_LIMIT)
    #[argh(option, long = "render-limit")]
    render_limit: Option<usize>,

    /// per-render timeout in milliseconds, 0 for the default (default: 3000)
    #[argh(option, long = "render-timeout-ms", default = "3000")]
    render_timeout_ms: u64,

    /// number of JavaScript isolates (default: available parallelism)
    #[argh(option, long = "pool-size")]
    pool_size: Option<usize>,

    /// global render function exported by the bundle (default: ssrRender)
    #[argh(option, long = "entry", default = "\"ssrRender\".into()")]
    entry: String,

    /// loop iteration limit per script run (default: 10000000)
    #[argh(option, long = "loop-iteration-limit", default = "10_000_000")]
    loop_iteration_limit: u64,

    /// recursion limit per script run (default: 512)
    #[argh(option, long = "recursion-limit", default = "512")]
    recursion_limit: usize,

    /// create every isolate before accepting connections
    #[argh(switch)]
    prewarm: bool,

    /// supported locales, comma separated, first is the default (default: en,zh-CN)
    #[argh(option, long = "locales")]
    locales: Option<String>,

    /// proxy page requests to the dev server (env: DEV_MODE)
    #[argh(switch)]
    dev: bool,

    /// dev server URL (env: DEV_SERVER_URL, default: http://127.0.0.1:3333)
    #[argh(option, long = "dev-server-url")]
    dev_server_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Serve(args) => {
            let config = server_config(args, |key| std::env::var(key).ok())?;
            tracing::info!(
                client_dist = %config.client_dist.display(),
                server_bundle = %config.server_bundle.display(),
                "Starting Islet"
            );

            let bind = config.bind;
            let server = config
                .build()
                .await
                .context("Failed to start the page server")?;
            server.run(bind).await?;
        }
    }

    Ok(())
}

/// Resolves command-line flags, falling back to `env` for unset options.
fn server_config(args: ServeArgs, env: impl Fn(&str) -> Option<String>) -> Result<ServerConfig> {
    let bind: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", args.bind))?;

    let mut budget = RenderBudget::new();
    if args.render_timeout_ms > 0 {
        budget = budget.with_timeout(Duration::from_millis(args.render_timeout_ms));
    }
    let render_limit = args.render_limit.or_else(|| {
        let raw = env("SSR_RENDER_LIMIT")?;
        match raw.trim().parse::<usize>() {
            Ok(limit) => Some(limit),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "ignoring invalid SSR_RENDER_LIMIT");
                None
            }
        }
    });
    if let Some(limit) = render_limit {
        budget = budget.with_max_parallel(limit);
    }

    let mut pool = PoolConfig::default();
    if let Some(size) = args.pool_size {
        pool = pool.with_pool_size(size);
    }

    let limits = IsolateLimits::default()
        .with_loop_iteration_limit(args.loop_iteration_limit)
        .with_recursion_limit(args.recursion_limit);

    let locales = match &args.locales {
        Some(list) => LocaleSet::new(list.split(','))
            .with_context(|| format!("No usable locale in --locales {}", list))?,
        None => LocaleSet::default(),
    };

    let dev = args.dev || env("DEV_MODE").is_some_and(|v| is_truthy(&v));
    let dev_server = dev.then(|| {
        args.dev_server_url
            .clone()
            .or_else(|| env("DEV_SERVER_URL"))
            .unwrap_or_else(|| DEFAULT_DEV_SERVER_URL.to_string())
    });

    let mut config = ServerConfig::new(&args.client_dist)
        .with_bind(bind)
        .with_entry(args.entry)
        .with_pool(pool)
        .with_budget(budget)
        .with_limits(limits)
        .with_locales(locales)
        .with_prewarm(args.prewarm)
        .with_dev_server(dev_server);
    if let Some(bundle) = args.server_bundle {
        config = config.with_server_bundle(bundle);
    }

    config.validate()?;
    Ok(config)
}
