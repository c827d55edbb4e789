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

//! HTTP server for the Islet page server.
//!
//! Listens on a TCP socket, serves each connection with hyper's HTTP/1.1
//! implementation on its own tokio task, and hands every request to the
//! [`SiteRouter`].
//!
//! # Example
//!
//! ```no_run
//! use islet_server::http_server::HttpServer;
//! use islet_server::http_router::SiteRouter;
//! # fn router() -> SiteRouter { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = HttpServer::new(router());
//!     server.run("127.0.0.1:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use crate::http_router::SiteRouter;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use islet_common::{IsletError, Result};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// HTTP server for the page router.
pub struct HttpServer {
    router: Arc<SiteRouter>,
}

impl HttpServer {
    pub fn new(router: SiteRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &SiteRouter {
        &self.router
    }

    /// Binds `addr` and serves until the accept loop fails.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| IsletError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| IsletError::Transport(format!("Failed to get local address: {}", e)))?;
        tracing::info!(
            dev = self.router.is_dev(),
            "HTTP server listening on {}",
            local
        );

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| IsletError::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let router = self.router.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let router = router.clone();
                    async move { Ok::<_, Infallible>(router.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!(peer = %peer, "Error serving connection: {}", err);
                }
            });
        }
    }
}
