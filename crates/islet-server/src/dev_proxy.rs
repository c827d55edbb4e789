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

//! Development-mode reverse proxy.
//!
//! While the client is served by a hot-reloading dev server, every request
//! except the data-fetch endpoint is forwarded there verbatim.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HOST};
use hyper::{Request, Response, StatusCode};
use islet_common::{IsletError, Result};

/// Hop-by-hop headers, meaningful for a single connection only.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Forwards requests to the development server.
#[derive(Debug, Clone)]
pub struct DevProxy {
    client: reqwest::Client,
    upstream: String,
}

impl DevProxy {
    /// `upstream` is the dev server base URL, e.g. `http://127.0.0.1:3333`.
    pub fn new(upstream: impl Into<String>) -> Result<Self> {
        let upstream = upstream.into().trim_end_matches('/').to_string();
        if !(upstream.starts_with("http://") || upstream.starts_with("https://")) {
            return Err(IsletError::InvalidConfig(format!(
                "dev server url must start with http:// or https:// (got {})",
                upstream
            )));
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IsletError::Transport(format!("Failed to build proxy client: {}", e)))?;

        Ok(Self { client, upstream })
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Target URL for a request path and query.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.upstream, path_and_query)
    }

    /// Forwards `req` upstream. An unreachable dev server yields 502.
    pub async fn forward(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let target = self.target_url(
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/"),
        );

        match self.try_forward(req, &target).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(target_url = %target, error = %e, "dev server unreachable");
                let mut response = Response::new(Full::new(Bytes::from(format!(
                    "dev server unreachable: {}",
                    e
                ))));
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response
            }
        }
    }

    async fn try_forward(&self, req: Request<Incoming>, target: &str) -> Result<Response<Full<Bytes>>> {
        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| IsletError::Transport(format!("Failed to read request body: {}", e)))?
            .to_bytes();

        let mut headers = parts.headers;
        headers.remove(HOST);
        strip_hop_by_hop(&mut headers);

        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| IsletError::Transport(e.to_string()))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| IsletError::Transport(format!("Failed to read upstream body: {}", e)))?;

        tracing::debug!(target_url = %target, status = %status, "proxied to dev server");

        let mut response = Response::new(Full::new(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{CONNECTION, TRANSFER_ENCODING};

    #[test]
    fn test_upstream_validation() {
        assert!(DevProxy::new("127.0.0.1:3333").is_err());
        let proxy = DevProxy::new("http://127.0.0.1:3333/").unwrap();
        assert_eq!(proxy.upstream(), "http://127.0.0.1:3333");
        assert_eq!(
            proxy.target_url("/src/main.ts?t=1"),
            "http://127.0.0.1:3333/src/main.ts?t=1"
        );
    }

    #[test]
    fn test_hop_by_hop_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert("content-type", "text/html".parse().unwrap());

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-type"));
    }
}
