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

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Cookie holding the client's session token.
pub const SESSION_COOKIE: &str = "session_token";

#[derive(Deserialize)]
struct SessionToken {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    provider: String,
    #[serde(default, rename = "iat")]
    _issued_at: i64,
}

/// Public view of a signed-in user, exposed to the render bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub provider: String,
}

/// Decodes a session token: standard base64 around a JSON object.
///
/// Returns `None` for anything malformed and for tokens without an email.
pub fn decode_session_token(token: &str) -> Option<SessionSummary> {
    if token.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(token).ok()?;
    let token: SessionToken = serde_json::from_slice(&bytes).ok()?;
    if token.email.is_empty() {
        return None;
    }

    Some(SessionSummary {
        id: token.id,
        name: token.name,
        email: token.email,
        provider: token.provider,
    })
}

/// The `session` payload entry for a token, or `None` when it does not
/// decode to a valid session.
pub fn session_payload(token: &str) -> Option<Value> {
    let user = decode_session_token(token)?;
    Some(json!({
        "session_token": token,
        "user": user,
    }))
}

/// Finds the first cookie called `name` in a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}
