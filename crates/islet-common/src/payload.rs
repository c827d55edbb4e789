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

//! Per-request render payload.
//!
//! A payload is the data a render needs: produced by a data-fetch handler,
//! then extended by later stages (`session`, `locale`, `siteOrigin`) before it
//! is injected into the isolate and embedded in the page as a data island.
//! Keys keep insertion order so the serialized island is deterministic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IsletError, Result};

/// Insertion-ordered, schema-less key/value payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SsrPayload(Map<String, Value>);

impl SsrPayload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Converts any serializable value into a payload.
    ///
    /// The value must serialize to a JSON object; `null` (for example `()` or
    /// `None`) yields an empty payload. Anything else is a serialization
    /// error, since a payload is always addressed by key.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(IsletError::Serialization(format!(
                "payload must serialize to a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Sets `key`, replacing only a previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<Map<String, Value>> for SsrPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<SsrPayload> for Value {
    fn from(payload: SsrPayload) -> Self {
        Value::Object(payload.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Greeting {
        greeting: String,
        #[serde(rename = "generatedAt")]
        generated_at: String,
    }

    #[test]
    fn test_from_struct_keeps_field_order() {
        let payload = SsrPayload::from_serialize(&Greeting {
            greeting: "Hello".into(),
            generated_at: "now".into(),
        })
        .unwrap();
        let keys: Vec<_> = payload.keys().cloned().collect();
        assert_eq!(keys, vec!["greeting", "generatedAt"]);
    }

    #[test]
    fn test_null_becomes_empty_payload() {
        let payload = SsrPayload::from_serialize(&()).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = SsrPayload::from_serialize(&vec![1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_stages_add_keys_without_clearing() {
        let mut payload = SsrPayload::from_serialize(&json!({"greeting": "hi"})).unwrap();
        payload.insert("locale", "en");
        payload.insert("siteOrigin", "http://localhost");
        assert_eq!(payload.len(), 3);
        assert_eq!(payload.get("greeting"), Some(&json!("hi")));
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"greeting":"hi","locale":"en","siteOrigin":"http://localhost"}"#
        );
    }
}
