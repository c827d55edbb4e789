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

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IsletError {
    #[error("Data fetch error: {0}")]
    DataFetch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    #[error("Render timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Render fault: {0}")]
    Fault(String),

    #[error("Isolate initialization failed: {0}")]
    IsolateInit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IsletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_uses_millis() {
        let err = IsletError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Render timeout after 1500ms");
    }
}
