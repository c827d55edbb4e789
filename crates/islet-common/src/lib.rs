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

//! Islet Common Types
//!
//! Shared building blocks for the Islet server-side rendering system:
//!
//! - [`error`] - the [`IsletError`] taxonomy used across every crate
//! - [`payload`] - [`SsrPayload`], the ordered per-request render data
//! - [`locale`] - [`LocaleSet`], locale validation and normalization
//! - [`escape`] - escaping for inline scripts and HTML attributes
//!
//! # Example
//!
//! ```
//! use islet_common::{LocaleSet, SsrPayload};
//!
//! let locales = LocaleSet::default();
//! let mut payload = SsrPayload::new();
//! payload.insert("locale", locales.from_path("/zh-cn/hi/Ada"));
//! assert_eq!(payload.get("locale").and_then(|v| v.as_str()), Some("zh-CN"));
//! ```

pub mod error;
pub mod escape;
pub mod locale;
pub mod payload;

pub use error::{IsletError, Result};
pub use locale::LocaleSet;
pub use payload::SsrPayload;
