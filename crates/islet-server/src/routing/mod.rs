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

//! Data-fetch route table.
//!
//! Routes are registered once at startup as `{pattern, handler}` pairs, where
//! a pattern segment of the form `:name` captures exactly one path segment.
//! Lookup walks the table in registration order and runs the first match.

mod matcher;
mod params;

pub use matcher::{clean_path, CompiledRoute, DataFetcher, Route, RouteMatcher};
pub use params::{QueryParams, RouteParams};
