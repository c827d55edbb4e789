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

//! Boa-backed script runtime.
//!
//! Each [`Isolate`] owns one Boa context on a dedicated thread. Isolates are
//! leased from a [`ContextPool`] and driven through the [`Render`] trait.

mod bindings;
mod isolate;
mod pool;
mod renderer;

pub use isolate::{Isolate, IsolateConfig, IsolateLimits};
pub use pool::{ContextPool, PoolConfig, PooledIsolate};
pub use renderer::{PoolRenderer, Render, RenderInterest, RenderResult, DATA_GLOBAL, HEAD_GLOBAL};
