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

//! Page assembly: session decoding, the HTML shell merge, and the page
//! service tying data fetch, render and assembly together.

mod assembler;
mod service;
mod session;

pub use assembler::{
    apply_html_lang, data_island, inject_head_content, inject_ssr_data, PageAssembler,
    APP_PLACEHOLDER, FALLBACK_MOUNT,
};
pub use service::{Page, PageOutcome, PageRequest, PageService};
pub use session::{cookie_value, decode_session_token, session_payload, SessionSummary, SESSION_COOKIE};
