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

use crate::runtime::RenderResult;
use islet_common::escape::{html_escape, js_escape_string};
use islet_common::{IsletError, Result, SsrPayload};
use std::path::Path;
use std::sync::Arc;

/// Marker in the HTML shell replaced by the rendered application markup.
pub const APP_PLACEHOLDER: &str = "<!--app-html-->";

/// Empty mount point used when server rendering failed; the client renders
/// into it from scratch.
pub const FALLBACK_MOUNT: &str = r#"<div id="app"></div>"#;

/// Merges rendered output into the HTML shell.
#[derive(Debug, Clone)]
pub struct PageAssembler {
    shell: Arc<str>,
}

impl PageAssembler {
    pub fn new(shell: impl Into<Arc<str>>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Loads the shell from disk, typically `<client-dist>/index.html`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shell = std::fs::read_to_string(path).map_err(|e| {
            IsletError::InvalidConfig(format!("Failed to read HTML shell {}: {}", path.display(), e))
        })?;
        if !shell.contains(APP_PLACEHOLDER) {
            tracing::warn!(path = %path.display(), "HTML shell has no {} placeholder", APP_PLACEHOLDER);
        }
        Ok(Self::new(shell))
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Builds the server-rendered document.
    ///
    /// The payload is expected to be serializable; if it is not, the page is
    /// still produced without a data island.
    pub fn assemble(&self, rendered: &RenderResult, payload: &SsrPayload, locale: Option<&str>) -> String {
        let mut html = self.shell.replacen(APP_PLACEHOLDER, &rendered.html, 1);
        if let Some(locale) = locale.filter(|l| !l.is_empty()) {
            html = apply_html_lang(&html, locale);
        }
        html = inject_head_content(&html, &rendered.head);

        match inject_ssr_data(&html, payload) {
            Ok(with_data) => with_data,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize data island");
                html
            }
        }
    }

    /// Builds the client-only document served when rendering failed.
    ///
    /// Never fails: every step that could go wrong is skipped instead.
    pub fn fallback(&self, payload: &SsrPayload, locale: Option<&str>, request_id: &str) -> String {
        let mut html = self.shell.replacen(APP_PLACEHOLDER, FALLBACK_MOUNT, 1);
        if let Some(locale) = locale.filter(|l| !l.is_empty()) {
            html = apply_html_lang(&html, locale);
        }

        let error_meta = format!(
            r#"<meta name="ssr-error-id" content="{}">"#,
            html_escape(request_id)
        );
        html = inject_head_content(&html, &error_meta);

        inject_ssr_data(&html, payload).unwrap_or(html)
    }
}

/// Byte range of the opening `<html ...>` tag, excluding the closing `>`.
fn html_tag_range(html: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = html[from..].find("<html") {
        let start = from + offset;
        let after = start + "<html".len();
        match html[after..].chars().next() {
            Some(c) if c == '>' || c.is_ascii_whitespace() => {
                let end = after + html[after..].find('>')?;
                return Some((start, end));
            }
            _ => from = after,
        }
    }
    None
}

/// Byte range of the `lang` attribute (name and value, if any) inside an
/// opening `<html ...` tag. Attribute names match case-insensitively.
fn lang_attribute_range(tag: &str) -> Option<(usize, usize)> {
    let bytes = tag.as_bytes();
    let skip_space = |mut at: usize| {
        while at < bytes.len() && bytes[at].is_ascii_whitespace() {
            at += 1;
        }
        at
    };

    let mut at = "<html".len();
    loop {
        at = skip_space(at);
        if at >= bytes.len() {
            return None;
        }
        if bytes[at] == b'/' {
            at += 1;
            continue;
        }

        let name_start = at;
        while at < bytes.len() && !matches!(bytes[at], b'=' | b'/') && !bytes[at].is_ascii_whitespace() {
            at += 1;
        }
        let name = &tag[name_start..at];

        let mut attr_end = at;
        let after_name = skip_space(at);
        if after_name < bytes.len() && bytes[after_name] == b'=' {
            let mut value = skip_space(after_name + 1);
            match bytes.get(value) {
                Some(&quote @ (b'"' | b'\'')) => {
                    value += 1;
                    while value < bytes.len() && bytes[value] != quote {
                        value += 1;
                    }
                    value = (value + 1).min(bytes.len());
                }
                _ => {
                    while value < bytes.len() && !bytes[value].is_ascii_whitespace() {
                        value += 1;
                    }
                }
            }
            attr_end = value;
        }

        if name.eq_ignore_ascii_case("lang") {
            return Some((name_start, attr_end));
        }
        at = attr_end.max(name_start + 1);
    }
}

/// Sets the `lang` attribute of the `<html>` tag, replacing an existing one.
/// Documents without an `<html>` tag are returned unchanged.
pub fn apply_html_lang(html: &str, locale: &str) -> String {
    let Some((start, end)) = html_tag_range(html) else {
        return html.to_string();
    };
    let tag = &html[start..end];
    let lang = format!(r#"lang="{}""#, html_escape(locale));

    let new_tag = match lang_attribute_range(tag) {
        Some((attr_start, attr_end)) => format!("{}{}{}", &tag[..attr_start], lang, &tag[attr_end..]),
        None => format!("<html {}{}", lang, &tag["<html".len()..]),
    };

    format!("{}{}{}", &html[..start], new_tag, &html[end..])
}

/// Inserts head markup before `</head>`, or at the start of the document
/// when there is no head. Empty content leaves the document unchanged.
pub fn inject_head_content(html: &str, head: &str) -> String {
    if head.trim().is_empty() {
        return html.to_string();
    }

    let mut block = head.to_string();
    if !block.ends_with('\n') {
        block.push('\n');
    }

    match html.find("</head>") {
        Some(index) => format!("{}{}{}", &html[..index], block, &html[index..]),
        None => format!("{}{}", block, html),
    }
}

/// Renders the data island carrying `payload` to the client.
pub fn data_island(payload: &SsrPayload) -> Result<String> {
    let json = payload.to_json()?;
    Ok(format!(
        r#"<script id="ssr-data">window.__SSR_DATA__=JSON.parse("{}")</script>"#,
        js_escape_string(&json)
    ))
}

/// Embeds the data island before `</head>`, else before `</body>`, else at the
/// end of the document. An empty payload adds nothing.
pub fn inject_ssr_data(html: &str, payload: &SsrPayload) -> Result<String> {
    if payload.is_empty() {
        return Ok(html.to_string());
    }

    let island = data_island(payload)?;
    let at = html.find("</head>").or_else(|| html.find("</body>"));
    Ok(match at {
        Some(index) => format!("{}{}{}", &html[..index], island, &html[index..]),
        None => format!("{}{}", html, island),
    })
}
