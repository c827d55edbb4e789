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

//! Escaping helpers for embedding text in inline scripts and HTML.

use std::fmt::Write;

/// Escapes `input` for use inside a double- or single-quoted JavaScript string
/// literal that itself sits inside an HTML `<script>` element.
///
/// Quotes and backslashes are backslash-escaped. `<`, `>`, `&` and `=` become
/// `\uXXXX` so the literal can never close the script element or start an
/// HTML comment. Control characters and the JS line terminators U+2028/U+2029
/// are also `\uXXXX`-escaped.
pub fn js_escape_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' | '>' | '&' | '=' | '\u{2028}' | '\u{2029}' => push_unicode_escape(&mut out, c),
            c if (c as u32) < 0x20 || c == '\u{7f}' => push_unicode_escape(&mut out, c),
            c => out.push(c),
        }
    }
    out
}

/// Escapes the five HTML-significant characters for attribute or text content.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn push_unicode_escape(out: &mut String, c: char) {
    // Writing to a String never fails.
    let _ = write!(out, "\\u{:04X}", c as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_escape_quotes_and_backslash() {
        assert_eq!(js_escape_string(r#"a"b'c\d"#), r#"a\"b\'c\\d"#);
    }

    #[test]
    fn test_js_escape_cannot_close_script() {
        let escaped = js_escape_string("</script><!--");
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('>'));
        assert_eq!(escaped, "\\u003C/script\\u003E\\u003C!--");
    }

    #[test]
    fn test_js_escape_control_and_line_separators() {
        assert_eq!(js_escape_string("a\nb\u{2028}"), "a\\u000Ab\\u2028");
    }

    #[test]
    fn test_js_escape_keeps_unicode_text() {
        assert_eq!(js_escape_string("你好，朋友！"), "你好，朋友！");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&#34;x&#34;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }
}
