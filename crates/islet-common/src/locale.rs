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

//! Locale resolution against a fixed supported set.

/// Supported locales plus the fallback used when a tag is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSet {
    supported: Vec<String>,
    default: String,
}

impl Default for LocaleSet {
    fn default() -> Self {
        Self {
            supported: vec!["en".to_string(), "zh-CN".to_string()],
            default: "en".to_string(),
        }
    }
}

impl LocaleSet {
    /// Builds a set whose first entry is the default locale.
    ///
    /// Returns `None` when `supported` is empty.
    pub fn new<I, S>(supported: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let supported: Vec<String> = supported
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let default = supported.first()?.clone();
        Some(Self { supported, default })
    }

    pub fn default_locale(&self) -> &str {
        &self.default
    }

    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// Case-insensitive membership test.
    pub fn is_supported(&self, tag: &str) -> bool {
        self.canonical(tag).is_some()
    }

    /// Returns the canonical spelling of `tag`, or the default locale.
    pub fn normalize<'a>(&'a self, tag: &str) -> &'a str {
        self.canonical(tag).unwrap_or(&self.default)
    }

    /// Picks the locale from the first path segment (`/zh-cn/hi/x` → `zh-CN`),
    /// falling back to the default.
    pub fn from_path<'a>(&'a self, path: &str) -> &'a str {
        path.trim_matches('/')
            .split('/')
            .next()
            .and_then(|segment| self.canonical(segment))
            .unwrap_or(&self.default)
    }

    fn canonical(&self, tag: &str) -> Option<&str> {
        let tag = tag.trim();
        self.supported
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(tag))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set() {
        let locales = LocaleSet::default();
        assert_eq!(locales.default_locale(), "en");
        assert!(locales.is_supported("zh-cn"));
        assert!(!locales.is_supported("fr"));
    }

    #[test]
    fn test_normalize_returns_canonical_spelling() {
        let locales = LocaleSet::default();
        assert_eq!(locales.normalize("ZH-cn"), "zh-CN");
        assert_eq!(locales.normalize("fr"), "en");
        assert_eq!(locales.normalize(""), "en");
    }

    #[test]
    fn test_from_path() {
        let locales = LocaleSet::default();
        assert_eq!(locales.from_path("/"), "en");
        assert_eq!(locales.from_path("/zh-CN"), "zh-CN");
        assert_eq!(locales.from_path("/zh-cn/hi/Ada"), "zh-CN");
        assert_eq!(locales.from_path("/hi/Ada"), "en");
    }

    #[test]
    fn test_custom_set_first_entry_is_default() {
        let locales = LocaleSet::new(["de", "en"]).unwrap();
        assert_eq!(locales.default_locale(), "de");
        assert_eq!(locales.from_path("/fr"), "de");
        assert!(LocaleSet::new(Vec::<String>::new()).is_none());
    }
}
