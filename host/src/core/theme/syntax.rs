//! Syntax token colors
//!
//! Resolves a color for a rendered token from the active theme's syntax
//! configuration, falling back to a deterministic palette pick for scopes
//! where auto-coloring is on. Auto picks are cached per
//! (language, role, token) until the theme changes.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult};

/// Wildcard language / role
pub const ANY: &str = "*";

/// Longest color value accepted
pub const MAX_COLOR_LEN: usize = 64;

/// Palette used when a theme does not bring its own
pub const DEFAULT_AUTO_PALETTE: &[&str] = &[
    "#e06c75", "#98c379", "#e5c07b", "#61afef", "#c678dd", "#56b6c2",
];

/// Conservative allow-list for color values
pub fn is_safe_color(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_COLOR_LEN
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '#' | '(' | ')' | ',' | '.' | '%' | ' ' | '-')
        })
}

/// Order-dependent character-code hash
pub fn token_hash(token: &str) -> u32 {
    token
        .chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32))
}

fn normalize(token: &str) -> String {
    token.trim().to_lowercase()
}

/// Scope where auto-coloring applies; `*` matches anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoColorScope {
    #[serde(default = "any")]
    pub language: String,
    #[serde(default = "any")]
    pub role: String,
}

fn any() -> String {
    ANY.to_string()
}

impl AutoColorScope {
    fn covers(&self, language: &str, role: &str) -> bool {
        (self.language == ANY || self.language.eq_ignore_ascii_case(language))
            && (self.role == ANY || self.role.eq_ignore_ascii_case(role))
    }
}

/// A theme's `syntax.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxConfig {
    /// language (or `*`) → token key → color. Keys are `token` or
    /// `role:token`.
    #[serde(default)]
    pub colors: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, alias = "auto_color")]
    pub auto_color: Vec<AutoColorScope>,
    /// Overrides the host palette when present
    #[serde(default)]
    pub palette: Option<Vec<String>>,
}

impl SyntaxConfig {
    pub fn parse(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::ValidationError(format!("Invalid syntax config: {}", e)))
    }

    fn lookup(&self, language: &str, role: &str, token: &str) -> Option<&str> {
        let lower = token.to_lowercase();
        let keys = [
            token.to_string(),
            lower.clone(),
            format!("{role}:{token}"),
            format!("{role}:{lower}"),
        ];
        [language, ANY]
            .iter()
            .filter_map(|lang| self.colors.get(*lang))
            .flat_map(|map| keys.iter().filter_map(move |key| map.get(key)))
            .map(String::as_str)
            .find(|color| is_safe_color(color))
    }

    fn auto_enabled(&self, language: &str, role: &str) -> bool {
        self.auto_color.iter().any(|scope| scope.covers(language, role))
    }
}

/// Token color resolver bound to the active normal theme
#[derive(Debug, Clone)]
pub struct SyntaxColors {
    config: Option<SyntaxConfig>,
    palette: Vec<String>,
    fallback_palette: Vec<String>,
    cache: HashMap<(String, String, String), String>,
}

impl Default for SyntaxColors {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_PALETTE.iter().map(|c| c.to_string()).collect())
    }
}

impl SyntaxColors {
    pub fn new(fallback_palette: Vec<String>) -> Self {
        let fallback_palette: Vec<String> = fallback_palette
            .into_iter()
            .filter(|c| is_safe_color(c))
            .collect();
        Self {
            config: None,
            palette: fallback_palette.clone(),
            fallback_palette,
            cache: HashMap::new(),
        }
    }

    /// Binds a new configuration; clears cached auto colors
    pub fn set_config(&mut self, config: Option<SyntaxConfig>) {
        self.palette = config
            .as_ref()
            .and_then(|c| c.palette.as_ref())
            .map(|p| p.iter().filter(|c| is_safe_color(c)).cloned().collect::<Vec<_>>())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.fallback_palette.clone());
        self.config = config;
        self.cache.clear();
    }

    pub fn config(&self) -> Option<&SyntaxConfig> {
        self.config.as_ref()
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Palette slot for a token
    pub fn auto_index(&self, token: &str) -> Option<usize> {
        if self.palette.is_empty() {
            return None;
        }
        Some(token_hash(&normalize(token)) as usize % self.palette.len())
    }

    /// Color override for a token, or `None` to keep the default styling
    pub fn resolve(&mut self, language: &str, role: &str, token: &str) -> Option<String> {
        let config = self.config.as_ref()?;
        if let Some(color) = config.lookup(language, role, token) {
            return Some(color.to_string());
        }
        if !config.auto_enabled(language, role) {
            return None;
        }

        let normalized = normalize(token);
        if normalized.is_empty() {
            return None;
        }
        let key = (language.to_string(), role.to_string(), normalized);
        if let Some(color) = self.cache.get(&key) {
            return Some(color.clone());
        }
        let color = self.palette.get(self.auto_index(&key.2)?)?.clone();
        self.cache.insert(key, color.clone());
        Some(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> SyntaxConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_allow_list() {
        assert!(is_safe_color("#ff00aa"));
        assert!(is_safe_color("rgb(10, 20, 30)"));
        assert!(is_safe_color("hsl(120, 50%, 40.5%)"));
        assert!(is_safe_color("rebeccapurple"));
        assert!(!is_safe_color(""));
        assert!(!is_safe_color("red; background: url(x)"));
        assert!(!is_safe_color("expression(alert('x'))"));
        assert!(!is_safe_color(&"a".repeat(65)));
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(token_hash("foo"), 101_574);
        let colors = SyntaxColors::default();
        assert_eq!(colors.auto_index("foo"), Some(0));
        assert_eq!(colors.auto_index("bar"), Some(3));
        assert_eq!(colors.auto_index("baz"), Some(5));
        assert_eq!(colors.auto_index("  FOO "), Some(0));
        assert_ne!(token_hash("ab"), token_hash("ba"));
    }

    #[test]
    fn test_resolution_order() {
        let mut colors = SyntaxColors::default();
        colors.set_config(Some(config(json!({
            "colors": {
                "python": { "self": "#111111", "keyword:def": "#222222" },
                "*": { "def": "#333333", "print": "#444444", "Self": "#555555" }
            }
        }))));

        assert_eq!(colors.resolve("python", "keyword", "self").as_deref(), Some("#111111"));
        // the language map is searched completely before the wildcard map
        assert_eq!(colors.resolve("python", "keyword", "def").as_deref(), Some("#222222"));
        assert_eq!(colors.resolve("python", "builtin", "print").as_deref(), Some("#444444"));
        assert_eq!(colors.resolve("python", "builtin", "SELF").as_deref(), Some("#111111"));
        assert_eq!(colors.resolve("rust", "keyword", "Self").as_deref(), Some("#555555"));
        assert_eq!(colors.resolve("python", "builtin", "len"), None);
    }

    #[test]
    fn test_unsafe_candidates_are_skipped() {
        let mut colors = SyntaxColors::default();
        colors.set_config(Some(config(json!({
            "colors": {
                "js": { "x": "red; display:none" },
                "*": { "x": "#abcdef" }
            }
        }))));
        assert_eq!(colors.resolve("js", "identifier", "x").as_deref(), Some("#abcdef"));
    }

    #[test]
    fn test_auto_color_scope_and_cache() {
        let mut colors = SyntaxColors::default();
        colors.set_config(Some(config(json!({
            "autoColor": [{ "language": "python", "role": "identifier" }]
        }))));

        let first = colors.resolve("python", "identifier", "foo").unwrap();
        assert_eq!(first, DEFAULT_AUTO_PALETTE[0]);
        assert_eq!(colors.resolve("python", "identifier", "foo").unwrap(), first);
        assert_eq!(colors.cached_len(), 1);
        assert_eq!(colors.resolve("python", "keyword", "foo"), None);
        assert_eq!(colors.resolve("js", "identifier", "foo"), None);

        colors.set_config(None);
        assert_eq!(colors.cached_len(), 0);
        assert_eq!(colors.resolve("python", "identifier", "foo"), None);
    }

    #[test]
    fn test_theme_palette_overrides_fallback() {
        let mut colors = SyntaxColors::default();
        colors.set_config(Some(config(json!({
            "autoColor": [{}],
            "palette": ["#010101", "bad;value", "#020202"]
        }))));
        assert_eq!(colors.palette().len(), 2);
        let color = colors.resolve("any", "any", "foo").unwrap();
        assert!(color == "#010101" || color == "#020202");
    }
}
