//! Theme Pipeline
//!
//! Three independent sources style the editor:
//! - the built-in UI theme, a single body class switch
//! - the normal theme, either a built-in editor class or an extension's CSS
//!   variables plus its syntax colors
//! - the UI-layout theme, extension CSS variables on a separate layer
//!
//! Each CSS layer keeps a ledger of the property names it injected so the next
//! switch removes exactly that set.

pub mod css;
pub mod style;
pub mod syntax;

pub use css::{parse_custom_properties, Declaration};
pub use style::{RootStyle, StyleLayer};
pub use syntax::{is_safe_color, AutoColorScope, SyntaxColors, SyntaxConfig, DEFAULT_AUTO_PALETTE};

use serde::Serialize;

use crate::core::CoreResult;

/// Built-in UI theme rendered without a class
pub const BASE_UI_THEME: &str = "dark";

/// Built-in editor themes that need no extension
pub const BUILTIN_EDITOR_THEMES: &[&str] = &["default", "dark", "monokai", "dracula"];

/// Which source currently drives the normal theme
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum NormalTheme {
    #[default]
    None,
    BuiltIn(String),
    Extension(String),
}

impl NormalTheme {
    pub fn id(&self) -> Option<&str> {
        match self {
            NormalTheme::None => None,
            NormalTheme::BuiltIn(id) | NormalTheme::Extension(id) => Some(id),
        }
    }
}

/// One CSS injection point and its ledger
#[derive(Debug, Clone)]
pub struct InjectedLayer {
    layer: StyleLayer,
    active: Option<String>,
    ledger: Vec<String>,
}

impl InjectedLayer {
    pub fn new(layer: StyleLayer) -> Self {
        Self {
            layer,
            active: None,
            ledger: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Property names this layer currently owns
    pub fn ledger(&self) -> &[String] {
        &self.ledger
    }

    /// Removes exactly the properties this layer applied
    pub fn teardown(&mut self, root: &mut RootStyle) {
        for name in self.ledger.drain(..) {
            root.remove(self.layer, &name);
        }
        self.active = None;
    }

    /// Replaces the layer's contents with `css`; on a parse failure the layer
    /// is left empty.
    pub fn apply(&mut self, root: &mut RootStyle, id: &str, css: &str) -> CoreResult<usize> {
        self.teardown(root);
        let declarations = parse_custom_properties(css)?;
        for declaration in declarations {
            if !self.ledger.contains(&declaration.name) {
                self.ledger.push(declaration.name.clone());
            }
            root.set(self.layer, declaration);
        }
        self.active = Some(id.to_string());
        Ok(self.ledger.len())
    }
}

/// Serializable view of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSnapshot {
    pub ui_theme: String,
    pub ui_class: Option<String>,
    pub normal: NormalTheme,
    pub editor_class: Option<String>,
    pub ui_layout: Option<String>,
    pub normal_properties: Vec<String>,
    pub ui_layout_properties: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ThemePipeline {
    ui_theme: String,
    normal: NormalTheme,
    root: RootStyle,
    normal_layer: InjectedLayer,
    ui_layout_layer: InjectedLayer,
    syntax: SyntaxColors,
}

impl Default for ThemePipeline {
    fn default() -> Self {
        Self::new(RootStyle::default(), SyntaxColors::default())
    }
}

impl ThemePipeline {
    pub fn new(root: RootStyle, syntax: SyntaxColors) -> Self {
        Self {
            ui_theme: BASE_UI_THEME.to_string(),
            normal: NormalTheme::None,
            root,
            normal_layer: InjectedLayer::new(StyleLayer::Normal),
            ui_layout_layer: InjectedLayer::new(StyleLayer::UiLayout),
            syntax,
        }
    }

    // =========================================================================
    // Built-in UI theme
    // =========================================================================

    pub fn set_ui_theme(&mut self, name: &str) {
        self.ui_theme = name.to_string();
    }

    pub fn ui_theme(&self) -> &str {
        &self.ui_theme
    }

    /// Body class for the UI theme; the base theme has none
    pub fn ui_class(&self) -> Option<String> {
        theme_class(&self.ui_theme, BASE_UI_THEME)
    }

    // =========================================================================
    // Normal theme
    // =========================================================================

    pub fn normal(&self) -> &NormalTheme {
        &self.normal
    }

    /// Editor class for a built-in normal theme
    pub fn editor_class(&self) -> Option<String> {
        match &self.normal {
            NormalTheme::BuiltIn(name) => theme_class(name, "default"),
            _ => None,
        }
    }

    /// Switches to a built-in editor theme, tearing down extension CSS
    pub fn use_builtin_theme(&mut self, name: &str) {
        self.normal_layer.teardown(&mut self.root);
        self.syntax.set_config(None);
        self.normal = NormalTheme::BuiltIn(name.to_string());
    }

    /// Applies an extension theme's CSS and syntax colors. A parse failure
    /// falls back to no normal theme.
    pub fn use_extension_theme(
        &mut self,
        id: &str,
        css: &str,
        syntax: Option<SyntaxConfig>,
    ) -> CoreResult<usize> {
        match self.normal_layer.apply(&mut self.root, id, css) {
            Ok(applied) => {
                self.syntax.set_config(syntax);
                self.normal = NormalTheme::Extension(id.to_string());
                tracing::info!("Applied theme '{}' ({} properties)", id, applied);
                Ok(applied)
            }
            Err(e) => {
                tracing::warn!("Theme '{}' rejected: {}", id, e);
                self.clear_normal_theme();
                Err(e)
            }
        }
    }

    /// Restores the built-in appearance
    pub fn clear_normal_theme(&mut self) {
        self.normal_layer.teardown(&mut self.root);
        self.syntax.set_config(None);
        self.normal = NormalTheme::None;
    }

    pub fn normal_layer(&self) -> &InjectedLayer {
        &self.normal_layer
    }

    // =========================================================================
    // UI-layout theme
    // =========================================================================

    pub fn apply_ui_layout(&mut self, id: &str, css: &str) -> CoreResult<usize> {
        self.ui_layout_layer
            .apply(&mut self.root, id, css)
            .inspect_err(|e| tracing::warn!("UI layout theme '{}' rejected: {}", id, e))
    }

    pub fn clear_ui_layout(&mut self) {
        self.ui_layout_layer.teardown(&mut self.root);
    }

    pub fn ui_layout_layer(&self) -> &InjectedLayer {
        &self.ui_layout_layer
    }

    // =========================================================================
    // Shared state
    // =========================================================================

    pub fn root(&self) -> &RootStyle {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut RootStyle {
        &mut self.root
    }

    pub fn syntax(&self) -> &SyntaxColors {
        &self.syntax
    }

    /// Color override for a token under the active normal theme
    pub fn token_color(&mut self, language: &str, role: &str, token: &str) -> Option<String> {
        self.syntax.resolve(language, role, token)
    }

    pub fn snapshot(&self) -> ThemeSnapshot {
        ThemeSnapshot {
            ui_theme: self.ui_theme.clone(),
            ui_class: self.ui_class(),
            normal: self.normal.clone(),
            editor_class: self.editor_class(),
            ui_layout: self.ui_layout_layer.active().map(str::to_string),
            normal_properties: self.normal_layer.ledger().to_vec(),
            ui_layout_properties: self.ui_layout_layer.ledger().to_vec(),
        }
    }
}

fn theme_class(name: &str, classless: &str) -> Option<String> {
    (name != classless).then(|| format!("theme-{}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const THEME_A: &str = ":root { --bg-primary: #272822; --accent: #f92672; --only-a: 1px; }";
    const THEME_B: &str = ":root { --bg-primary: #282a36 !important; --accent: #bd93f9; }";

    fn pipeline() -> ThemePipeline {
        ThemePipeline::new(
            RootStyle::with_base([("--bg-primary", "#1e1e1e"), ("--accent", "#0a84ff")]),
            SyntaxColors::default(),
        )
    }

    #[test]
    fn test_ui_class_switch() {
        let mut themes = pipeline();
        assert_eq!(themes.ui_class(), None);
        themes.set_ui_theme("cyberpunk");
        assert_eq!(themes.ui_class().as_deref(), Some("theme-cyberpunk"));
        assert_eq!(themes.root().computed_all().len(), 2);
    }

    #[test]
    fn test_switching_themes_leaves_nothing_behind() {
        let mut themes = pipeline();
        let before = themes.root().computed_all();

        assert_eq!(themes.use_extension_theme("a", THEME_A, None).unwrap(), 3);
        assert_eq!(themes.root().computed("--only-a"), Some("1px"));

        themes.use_extension_theme("b", THEME_B, None).unwrap();
        assert_eq!(themes.root().computed("--only-a"), None);
        assert_eq!(themes.root().computed("--bg-primary"), Some("#282a36"));
        assert_eq!(themes.normal(), &NormalTheme::Extension("b".into()));

        themes.clear_normal_theme();
        assert_eq!(themes.root().computed_all(), before);
        assert_eq!(themes.normal(), &NormalTheme::None);
    }

    #[test]
    fn test_layers_tear_down_independently() {
        let mut themes = pipeline();
        let before = themes.root().computed_all();

        themes
            .apply_ui_layout("chrome", ":root { --accent: #ff9f0a; --radius: 4px; }")
            .unwrap();
        themes.use_extension_theme("a", THEME_A, None).unwrap();
        assert_eq!(themes.root().computed("--accent"), Some("#f92672"));
        assert_eq!(themes.root().computed("--radius"), Some("4px"));

        themes.clear_normal_theme();
        assert_eq!(themes.root().computed("--accent"), Some("#ff9f0a"));
        assert_eq!(themes.ui_layout_layer().active(), Some("chrome"));

        themes.clear_ui_layout();
        assert_eq!(themes.root().computed_all(), before);
    }

    #[test]
    fn test_invalid_css_falls_back_to_default() {
        let mut themes = pipeline();
        let before = themes.root().computed_all();
        themes.use_extension_theme("a", THEME_A, None).unwrap();

        let err = themes
            .use_extension_theme("broken", ":root { --x: 1", None)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(themes.normal(), &NormalTheme::None);
        assert_eq!(themes.root().computed_all(), before);
    }

    #[test]
    fn test_builtin_theme_uses_class_and_clears_syntax() {
        let mut themes = pipeline();
        let syntax = SyntaxConfig::parse(r#"{"autoColor": [{}]}"#).unwrap();
        themes.use_extension_theme("a", THEME_A, Some(syntax)).unwrap();
        assert!(themes.token_color("python", "identifier", "foo").is_some());

        themes.use_builtin_theme("monokai");
        assert_eq!(themes.editor_class().as_deref(), Some("theme-monokai"));
        assert!(themes.normal_layer().ledger().is_empty());
        assert_eq!(themes.token_color("python", "identifier", "foo"), None);

        let snapshot = themes.snapshot();
        assert_eq!(snapshot.normal, NormalTheme::BuiltIn("monokai".into()));
        assert!(snapshot.normal_properties.is_empty());
    }
}
