//! Extension Manifest
//!
//! Metadata, declared toolbar buttons and dispatch priority of an extension.
//! Manifests are read from the optional `manifest.json` at the root of a
//! bundle, and extension modules may also register one directly.

use serde::{Deserialize, Serialize};

use crate::core::fs::validate_path_id_component;
use crate::core::{CoreError, CoreResult};

/// Manifest file name inside a bundle
pub const MANIFEST_FILE: &str = "manifest.json";

/// Extension manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    /// Unique extension identifier (e.g., "image-viewer")
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Semantic version (e.g., "1.0.0")
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Icon name shown in the extension list
    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    /// Accent color for the extension card
    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    /// Toolbar buttons contributed by this extension
    #[serde(default, alias = "ui_buttons")]
    pub ui_buttons: Vec<UiButton>,

    /// File extensions this extension claims (e.g., [".png", ".jpg"])
    #[serde(default, alias = "file_types")]
    pub file_types: Vec<String>,

    /// Whether the bundle ships `wordlists/<language>.json`
    #[serde(default, alias = "has_wordlists")]
    pub has_wordlists: bool,

    /// Entry file relative to the bundle root (e.g., "main.wasm")
    #[serde(default)]
    pub entry: Option<String>,

    /// Hook dispatch precedence; higher runs first
    #[serde(default)]
    pub priority: i32,
}

/// A toolbar button declared in a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiButton {
    #[serde(default)]
    pub icon: String,
    pub label: String,
    /// Name of the handler action invoked on click
    pub action: String,
    /// Extensions the button applies to; empty means every file
    #[serde(default, alias = "file_types")]
    pub file_types: Vec<String>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl ExtensionManifest {
    /// Minimal manifest with just an id and a display name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_button(mut self, button: UiButton) -> Self {
        self.ui_buttons.push(button);
        self
    }

    /// Parses and validates a manifest from a JSON string
    pub fn parse(json: &str) -> CoreResult<Self> {
        let mut manifest: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidManifest(format!("Invalid manifest JSON: {}", e)))?;

        if manifest.name.trim().is_empty() {
            manifest.name = manifest.id.clone();
        }
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates manifest fields
    pub fn validate(&self) -> CoreResult<()> {
        validate_path_id_component(&self.id, "extension id").map_err(CoreError::InvalidManifest)?;

        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidManifest(
                "Extension name cannot be empty".to_string(),
            ));
        }

        if !Self::is_valid_semver(&self.version) {
            return Err(CoreError::InvalidManifest(format!(
                "Invalid version format: {}. Expected semver (e.g., 1.0.0)",
                self.version
            )));
        }

        for button in &self.ui_buttons {
            if button.action.trim().is_empty() {
                return Err(CoreError::InvalidManifest(format!(
                    "Button '{}' has no action",
                    button.label
                )));
            }
        }

        Ok(())
    }

    /// Fills metadata the registered manifest left empty from the bundle's
    /// `manifest.json`.
    pub fn fill_missing_from(&mut self, bundle: &ExtensionManifest) {
        if self.color.is_none() {
            self.color = bundle.color.clone();
        }
        if self.author.is_none() {
            self.author = bundle.author.clone();
        }
        if self.category.is_none() {
            self.category = bundle.category.clone();
        }
        if self.description.is_none() {
            self.description = bundle.description.clone();
        }
        if self.icon.is_none() {
            self.icon = bundle.icon.clone();
        }
    }

    /// Whether this extension declares the given dotted file extension
    pub fn claims_file_type(&self, ext: &str) -> bool {
        matches_file_type(&self.file_types, ext)
    }

    fn is_valid_semver(version: &str) -> bool {
        let parts: Vec<&str> = version.split('.').collect();
        if parts.len() != 3 {
            return false;
        }

        parts.iter().all(|part| part.parse::<u32>().is_ok())
    }
}

impl UiButton {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn for_file_types(mut self, types: &[&str]) -> Self {
        self.file_types = types.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Case-insensitive membership of a dotted extension in a declared list
pub fn matches_file_type(file_types: &[String], ext: &str) -> bool {
    file_types.iter().any(|ft| ft.eq_ignore_ascii_case(ext))
}

/// Derives the dotted, lower-cased extension of a path (`"a/B.PNG"` → `".png"`).
///
/// A path without a dot yields the whole last segment, matching how the
/// editor names extension-less files.
pub fn file_extension_of(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let ext = name.rsplit('.').next().unwrap_or(name);
    format!(".{}", ext.to_lowercase())
}

// ============================================================================
// Tests
// ============================================================================
