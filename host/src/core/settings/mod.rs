//! Settings Persistence
//!
//! The editor's single settings document:
//! - Atomic file writes (temp file + rename)
//! - Tolerant normalization instead of hard failures
//! - Advisory locking against concurrent writers
//!
//! Storage location: {data_dir}/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::fs::atomic_write_json_pretty;
use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Maximum number of remembered projects.
pub const MAX_RECENT_PROJECTS: usize = 5;

/// Built-in UI themes, in toggle order.
pub const UI_THEMES: &[&str] = &["dark", "light", "cyberpunk"];

/// Persisted editor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Built-in UI class theme (`dark`, `light`, `cyberpunk`)
    #[serde(default = "default_ui_theme")]
    pub ui_theme: String,

    /// Normal theme selection: `default` or an extension id
    #[serde(default = "default_editor_theme")]
    pub editor_theme: String,

    /// UI-layout theme extension id, if any
    #[serde(default)]
    pub ui_layout_theme: Option<String>,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default = "default_font_size")]
    pub font_size: u32,

    #[serde(default = "default_tab_size")]
    pub tab_size: u32,

    #[serde(default)]
    pub word_wrap: bool,

    #[serde(default = "default_true")]
    pub minimap: bool,

    #[serde(default = "default_true")]
    pub console_open: bool,

    /// Most recent first, unique by path
    #[serde(default)]
    pub recent_projects: Vec<RecentProject>,

    /// Token used by publish/sync actions
    #[serde(default, alias = "github_token")]
    pub access_token: Option<String>,
}

/// A remembered project folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentProject {
    pub name: String,
    pub path: String,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_ui_theme() -> String {
    "dark".to_string()
}

fn default_editor_theme() -> String {
    "default".to_string()
}

fn default_font_family() -> String {
    "'Fira Code', monospace".to_string()
}

fn default_font_size() -> u32 {
    14
}

fn default_tab_size() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            ui_theme: default_ui_theme(),
            editor_theme: default_editor_theme(),
            ui_layout_theme: None,
            font_family: default_font_family(),
            font_size: default_font_size(),
            tab_size: default_tab_size(),
            word_wrap: false,
            minimap: true,
            console_open: true,
            recent_projects: Vec::new(),
            access_token: None,
        }
    }
}

impl EditorSettings {
    /// Normalizes settings so persisted state is always valid.
    ///
    /// Corrects bad values instead of failing, so an old or hand-edited
    /// document never blocks startup.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.ui_theme = normalize_enum(&self.ui_theme, UI_THEMES, default_ui_theme());

        if self.editor_theme.trim().is_empty() {
            self.editor_theme = default_editor_theme();
        }
        if self
            .ui_layout_theme
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            self.ui_layout_theme = None;
        }
        if self.font_family.trim().is_empty() {
            self.font_family = default_font_family();
        }

        self.font_size = self.font_size.clamp(8, 48);
        self.tab_size = self.tab_size.clamp(1, 16);

        let mut seen = Vec::new();
        self.recent_projects.retain(|project| {
            if project.path.trim().is_empty() || seen.contains(&project.path) {
                return false;
            }
            seen.push(project.path.clone());
            true
        });
        self.recent_projects.truncate(MAX_RECENT_PROJECTS);

        if self
            .access_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.access_token = None;
        }
    }

    /// Moves (or inserts) a project to the front of the recent list.
    pub fn push_recent_project(&mut self, name: impl Into<String>, path: impl Into<String>) {
        let path = path.into();
        self.recent_projects.retain(|p| p.path != path);
        self.recent_projects.insert(
            0,
            RecentProject {
                name: name.into(),
                path,
            },
        );
        self.recent_projects.truncate(MAX_RECENT_PROJECTS);
    }

    /// Returns the UI theme that follows the current one in toggle order.
    pub fn next_ui_theme(&self) -> &'static str {
        let current = UI_THEMES
            .iter()
            .position(|t| *t == self.ui_theme)
            .unwrap_or(0);
        UI_THEMES[(current + 1) % UI_THEMES.len()]
    }
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Loads, saves and resets the settings document
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager rooted at the given data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            settings_path: data_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file).map_err(|e| {
                CoreError::Internal(format!("Failed to lock settings file (exclusive): {e}"))
            })?;
        } else {
            fs2::FileExt::lock_shared(&lock_file).map_err(|e| {
                CoreError::Internal(format!("Failed to lock settings file (shared): {e}"))
            })?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> EditorSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(EditorSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<EditorSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                EditorSettings::default()
            }
        }
    }

    /// Normalize and persist; returns the document as written
    pub fn save(&self, settings: &EditorSettings) -> CoreResult<EditorSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();
            atomic_write_json_pretty(&self.settings_path, &normalized)?;
            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Load, apply `change`, save. Every mutating change rewrites the document.
    pub fn update(&self, change: impl FnOnce(&mut EditorSettings)) -> CoreResult<EditorSettings> {
        let mut settings = self.load();
        change(&mut settings);
        self.save(&settings)
    }

    /// Delete the settings file and return defaults
    pub fn reset(&self) -> CoreResult<EditorSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(EditorSettings::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ============================================================
    // Document Tests
    // ============================================================

    #[test]
    fn test_defaults() {
        let settings = EditorSettings::default();
        assert_eq!(settings.ui_theme, "dark");
        assert_eq!(settings.editor_theme, "default");
        assert_eq!(settings.font_size, 14);
        assert_eq!(settings.tab_size, 4);
        assert!(settings.minimap);
        assert!(settings.console_open);
        assert!(settings.recent_projects.is_empty());
    }

    #[test]
    fn test_normalize_fixes_invalid_values() {
        let mut settings = EditorSettings {
            ui_theme: "NEON".into(),
            editor_theme: "  ".into(),
            ui_layout_theme: Some(String::new()),
            font_size: 200,
            tab_size: 0,
            access_token: Some(" ".into()),
            ..Default::default()
        };
        settings.normalize();

        assert_eq!(settings.ui_theme, "dark");
        assert_eq!(settings.editor_theme, "default");
        assert_eq!(settings.ui_layout_theme, None);
        assert_eq!(settings.font_size, 48);
        assert_eq!(settings.tab_size, 1);
        assert_eq!(settings.access_token, None);
    }

    #[test]
    fn test_normalize_lowercases_known_theme() {
        let mut settings = EditorSettings {
            ui_theme: "CyberPunk".into(),
            ..Default::default()
        };
        settings.normalize();
        assert_eq!(settings.ui_theme, "cyberpunk");
    }

    #[test]
    fn test_recent_projects_are_mru_unique_and_capped() {
        let mut settings = EditorSettings::default();
        for i in 0..7 {
            settings.push_recent_project(format!("p{i}"), format!("/work/p{i}"));
        }
        assert_eq!(settings.recent_projects.len(), MAX_RECENT_PROJECTS);
        assert_eq!(settings.recent_projects[0].path, "/work/p6");

        settings.push_recent_project("again", "/work/p4");
        assert_eq!(settings.recent_projects.len(), MAX_RECENT_PROJECTS);
        assert_eq!(settings.recent_projects[0].name, "again");
        assert_eq!(
            settings
                .recent_projects
                .iter()
                .filter(|p| p.path == "/work/p4")
                .count(),
            1
        );
    }

    #[test]
    fn test_next_ui_theme_cycles() {
        let mut settings = EditorSettings::default();
        assert_eq!(settings.next_ui_theme(), "light");
        settings.ui_theme = "cyberpunk".into();
        assert_eq!(settings.next_ui_theme(), "dark");
    }

    #[test]
    fn test_legacy_token_key_is_accepted() {
        let json = r#"{"uiTheme":"light","github_token":"abc"}"#;
        let settings: EditorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.access_token.as_deref(), Some("abc"));
        assert_eq!(settings.ui_theme, "light");
        assert_eq!(settings.font_size, 14);
    }

    // ============================================================
    // Manager Tests
    // ============================================================

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        assert_eq!(manager.load(), EditorSettings::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());

        let mut settings = EditorSettings::default();
        settings.ui_theme = "light".into();
        settings.push_recent_project("demo", "/tmp/demo");
        let saved = manager.save(&settings).unwrap();

        assert_eq!(manager.load(), saved);
        assert!(manager.settings_path().exists());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        std::fs::write(manager.settings_path(), "{ not json").unwrap();
        assert_eq!(manager.load(), EditorSettings::default());
    }

    #[test]
    fn test_update_persists_change() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());

        manager.update(|s| s.font_size = 18).unwrap();
        assert_eq!(manager.load().font_size, 18);
    }

    #[test]
    fn test_reset_deletes_file() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        manager.save(&EditorSettings::default()).unwrap();

        let reset = manager.reset().unwrap();
        assert_eq!(reset, EditorSettings::default());
        assert!(!manager.settings_path().exists());
    }
}
