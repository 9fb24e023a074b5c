//! Local filesystem/process implementation of [`HostBridge`].
//!
//! Layout under the data directory:
//!
//! ```text
//! extensions/<id>/...          installed bundles
//! extensions/.disabled.json    ids of disabled bundles
//! storage/<namespace>.json     per-extension key/value store
//! settings.json                editor settings document
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{BundleListing, DirEntry, HostBridge, ScriptOutput, ThemeLayerKind};
use crate::core::fs::{atomic_write_bytes, atomic_write_json_pretty, resolve_in_bundle, validate_path_id_component};
use crate::core::process::{run_captured, shell_command, ExecOutput};
use crate::core::settings::{EditorSettings, SettingsManager};
use crate::core::{CoreError, CoreResult};

const EXTENSIONS_DIR: &str = "extensions";
const STORAGE_DIR: &str = "storage";
const DISABLED_FILE: &str = ".disabled.json";
const NORMAL_THEME_FILE: &str = "theme.css";
const UI_LAYOUT_THEME_FILE: &str = "ui-theme.css";

/// Configuration for [`LocalBridge`]
#[derive(Debug, Clone)]
pub struct LocalBridgeConfig {
    /// Root of all persisted state
    pub data_dir: PathBuf,
    /// Directory holding installable bundles (`<catalog>/<id>/...`)
    pub catalog_dir: Option<PathBuf>,
    /// Interpreter used by `run_script`
    pub script_interpreter: String,
}

impl Default for LocalBridgeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("dex-studio");
        Self {
            data_dir,
            catalog_dir: None,
            script_interpreter: "python3".to_string(),
        }
    }
}

impl LocalBridgeConfig {
    pub fn rooted_at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_catalog(mut self, catalog_dir: impl Into<PathBuf>) -> Self {
        self.catalog_dir = Some(catalog_dir.into());
        self
    }
}

/// Bridge backed by the local disk and child processes
pub struct LocalBridge {
    config: LocalBridgeConfig,
    settings: SettingsManager,
}

impl LocalBridge {
    pub fn new(config: LocalBridgeConfig) -> Self {
        let settings = SettingsManager::new(&config.data_dir);
        Self { config, settings }
    }

    pub fn config(&self) -> &LocalBridgeConfig {
        &self.config
    }

    pub fn extensions_dir(&self) -> PathBuf {
        self.config.data_dir.join(EXTENSIONS_DIR)
    }

    fn bundle_dir(&self, id: &str) -> CoreResult<PathBuf> {
        validate_path_id_component(id, "extensionId").map_err(CoreError::ValidationError)?;
        Ok(self.extensions_dir().join(id))
    }

    fn storage_path(&self, namespace: &str) -> CoreResult<PathBuf> {
        validate_path_id_component(namespace, "storage namespace")
            .map_err(CoreError::ValidationError)?;
        Ok(self
            .config
            .data_dir
            .join(STORAGE_DIR)
            .join(format!("{namespace}.json")))
    }

    fn disabled_path(&self) -> PathBuf {
        self.extensions_dir().join(DISABLED_FILE)
    }

    async fn read_disabled(&self) -> Vec<String> {
        match tokio::fs::read_to_string(self.disabled_path()).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable disabled list: {}", e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Resolves a bundle file and checks that, after symlinks, it still lives
    /// inside the bundle folder.
    async fn contained_bundle_path(&self, bundle: &str, relative: &str) -> CoreResult<PathBuf> {
        let dir = self.bundle_dir(bundle)?;
        let candidate = resolve_in_bundle(&dir, relative)?;

        let real_dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|_| CoreError::ExtensionNotFound(bundle.to_string()))?;
        let real_file = tokio::fs::canonicalize(&candidate).await?;
        if !real_file.starts_with(&real_dir) {
            return Err(CoreError::ValidationError(format!(
                "Access denied: '{relative}' resolves outside extension '{bundle}'"
            )));
        }
        Ok(real_file)
    }

    async fn read_namespace(&self, namespace: &str) -> CoreResult<BTreeMap<String, serde_json::Value>> {
        let path = self.storage_path(namespace)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_namespace(
        &self,
        namespace: &str,
        values: &BTreeMap<String, serde_json::Value>,
    ) -> CoreResult<()> {
        atomic_write_json_pretty(&self.storage_path(namespace)?, values)
    }
}

fn copy_tree(src: &Path, dest: &Path) -> CoreResult<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| CoreError::Internal(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl HostBridge for LocalBridge {
    // =========================================================================
    // Extension bundles
    // =========================================================================

    async fn list_extensions(&self) -> CoreResult<Vec<BundleListing>> {
        let dir = self.extensions_dir();
        if !dir.exists() {
            debug!("Extensions directory {:?} does not exist", dir);
            return Ok(Vec::new());
        }

        let disabled = self.read_disabled().await;
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| BundleListing {
                disabled: disabled.contains(&name),
                name,
            })
            .collect())
    }

    async fn read_bundle_file(&self, bundle: &str, relative: &str) -> CoreResult<Vec<u8>> {
        let path = self.contained_bundle_path(bundle, relative).await?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn list_bundle_files(&self, bundle: &str) -> CoreResult<Vec<String>> {
        let dir = self.bundle_dir(bundle)?;
        if !dir.is_dir() {
            return Err(CoreError::ExtensionNotFound(bundle.to_string()));
        }
        let mut files: Vec<String> = WalkDir::new(&dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&dir)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    async fn write_bundle_file(&self, bundle: &str, relative: &str, bytes: &[u8]) -> CoreResult<()> {
        let dir = self.bundle_dir(bundle)?;
        let path = resolve_in_bundle(&dir, relative)?;
        atomic_write_bytes(&path, bytes)
    }

    async fn install_extension(&self, id: &str) -> CoreResult<()> {
        let dest = self.bundle_dir(id)?;
        if dest.exists() {
            return Err(CoreError::ValidationError(format!(
                "Extension '{id}' is already installed"
            )));
        }
        let catalog = self
            .config
            .catalog_dir
            .as_ref()
            .ok_or_else(|| CoreError::BridgeFailed("No extension catalog configured".into()))?;
        let source = catalog.join(id);
        if !source.is_dir() {
            return Err(CoreError::ExtensionNotFound(id.to_string()));
        }

        if let Err(e) = copy_tree(&source, &dest) {
            let _ = std::fs::remove_dir_all(&dest);
            return Err(e);
        }
        info!("Installed extension '{}' from {:?}", id, source);
        Ok(())
    }

    async fn uninstall_extension(&self, id: &str) -> CoreResult<()> {
        let dir = self.bundle_dir(id)?;
        if !dir.exists() {
            return Err(CoreError::ExtensionNotFound(id.to_string()));
        }
        tokio::fs::remove_dir_all(&dir).await?;

        let mut disabled = self.read_disabled().await;
        if disabled.iter().any(|d| d == id) {
            disabled.retain(|d| d != id);
            atomic_write_json_pretty(&self.disabled_path(), &disabled)?;
        }
        info!("Uninstalled extension '{}'", id);
        Ok(())
    }

    async fn stage_bundle(&self, source_dir: &str, bundle: &str) -> CoreResult<()> {
        let source = Path::new(source_dir);
        if !source.is_dir() {
            return Err(CoreError::ValidationError(format!(
                "'{source_dir}' is not a directory"
            )));
        }
        let dest = self.bundle_dir(bundle)?;
        if dest.exists() {
            tokio::fs::remove_dir_all(&dest).await?;
        }
        if let Err(e) = copy_tree(source, &dest) {
            let _ = std::fs::remove_dir_all(&dest);
            return Err(e);
        }
        info!("Staged {:?} as extension bundle '{}'", source, bundle);
        Ok(())
    }

    async fn set_extension_enabled(&self, id: &str, enabled: bool) -> CoreResult<()> {
        validate_path_id_component(id, "extensionId").map_err(CoreError::ValidationError)?;
        let mut disabled = self.read_disabled().await;
        disabled.retain(|d| d != id);
        if !enabled {
            disabled.push(id.to_string());
        }
        atomic_write_json_pretty(&self.disabled_path(), &disabled)
    }

    // =========================================================================
    // Filesystem
    // =========================================================================

    async fn read_file(&self, path: &str) -> CoreResult<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_file(&self, path: &str, content: &str) -> CoreResult<()> {
        Ok(tokio::fs::write(path, content).await?)
    }

    async fn list_dir(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        let mut items = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            items.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path().to_string_lossy().to_string(),
                is_dir: entry.file_type().await?.is_dir(),
            });
        }
        items.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    async fn create_file(&self, path: &str) -> CoreResult<()> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(path, "").await?)
    }

    async fn create_dir(&self, path: &str) -> CoreResult<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn delete(&self, path: &str) -> CoreResult<()> {
        let meta = tokio::fs::metadata(path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> CoreResult<()> {
        Ok(tokio::fs::rename(from, to).await?)
    }

    async fn exists(&self, path: &str) -> CoreResult<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    // =========================================================================
    // Processes
    // =========================================================================

    async fn run_script(&self, path: &str, args: &[String]) -> CoreResult<ScriptOutput> {
        let mut cmd = Command::new(&self.config.script_interpreter);
        cmd.arg(path).args(args);
        match run_captured(cmd).await {
            Ok(out) => Ok(out.into()),
            Err(e) => Ok(ScriptOutput {
                success: false,
                code: -1,
                error: Some(format!(
                    "Failed to start '{}': {}",
                    self.config.script_interpreter, e
                )),
                ..Default::default()
            }),
        }
    }

    async fn exec(&self, command: &str) -> CoreResult<ExecOutput> {
        Ok(run_captured(shell_command(command)).await?)
    }

    // =========================================================================
    // Storage
    // =========================================================================

    async fn storage_get(&self, namespace: &str, key: &str) -> CoreResult<Option<serde_json::Value>> {
        Ok(self.read_namespace(namespace).await?.remove(key))
    }

    async fn storage_set(&self, namespace: &str, key: &str, value: serde_json::Value) -> CoreResult<()> {
        let mut values = self.read_namespace(namespace).await?;
        values.insert(key.to_string(), value);
        self.write_namespace(namespace, &values)
    }

    async fn storage_remove(&self, namespace: &str, key: &str) -> CoreResult<()> {
        let mut values = self.read_namespace(namespace).await?;
        if values.remove(key).is_some() {
            self.write_namespace(namespace, &values)?;
        }
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    async fn load_settings(&self) -> CoreResult<EditorSettings> {
        Ok(self.settings.load())
    }

    async fn save_settings(&self, settings: &EditorSettings) -> CoreResult<EditorSettings> {
        self.settings.save(settings)
    }

    // =========================================================================
    // Themes
    // =========================================================================

    async fn load_theme_css(&self, kind: ThemeLayerKind, id: &str) -> CoreResult<String> {
        let file = match kind {
            ThemeLayerKind::Normal => NORMAL_THEME_FILE,
            ThemeLayerKind::UiLayout => UI_LAYOUT_THEME_FILE,
        };
        let bytes = self.read_bundle_file(id, file).await?;
        String::from_utf8(bytes)
            .map_err(|e| CoreError::ValidationError(format!("Theme '{id}' is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn bridge_with_bundle(dir: &TempDir) -> LocalBridge {
        let ext = dir.path().join("extensions").join("image-viewer");
        std::fs::create_dir_all(ext.join("wordlists")).unwrap();
        std::fs::write(ext.join("manifest.json"), r#"{"id":"image-viewer"}"#).unwrap();
        std::fs::write(ext.join("wordlists").join("css.json"), "[]").unwrap();
        std::fs::write(ext.join("theme.css"), ":root { --bg: #000; }").unwrap();
        LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()))
    }

    // =========================================================================
    // Bundle Tests
    // =========================================================================

    #[tokio::test]
    async fn lists_bundles_sorted_with_disabled_flag() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge_with_bundle(&dir);
        std::fs::create_dir_all(dir.path().join("extensions").join("autocomplete")).unwrap();

        bridge.set_extension_enabled("image-viewer", false).await.unwrap();
        let listing = bridge.list_extensions().await.unwrap();

        assert_eq!(
            listing,
            vec![
                BundleListing { name: "autocomplete".into(), disabled: false },
                BundleListing { name: "image-viewer".into(), disabled: true },
            ]
        );

        bridge.set_extension_enabled("image-viewer", true).await.unwrap();
        assert!(bridge.list_extensions().await.unwrap().iter().all(|b| !b.disabled));
    }

    #[tokio::test]
    async fn missing_extensions_dir_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let bridge = LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()));
        assert!(bridge.list_extensions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_bundle_files_and_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge_with_bundle(&dir);
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();

        let bytes = bridge
            .read_bundle_file("image-viewer", "wordlists/css.json")
            .await
            .unwrap();
        assert_eq!(bytes, b"[]");

        let escape = bridge
            .read_bundle_file("image-viewer", "../../secret.txt")
            .await;
        assert!(matches!(escape, Err(CoreError::ValidationError(_))));

        let files = bridge.list_bundle_files("image-viewer").await.unwrap();
        assert_eq!(files, vec!["manifest.json", "theme.css", "wordlists/css.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_out_of_bundle_is_denied() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge_with_bundle(&dir);
        let outside = dir.path().join("outside.txt");
        std::fs::write(&outside, "x").unwrap();
        std::os::unix::fs::symlink(
            &outside,
            dir.path().join("extensions").join("image-viewer").join("link.txt"),
        )
        .unwrap();

        let result = bridge.read_bundle_file("image-viewer", "link.txt").await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn install_and_uninstall_from_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = TempDir::new().unwrap();
        let source = catalog.path().join("monokai-theme");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("theme.css"), ":root { --a: 1; }").unwrap();

        let bridge = LocalBridge::new(
            LocalBridgeConfig::rooted_at(dir.path()).with_catalog(catalog.path()),
        );

        bridge.install_extension("monokai-theme").await.unwrap();
        assert!(bridge.install_extension("monokai-theme").await.is_err());
        assert_eq!(
            bridge
                .load_theme_css(ThemeLayerKind::Normal, "monokai-theme")
                .await
                .unwrap(),
            ":root { --a: 1; }"
        );

        bridge.set_extension_enabled("monokai-theme", false).await.unwrap();
        bridge.uninstall_extension("monokai-theme").await.unwrap();
        assert!(bridge.list_extensions().await.unwrap().is_empty());
        assert!(matches!(
            bridge.uninstall_extension("monokai-theme").await,
            Err(CoreError::ExtensionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stage_bundle_replaces_previous_copy() {
        let dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("manifest.json"), r#"{"id":"wip"}"#).unwrap();
        std::fs::write(project.path().join("old.txt"), "x").unwrap();
        let bridge = LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()));
        let source = project.path().to_string_lossy().to_string();

        bridge.stage_bundle(&source, "_temp_test").await.unwrap();
        std::fs::remove_file(project.path().join("old.txt")).unwrap();
        bridge.stage_bundle(&source, "_temp_test").await.unwrap();

        assert_eq!(
            bridge.list_bundle_files("_temp_test").await.unwrap(),
            vec!["manifest.json"]
        );
        assert!(bridge.stage_bundle("/definitely/not/here", "_temp_test").await.is_err());
    }

    #[tokio::test]
    async fn install_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let catalog = TempDir::new().unwrap();
        let bridge = LocalBridge::new(
            LocalBridgeConfig::rooted_at(dir.path()).with_catalog(catalog.path()),
        );
        assert!(matches!(
            bridge.install_extension("ghost").await,
            Err(CoreError::ExtensionNotFound(_))
        ));
        assert!(matches!(
            bridge.install_extension("../ghost").await,
            Err(CoreError::ValidationError(_))
        ));
    }

    // =========================================================================
    // Storage Tests
    // =========================================================================

    #[tokio::test]
    async fn storage_namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let bridge = LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()));

        bridge.storage_set("a", "count", json!(1)).await.unwrap();
        bridge.storage_set("b", "count", json!(2)).await.unwrap();

        assert_eq!(bridge.storage_get("a", "count").await.unwrap(), Some(json!(1)));
        assert_eq!(bridge.storage_get("b", "count").await.unwrap(), Some(json!(2)));

        bridge.storage_remove("a", "count").await.unwrap();
        assert_eq!(bridge.storage_get("a", "count").await.unwrap(), None);
        assert_eq!(bridge.storage_get("b", "count").await.unwrap(), Some(json!(2)));

        assert!(bridge.storage_get("../a", "count").await.is_err());
    }

    // =========================================================================
    // Filesystem & Process Tests
    // =========================================================================

    #[tokio::test]
    async fn filesystem_operations() {
        let dir = TempDir::new().unwrap();
        let bridge = LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()));
        let root = dir.path().join("project");
        let file = root.join("src").join("main.py");
        let file_str = file.to_string_lossy().to_string();

        bridge.create_file(&file_str).await.unwrap();
        bridge.write_file(&file_str, "print('hi')").await.unwrap();
        assert_eq!(bridge.read_file(&file_str).await.unwrap(), "print('hi')");

        let renamed = root.join("src").join("app.py").to_string_lossy().to_string();
        bridge.rename(&file_str, &renamed).await.unwrap();
        assert!(!bridge.exists(&file_str).await.unwrap());
        assert!(bridge.exists(&renamed).await.unwrap());

        bridge
            .create_dir(&root.join("assets").to_string_lossy())
            .await
            .unwrap();
        let listing = bridge.list_dir(&root.to_string_lossy()).await.unwrap();
        let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["assets", "src"]);

        bridge.delete(&root.to_string_lossy()).await.unwrap();
        assert!(!root.exists());
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test]
    async fn exec_and_missing_interpreter() {
        let dir = TempDir::new().unwrap();
        let mut config = LocalBridgeConfig::rooted_at(dir.path());
        config.script_interpreter = "dex-no-such-interpreter".into();
        let bridge = LocalBridge::new(config);

        let out = bridge.exec("echo hello").await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.code, 0);

        let script = bridge.run_script("script.py", &[]).await.unwrap();
        assert!(!script.success);
        assert!(script.error.unwrap().contains("dex-no-such-interpreter"));
    }

    #[tokio::test]
    async fn settings_round_trip_through_bridge() {
        let dir = TempDir::new().unwrap();
        let bridge = LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()));

        let mut settings = bridge.load_settings().await.unwrap();
        settings.tab_size = 2;
        bridge.save_settings(&settings).await.unwrap();
        assert_eq!(bridge.load_settings().await.unwrap().tab_size, 2);
    }
}
