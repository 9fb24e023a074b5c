//! Host Bridge
//!
//! The asynchronous I/O boundary between the extension runtime and the
//! platform: filesystem, processes, namespaced storage, settings, extension
//! bundles and theme CSS. The runtime only ever talks to a [`HostBridge`]
//! through a [`BridgeSlot`], which may be empty early in startup.

mod local;

pub use local::{LocalBridge, LocalBridgeConfig};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::process::ExecOutput;
use crate::core::settings::EditorSettings;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Wire Types
// =============================================================================

/// One installed extension bundle as reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleListing {
    pub name: String,
    pub disabled: bool,
}

/// A directory entry returned by `list_dir`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

/// Result of running a script file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
    pub error: Option<String>,
}

impl From<ExecOutput> for ScriptOutput {
    fn from(out: ExecOutput) -> Self {
        let success = out.succeeded();
        let error = (!success).then(|| format!("Script exited with code {}", out.code));
        Self {
            success,
            stdout: out.stdout,
            stderr: out.stderr,
            code: out.code,
            error,
        }
    }
}

/// The two CSS-variable injection layers a theme can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThemeLayerKind {
    Normal,
    UiLayout,
}

/// Uniform `{ success, data, error }` envelope handed to extensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> BridgeResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn unavailable() -> Self {
        Self::err(CoreError::HostBridgeUnavailable.to_string())
    }

    pub fn into_result(self) -> CoreResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(CoreError::BridgeFailed(
                self.error.unwrap_or_else(|| "unknown failure".to_string()),
            )),
        }
    }
}

impl<T> From<CoreResult<T>> for BridgeResult<T> {
    fn from(result: CoreResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(CoreError::HostBridgeUnavailable) => Self::unavailable(),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

/// Platform services consumed by the extension runtime
#[async_trait]
pub trait HostBridge: Send + Sync {
    // Extension bundles
    async fn list_extensions(&self) -> CoreResult<Vec<BundleListing>>;
    async fn read_bundle_file(&self, bundle: &str, relative: &str) -> CoreResult<Vec<u8>>;
    async fn list_bundle_files(&self, bundle: &str) -> CoreResult<Vec<String>>;
    async fn write_bundle_file(&self, bundle: &str, relative: &str, bytes: &[u8])
        -> CoreResult<()>;
    async fn install_extension(&self, id: &str) -> CoreResult<()>;
    async fn uninstall_extension(&self, id: &str) -> CoreResult<()>;
    async fn set_extension_enabled(&self, id: &str, enabled: bool) -> CoreResult<()>;
    /// Copies a project folder into the bundle `bundle`, replacing any
    /// previous copy
    async fn stage_bundle(&self, source_dir: &str, bundle: &str) -> CoreResult<()>;

    // Filesystem
    async fn read_file(&self, path: &str) -> CoreResult<String>;
    async fn write_file(&self, path: &str, content: &str) -> CoreResult<()>;
    async fn list_dir(&self, path: &str) -> CoreResult<Vec<DirEntry>>;
    async fn create_file(&self, path: &str) -> CoreResult<()>;
    async fn create_dir(&self, path: &str) -> CoreResult<()>;
    async fn delete(&self, path: &str) -> CoreResult<()>;
    async fn rename(&self, from: &str, to: &str) -> CoreResult<()>;
    async fn exists(&self, path: &str) -> CoreResult<bool>;

    // Processes
    async fn run_script(&self, path: &str, args: &[String]) -> CoreResult<ScriptOutput>;
    async fn exec(&self, command: &str) -> CoreResult<ExecOutput>;

    // Namespaced key/value storage
    async fn storage_get(&self, namespace: &str, key: &str)
        -> CoreResult<Option<serde_json::Value>>;
    async fn storage_set(&self, namespace: &str, key: &str, value: serde_json::Value)
        -> CoreResult<()>;
    async fn storage_remove(&self, namespace: &str, key: &str) -> CoreResult<()>;

    // Settings document
    async fn load_settings(&self) -> CoreResult<EditorSettings>;
    async fn save_settings(&self, settings: &EditorSettings) -> CoreResult<EditorSettings>;

    // Themes
    async fn load_theme_css(&self, kind: ThemeLayerKind, id: &str) -> CoreResult<String>;
}

// =============================================================================
// Slot
// =============================================================================

/// Shared, possibly empty handle to the active bridge
#[derive(Clone, Default)]
pub struct BridgeSlot {
    inner: Rc<RefCell<Option<Arc<dyn HostBridge>>>>,
}

impl BridgeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, bridge: Arc<dyn HostBridge>) {
        *self.inner.borrow_mut() = Some(bridge);
    }

    pub fn detach(&self) {
        *self.inner.borrow_mut() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.inner.borrow().is_some()
    }

    /// The attached bridge, or `HostBridgeUnavailable`.
    ///
    /// The `Arc` is cloned out so no borrow is held across an await.
    pub fn get(&self) -> CoreResult<Arc<dyn HostBridge>> {
        self.inner
            .borrow()
            .clone()
            .ok_or(CoreError::HostBridgeUnavailable)
    }
}

impl std::fmt::Debug for BridgeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}
