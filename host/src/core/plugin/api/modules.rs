//! Require-style loading of files inside an extension's own folder.

use crate::core::bridge::BridgeSlot;
use crate::core::fs::validate_bundle_relative_path;
use crate::core::{CoreError, CoreResult};

/// A bundle file classified by kind
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedFile {
    /// `.json`, parsed
    Json(serde_json::Value),
    /// Executable module code (`.wasm`, `.wat`)
    Code { path: String, bytes: Vec<u8> },
    /// Anything else, as UTF-8 text
    Text(String),
}

/// File kinds the host evaluates as code
pub const CODE_EXTENSIONS: &[&str] = &["wasm", "wat"];

pub fn is_code_path(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| CODE_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)))
}

/// Loader bound to one bundle
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    bridge: BridgeSlot,
    bundle: String,
}

impl ModuleLoader {
    pub fn new(bridge: BridgeSlot, bundle: impl Into<String>) -> Self {
        Self {
            bridge,
            bundle: bundle.into(),
        }
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    /// Reads `relative` from the bundle and classifies it
    pub async fn load(&self, relative: &str) -> CoreResult<LoadedFile> {
        let normalized = validate_bundle_relative_path(relative).map_err(CoreError::ValidationError)?;
        let bridge = self.bridge.get()?;
        let bytes = bridge.read_bundle_file(&self.bundle, &normalized).await?;
        classify(&normalized, bytes)
    }
}

pub(crate) fn classify(path: &str, bytes: Vec<u8>) -> CoreResult<LoadedFile> {
    if is_code_path(path) {
        return Ok(LoadedFile::Code {
            path: path.to_string(),
            bytes,
        });
    }

    let is_json = path
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::ValidationError(format!("Invalid JSON in '{path}': {e}")))?;
        return Ok(LoadedFile::Json(value));
    }

    String::from_utf8(bytes)
        .map(LoadedFile::Text)
        .map_err(|e| CoreError::ValidationError(format!("'{path}' is not UTF-8 text: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::{LocalBridge, LocalBridgeConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn classify_by_extension() {
        assert_eq!(
            classify("data/list.JSON", b"[1]".to_vec()).unwrap(),
            LoadedFile::Json(serde_json::json!([1]))
        );
        assert!(matches!(
            classify("lib/util.wat", b"(module)".to_vec()).unwrap(),
            LoadedFile::Code { .. }
        ));
        assert_eq!(
            classify("README.md", b"# hi".to_vec()).unwrap(),
            LoadedFile::Text("# hi".into())
        );
        assert!(classify("bad.json", b"{".to_vec()).is_err());
    }

    #[tokio::test]
    async fn loads_through_bridge_and_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("extensions").join("snippets");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join("config.json"), r#"{"tab": 2}"#).unwrap();

        let slot = BridgeSlot::new();
        let loader = ModuleLoader::new(slot.clone(), "snippets");
        assert!(matches!(
            loader.load("config.json").await,
            Err(CoreError::HostBridgeUnavailable)
        ));

        slot.attach(Arc::new(LocalBridge::new(LocalBridgeConfig::rooted_at(dir.path()))));
        assert_eq!(
            loader.load("./config.json").await.unwrap(),
            LoadedFile::Json(serde_json::json!({"tab": 2}))
        );
        assert!(loader.load("../other/config.json").await.unwrap_err().is_validation());
    }
}
