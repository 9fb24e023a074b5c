//! Filesystem utilities.
//!
//! Path validation for identifiers and bundle-relative paths, plus
//! crash-tolerant writes for the settings document and storage namespaces.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Path Validation Utilities
// =============================================================================

/// Validates that an identifier (extension id, storage namespace, theme id)
/// is safe to use as a single path component.
///
/// Rejects empty strings, `..`, path separators, drive-letter colons and
/// control characters.
pub fn validate_path_id_component(id: &str, label: &str) -> Result<(), String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(format!("{label} is empty or contains only whitespace"));
    }
    if trimmed != id {
        return Err(format!("Invalid {label}: leading or trailing whitespace"));
    }
    if trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains(':')
    {
        return Err(format!(
            "Invalid {label}: contains path traversal characters"
        ));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(format!("Invalid {label}: contains control characters"));
    }
    Ok(())
}

/// Validates a path that must stay inside an extension's own folder and
/// returns it normalized (forward slashes, no `.` components).
///
/// Absolute paths, parent components and empty paths are rejected.
pub fn validate_bundle_relative_path(path: &str) -> Result<String, String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("Bundle path is empty".to_string());
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(format!("Bundle path '{trimmed}' contains control characters"));
    }

    let unified = trimmed.replace('\\', "/");
    let as_path = Path::new(&unified);
    let mut parts = Vec::new();
    for component in as_path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                if part.contains(':') {
                    return Err(format!("Bundle path '{trimmed}' escapes the extension folder"));
                }
                parts.push(part.to_string());
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("Bundle path '{trimmed}' escapes the extension folder"));
            }
        }
    }

    if parts.is_empty() {
        return Err("Bundle path is empty".to_string());
    }
    Ok(parts.join("/"))
}

/// Joins a validated bundle-relative path onto a bundle directory.
pub fn resolve_in_bundle(bundle_dir: &Path, relative: &str) -> CoreResult<PathBuf> {
    let normalized = validate_bundle_relative_path(relative).map_err(CoreError::ValidationError)?;
    Ok(bundle_dir.join(normalized))
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Writes bytes to `path` via a sibling temp file and rename.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = sibling_path(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    atomic_replace(path, &tmp_path)
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut sibling = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| suffix.to_string());
    sibling.set_file_name(format!("{file_name}.{suffix}"));
    sibling
}

fn atomic_replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Rename-over-existing is not portable; swap through a backup.
    let bak = sibling_path(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_bytes_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.json");

        atomic_write_bytes(&path, b"one").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one");

        atomic_write_bytes(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");

        assert!(!sibling_path(&path, "tmp").exists());
        assert!(!sibling_path(&path, "bak").exists());
    }

    #[test]
    fn atomic_write_json_pretty_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("value.json");

        atomic_write_json_pretty(&path, &serde_json::json!({"a": 1})).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    // =========================================================================
    // Path Validation Tests
    // =========================================================================

    #[test]
    fn test_validate_path_id_component_valid() {
        assert!(validate_path_id_component("image-viewer", "extensionId").is_ok());
        assert!(validate_path_id_component("monokai_theme", "extensionId").is_ok());
        assert!(validate_path_id_component("com.example.tool", "extensionId").is_ok());
    }

    #[test]
    fn test_validate_path_id_component_rejects_bad_input() {
        let empty = validate_path_id_component("", "extensionId");
        assert!(empty.unwrap_err().contains("empty"));

        let traversal = validate_path_id_component("..", "extensionId");
        assert!(traversal.unwrap_err().contains("path traversal"));

        assert!(validate_path_id_component("a/b", "extensionId").is_err());
        assert!(validate_path_id_component("a\\b", "extensionId").is_err());
        assert!(validate_path_id_component("C:", "extensionId").is_err());
        assert!(validate_path_id_component(" padded", "extensionId").is_err());

        let control = validate_path_id_component("foo\0bar", "extensionId");
        assert!(control.unwrap_err().contains("control characters"));
    }

    #[test]
    fn test_validate_bundle_relative_path() {
        assert_eq!(
            validate_bundle_relative_path("wordlists/python.json").unwrap(),
            "wordlists/python.json"
        );
        assert_eq!(
            validate_bundle_relative_path("./data\\colors.json").unwrap(),
            "data/colors.json"
        );

        assert!(validate_bundle_relative_path("").is_err());
        assert!(validate_bundle_relative_path("../other/main.wasm").is_err());
        assert!(validate_bundle_relative_path("data/../../x").is_err());
        assert!(validate_bundle_relative_path("/etc/passwd").is_err());
        assert!(validate_bundle_relative_path("./").is_err());
    }

    #[test]
    fn test_resolve_in_bundle_joins_normalized_path() {
        let base = Path::new("/tmp/ext");
        let resolved = resolve_in_bundle(base, "./lib/util.json").unwrap();
        assert_eq!(resolved, base.join("lib/util.json"));

        let err = resolve_in_bundle(base, "../escape").unwrap_err();
        assert!(err.is_validation());
    }
}
