//! DEX Host Error Definitions
//!
//! Defines error types used throughout the extension host.

use thiserror::Error;

/// Core host error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Bridge Errors
    // =========================================================================
    #[error("Host bridge unavailable")]
    HostBridgeUnavailable,

    #[error("Host bridge call failed: {0}")]
    BridgeFailed(String),

    // =========================================================================
    // Extension Errors
    // =========================================================================
    #[error("Failed to load extension '{id}': {message}")]
    ExtensionLoad { id: String, message: String },

    #[error("Invalid extension manifest: {0}")]
    InvalidManifest(String),

    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("Extension '{id}' failed in {hook}: {message}")]
    HandlerInvocation {
        id: String,
        hook: String,
        message: String,
    },

    #[error("WASM module error: {0}")]
    Wasm(String),

    // =========================================================================
    // Facade Errors
    // =========================================================================
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core host result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Shorthand for a load failure of one bundle.
    pub fn load(id: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::ExtensionLoad {
            id: id.into(),
            message: message.into(),
        }
    }

    /// True for errors that a caller should treat as "fall back to default".
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::ValidationError(_) | CoreError::InvalidManifest(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_formats_id_and_message() {
        let err = CoreError::load("img", "bad entry");
        assert_eq!(
            err.to_string(),
            "Failed to load extension 'img': bad entry"
        );
    }

    #[test]
    fn validation_errors_are_classified() {
        assert!(CoreError::ValidationError("x".into()).is_validation());
        assert!(CoreError::InvalidManifest("x".into()).is_validation());
        assert!(!CoreError::HostBridgeUnavailable.is_validation());
    }
}
