//! DEX Extension System
//!
//! Loads extension bundles, hands them the capability API and dispatches
//! editor hooks, events, commands and keybinds to them. One extension's
//! failure never reaches another extension or the editor.

pub mod api;
pub mod evaluator;
pub mod events;
pub mod facade;
pub mod hooks;
pub mod host;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod wasm;

// Re-export main types
pub use api::{CapabilityApi, SharedServices};
pub use evaluator::{ExtensionModule, ModuleEvaluator, ModuleInfo, ModuleScope, StaticModules};
pub use events::{EventBus, ListenerId};
pub use facade::{KeyCombo, MenuItem, Panel, PanelOptions, PanelPosition};
pub use hooks::{ExtensionHandlers, FileOpenOutcome, HandlerError, HandlerResult};
pub use host::{PluginHost, PluginHostConfig};
pub use loader::{LoadFailure, LoadReport, TEST_BUNDLE};
pub use manifest::{ExtensionManifest, UiButton};
pub use registry::{ExtensionInfo, ExtensionRegistry, UiButtonDescriptor};
pub use wasm::WasmEvaluator;
