//! Extension Loader
//!
//! Loads installed bundles one at a time in the bridge's listing order. A
//! bundle that fails at any step is logged, reported and skipped; the batch
//! always runs to the end. Lifecycle operations (install, uninstall, enable,
//! disable, test mode) always end in a clean reset and reload.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::api::{LoadedFile, ModuleLoader};
use super::evaluator::{BundleContext, EntryRequest, ExtensionModule, ModuleEvaluator, ModuleInfo, ModuleScope};
use super::events::{EXTENSIONS_LOADED, EXTENSIONS_RESET};
use super::hooks::{guarded, ExtensionHandlers};
use super::host::PluginHost;
use super::manifest::{ExtensionManifest, MANIFEST_FILE};
use crate::core::bridge::HostBridge;
use crate::core::ui::ProjectKind;
use crate::core::{CoreError, CoreResult};

/// Bundle name a project is staged under while in test mode
pub const TEST_BUNDLE: &str = "_temp_test";

/// Languages with optional `wordlists/<language>.json`
pub const WORDLIST_LANGUAGES: &[&str] = &["python", "javascript", "html", "css"];

/// Entry files tried when a manifest names none
pub const DEFAULT_ENTRIES: &[&str] = &["main.wasm", "main.wat"];

/// One bundle that failed to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadFailure {
    pub bundle: String,
    pub error: String,
}

/// Outcome of a load pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Disabled bundles and bundles with nothing to load
    pub skipped: Vec<String>,
    pub failed: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum BundleOutcome {
    Loaded,
    Empty,
}

impl PluginHost {
    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads every enabled bundle. A second call while loaded, or a call
    /// during a load, does nothing.
    pub async fn load_extensions(&mut self) -> CoreResult<LoadReport> {
        if self.loaded || self.loading {
            tracing::debug!("Extensions already loaded; ignoring load request");
            return Ok(LoadReport::default());
        }
        let bridge = self.services().bridge.get()?;

        self.loading = true;
        let result = self.load_all(&bridge).await;
        self.loading = false;

        let report = result?;
        self.loaded = true;
        tracing::info!(
            "Loaded {} extension(s), {} skipped, {} failed",
            report.loaded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        self.emit(
            EXTENSIONS_LOADED,
            &json!({ "loaded": report.loaded.len(), "failed": report.failed.len() }),
        );
        Ok(report)
    }

    async fn load_all(&mut self, bridge: &Arc<dyn HostBridge>) -> CoreResult<LoadReport> {
        let listing = bridge.list_extensions().await?;
        let mut report = LoadReport::default();

        for bundle in listing {
            let is_test_target = self.test_target.as_deref() == Some(bundle.name.as_str());
            if bundle.disabled && !is_test_target {
                tracing::debug!("Skipping disabled extension '{}'", bundle.name);
                report.skipped.push(bundle.name);
                continue;
            }

            match self.load_bundle(bridge, &bundle.name).await {
                Ok(BundleOutcome::Loaded) => report.loaded.push(bundle.name),
                Ok(BundleOutcome::Empty) => {
                    tracing::debug!("Bundle '{}' has nothing to load", bundle.name);
                    report.skipped.push(bundle.name);
                }
                Err(e) => {
                    tracing::error!("Extension '{}' failed to load: {}", bundle.name, e);
                    self.services()
                        .notifier
                        .report_failure("Extension failed to load", &e.to_string());
                    report.failed.push(LoadFailure {
                        bundle: bundle.name,
                        error: e.to_string(),
                    });
                }
            }
            self.run_deferred().await;
        }
        Ok(report)
    }

    async fn load_bundle(&mut self, bridge: &Arc<dyn HostBridge>, bundle: &str) -> CoreResult<BundleOutcome> {
        let manifest = read_manifest(bridge, bundle).await?;
        if manifest.as_ref().is_some_and(|m| m.has_wordlists) {
            self.load_wordlists(bridge, bundle).await;
        }

        let entry = match manifest.as_ref().and_then(|m| m.entry.clone()) {
            Some(entry) => Some(entry),
            None => find_default_entry(bridge, bundle).await,
        };
        let id = manifest
            .as_ref()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| bundle.to_string());

        let ctx = BundleContext {
            bundle,
            manifest: manifest.as_ref(),
            entry: entry.as_deref(),
        };
        let Some(module) = self.compile_entry(bridge, &ctx).await? else {
            // declarative bundle: buttons and metadata only
            return match manifest {
                Some(manifest) => {
                    self.bundles.insert(manifest.id.clone(), bundle.to_string());
                    self.register_extension(manifest, ExtensionHandlers::new());
                    Ok(BundleOutcome::Loaded)
                }
                None => Ok(BundleOutcome::Empty),
            };
        };

        self.bundles.insert(id.clone(), bundle.to_string());
        let before = self.registrations;
        let known: HashSet<String> = self
            .registry
            .entries()
            .iter()
            .map(|e| e.manifest.id.clone())
            .collect();
        let info = ModuleInfo {
            bundle: bundle.to_string(),
            id: id.clone(),
            entry: entry.clone(),
        };
        if let Err(e) = self.evaluate_module(module, ModuleScope::new(info)) {
            // a failed bundle leaves nothing behind
            let added: Vec<String> = self
                .registry
                .entries()
                .iter()
                .map(|entry| entry.manifest.id.clone())
                .filter(|registered| !known.contains(registered))
                .collect();
            for registered in &added {
                self.unregister_extension(registered);
            }
            self.facade_mut().remove_contributions_of(&id);
            self.events().remove_listeners_of(&id);
            self.bundles.remove(&id);
            return Err(e);
        }

        if let Some(bundle_manifest) = manifest {
            if self.registrations == before {
                self.register_extension(bundle_manifest, ExtensionHandlers::new());
            } else if let Some(registered) = self.registry.get_mut(&bundle_manifest.id) {
                registered.manifest.fill_missing_from(&bundle_manifest);
            }
        }
        Ok(BundleOutcome::Loaded)
    }

    /// Picks an evaluator, fetches the code it needs and compiles it
    async fn compile_entry(
        &self,
        bridge: &Arc<dyn HostBridge>,
        ctx: &BundleContext<'_>,
    ) -> CoreResult<Option<Rc<dyn ExtensionModule>>> {
        let evaluators: [&dyn ModuleEvaluator; 2] = [&self.statics, &self.wasm];
        let Some((evaluator, request)) = evaluators
            .into_iter()
            .find_map(|ev| ev.accepts(ctx).map(|request| (ev, request)))
        else {
            return Ok(None);
        };

        let code = match request {
            EntryRequest::Builtin => None,
            EntryRequest::File(path) => Some(
                bridge
                    .read_bundle_file(ctx.bundle, &path)
                    .await
                    .map_err(|e| CoreError::load(ctx.bundle, format!("cannot read '{}': {}", path, e)))?,
            ),
        };
        tracing::debug!("Compiling '{}' with the {} evaluator", ctx.bundle, evaluator.name());
        evaluator.compile(ctx, code).map(Some)
    }

    /// Runs extension code at the isolation boundary
    fn evaluate_module(&mut self, module: Rc<dyn ExtensionModule>, mut scope: ModuleScope) -> CoreResult<ModuleScope> {
        let id = scope.module.id.clone();
        let api = self.api_for(&id, &scope.module.bundle);
        self.as_contributor(Some(&id), |host| {
            guarded(&id, "evaluate", || module.evaluate(&mut scope, &api, host))
        })
        .map_err(|e| CoreError::load(&id, e.to_string()))?;
        Ok(scope)
    }

    async fn load_wordlists(&mut self, bridge: &Arc<dyn HostBridge>, bundle: &str) {
        for language in WORDLIST_LANGUAGES {
            let path = format!("wordlists/{}.json", language);
            let Ok(bytes) = bridge.read_bundle_file(bundle, &path).await else {
                continue;
            };
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(words) => {
                    self.wordlists.insert(language.to_string(), words);
                }
                Err(e) => tracing::warn!("Ignoring wordlist {} of '{}': {}", path, bundle, e),
            }
        }
    }

    /// Wordlist for a language; the last bundle to ship one wins
    pub fn wordlist(&self, language: &str) -> Option<&Value> {
        self.wordlists.get(language)
    }

    /// Bundle folder an extension was loaded from
    pub fn bundle_of(&self, extension_id: &str) -> Option<&str> {
        self.bundles.get(extension_id).map(String::as_str)
    }

    // =========================================================================
    // require
    // =========================================================================

    /// Loads a file from an extension's own folder: JSON parsed, text as a
    /// string, code evaluated and its exports returned.
    pub async fn require_module(&mut self, extension_id: &str, relative: &str) -> CoreResult<Value> {
        let bundle = self
            .bundle_of(extension_id)
            .unwrap_or(extension_id)
            .to_string();
        let loader = ModuleLoader::new(self.services().bridge.clone(), bundle.as_str());

        match loader.load(relative).await? {
            LoadedFile::Json(value) => Ok(value),
            LoadedFile::Text(text) => Ok(Value::String(text)),
            LoadedFile::Code { path, bytes } => {
                let ctx = BundleContext {
                    bundle: &bundle,
                    manifest: None,
                    entry: Some(&path),
                };
                if self.wasm.accepts(&ctx).is_none() {
                    return Err(CoreError::load(extension_id, format!("cannot evaluate '{}'", path)));
                }
                let module = self.wasm.compile(&ctx, Some(bytes))?;
                let info = ModuleInfo {
                    bundle: bundle.clone(),
                    id: extension_id.to_string(),
                    entry: Some(path),
                };
                let scope = self.evaluate_module(module, ModuleScope::required(info, extension_id))?;
                Ok(scope.exports)
            }
        }
    }

    // =========================================================================
    // Reset and lifecycle
    // =========================================================================

    /// Runs every `onDestroy` and drops everything extensions contributed
    pub fn reset_registry(&mut self) {
        self.run_destroy_hooks();
        self.loaded = false;
        self.registry.clear();
        self.bundles.clear();
        self.wordlists.clear();
        self.overrides_mut().clear_overrides();
        self.facade_mut().clear_extension_contributions();
        self.events().remove_extension_listeners();
        tracing::info!("Extension registry reset");
        self.emit(EXTENSIONS_RESET, &json!({}));
    }

    /// Clean reset followed by a full load; dropped while a load is running
    pub async fn reload_extensions(&mut self) -> CoreResult<LoadReport> {
        if self.loading {
            tracing::debug!("Reload requested during load; ignoring");
            return Ok(LoadReport::default());
        }
        self.reset_registry();
        self.load_extensions().await
    }

    pub async fn install_extension(&mut self, id: &str) -> CoreResult<LoadReport> {
        let bridge = self.services().bridge.get()?;
        bridge.install_extension(id).await?;
        tracing::info!("Installed extension '{}'", id);
        self.reload_extensions().await
    }

    pub async fn uninstall_extension(&mut self, id: &str) -> CoreResult<LoadReport> {
        let bridge = self.services().bridge.get()?;
        bridge.uninstall_extension(id).await?;
        tracing::info!("Uninstalled extension '{}'", id);
        self.reload_extensions().await
    }

    pub async fn set_extension_enabled(&mut self, id: &str, enabled: bool) -> CoreResult<LoadReport> {
        let bridge = self.services().bridge.get()?;
        bridge.set_extension_enabled(id, enabled).await?;
        tracing::info!("Extension '{}' {}", id, if enabled { "enabled" } else { "disabled" });
        self.reload_extensions().await
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_target.is_some()
    }

    /// Stages an extension project as a temporary bundle and reloads with it
    pub async fn enter_test_mode(&mut self, project_dir: &str) -> CoreResult<LoadReport> {
        let bridge = self.services().bridge.get()?;
        bridge.stage_bundle(project_dir, TEST_BUNDLE).await?;
        self.test_target = Some(TEST_BUNDLE.to_string());
        self.set_project_kind(ProjectKind::ExtensionTest);
        tracing::info!("Testing extension project {}", project_dir);
        self.reload_extensions().await
    }

    /// Removes the staged bundle and reloads without it
    pub async fn exit_test_mode(&mut self) -> CoreResult<LoadReport> {
        let bridge = self.services().bridge.get()?;
        if let Some(bundle) = self.test_target.take() {
            match bridge.uninstall_extension(&bundle).await {
                Ok(()) | Err(CoreError::ExtensionNotFound(_)) => {}
                Err(e) => {
                    self.test_target = Some(bundle);
                    return Err(e);
                }
            }
        }
        self.set_project_kind(ProjectKind::Extension);
        self.reload_extensions().await
    }
}

async fn read_manifest(bridge: &Arc<dyn HostBridge>, bundle: &str) -> CoreResult<Option<ExtensionManifest>> {
    let Ok(bytes) = bridge.read_bundle_file(bundle, MANIFEST_FILE).await else {
        return Ok(None);
    };
    let text = String::from_utf8(bytes)
        .map_err(|e| CoreError::load(bundle, format!("manifest is not UTF-8: {}", e)))?;
    ExtensionManifest::parse(&text)
        .map(Some)
        .map_err(|e| CoreError::load(bundle, e.to_string()))
}

async fn find_default_entry(bridge: &Arc<dyn HostBridge>, bundle: &str) -> Option<String> {
    let files = bridge.list_bundle_files(bundle).await.ok()?;
    DEFAULT_ENTRIES
        .iter()
        .find(|entry| files.iter().any(|f| f == *entry))
        .map(|entry| entry.to_string())
}
