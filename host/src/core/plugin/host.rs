//! Extension Host
//!
//! [`PluginHost`] owns every piece of mutable extension state: the registry,
//! the event bus, the facade contributions, the core-control overrides and
//! the theme pipeline. Everything is single-threaded; extension callbacks get
//! `&mut PluginHost` and shared UI services are `Rc` handles.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::api::{CapabilityApi, Clipboard, DeferredTasks, Dialogs, EditorAccessor, Notifier, SharedServices};
use super::evaluator::{ExtensionModule, StaticModules};
use super::events::{EmitReport, EventBus, ListenerId, THEME_CHANGED};
use super::facade::HostFacade;
use super::hooks::{guarded, ExtensionHandlers, HandlerResult};
use super::manifest::ExtensionManifest;
use super::registry::ExtensionRegistry;
use super::wasm::WasmEvaluator;
use crate::core::bridge::{HostBridge, ThemeLayerKind};
use crate::core::theme::{
    RootStyle, SyntaxColors, SyntaxConfig, ThemePipeline, ThemeSnapshot, BUILTIN_EDITOR_THEMES,
    DEFAULT_AUTO_PALETTE,
};
use crate::core::ui::{
    ControlInvocation, CoreButtonOverride, DefaultControlSurface, OverrideResolver, ProjectKind,
    RenderedControl,
};
use crate::core::{CoreError, CoreResult};

/// Syntax color file an extension theme may ship next to its CSS
pub const SYNTAX_FILE: &str = "syntax.json";

/// Configuration for the extension host
#[derive(Debug, Clone)]
pub struct PluginHostConfig {
    /// Allow extensions to replace the UI-layout CSS variables
    pub ui_layout_themes: bool,
    /// Palette for auto-colored tokens when a theme brings none
    pub auto_palette: Vec<String>,
    /// Command-line transfer tool behind the `http` capability
    pub http_tool: String,
    /// Enable fuel metering for WASM modules
    pub fuel_enabled: bool,
    /// Fuel granted to every WASM call
    pub initial_fuel: u64,
    /// Try the platform clipboard before the manual-selection fallback
    pub system_clipboard: bool,
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            ui_layout_themes: false,
            auto_palette: DEFAULT_AUTO_PALETTE.iter().map(|c| c.to_string()).collect(),
            http_tool: "curl".to_string(),
            fuel_enabled: true,
            initial_fuel: 1_000_000_000, // 1 billion fuel units
            system_clipboard: true,
        }
    }
}

/// The extension runtime
pub struct PluginHost {
    pub(super) config: PluginHostConfig,
    pub(super) registry: ExtensionRegistry,
    events: EventBus,
    services: SharedServices,
    facade: HostFacade,
    overrides: OverrideResolver,
    surface: DefaultControlSurface,
    theme: ThemePipeline,
    pub(super) statics: StaticModules,
    pub(super) wasm: WasmEvaluator,
    /// Bundle folder of each registered extension id
    pub(super) bundles: BTreeMap<String, String>,
    /// Language → wordlist contributed by extensions
    pub(super) wordlists: BTreeMap<String, Value>,
    pub(super) loaded: bool,
    pub(super) loading: bool,
    /// Bundle loaded in test mode even when disabled
    pub(super) test_target: Option<String>,
    /// Extension on whose behalf code is currently running
    contributor: Option<String>,
    /// Bumped on every registration
    pub(super) registrations: u64,
}

impl PluginHost {
    /// Creates a host with no bridge attached
    pub fn new(config: PluginHostConfig) -> CoreResult<Self> {
        let notifier = Notifier::new();
        let clipboard = if config.system_clipboard {
            Clipboard::system(notifier.clone())
        } else {
            Clipboard::new(notifier.clone())
        };
        let services = SharedServices {
            bridge: Default::default(),
            editor: EditorAccessor::new(),
            notifier,
            clipboard,
            dialogs: Dialogs::default(),
            tasks: DeferredTasks::default(),
        };

        let wasm = WasmEvaluator::new(config.fuel_enabled, config.initial_fuel)?;
        let theme = ThemePipeline::new(
            RootStyle::default(),
            SyntaxColors::new(config.auto_palette.clone()),
        );

        let events = EventBus::with_activity_log(services.notifier.clone());

        tracing::debug!("Extension host created (fuel: {})", config.fuel_enabled);
        Ok(Self {
            config,
            registry: ExtensionRegistry::new(),
            events,
            services,
            facade: HostFacade::default(),
            overrides: OverrideResolver::new(),
            surface: DefaultControlSurface::default(),
            theme,
            statics: StaticModules::new(),
            wasm,
            bundles: BTreeMap::new(),
            wordlists: BTreeMap::new(),
            loaded: false,
            loading: false,
            test_target: None,
            contributor: None,
            registrations: 0,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn services(&self) -> &SharedServices {
        &self.services
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn facade(&self) -> &HostFacade {
        &self.facade
    }

    pub fn facade_mut(&mut self) -> &mut HostFacade {
        &mut self.facade
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Extension currently running host code, if any
    pub fn contributor(&self) -> Option<String> {
        self.contributor.clone()
    }

    /// Runs `f` with `owner` as the contributor and restores the previous one
    pub fn as_contributor<T>(&mut self, owner: Option<&str>, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.contributor, owner.map(str::to_string));
        let result = f(self);
        self.contributor = previous;
        result
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    pub fn attach_bridge(&self, bridge: Arc<dyn HostBridge>) {
        self.services.bridge.attach(bridge);
        tracing::info!("Host bridge attached");
    }

    /// Capability surface for one extension
    pub fn api_for(&self, extension_id: &str, bundle: &str) -> CapabilityApi {
        CapabilityApi::new(&self.services, extension_id, bundle, &self.config.http_tool)
    }

    /// Links a Rust module to a bundle name
    pub fn register_static_module(&mut self, bundle: &str, module: impl ExtensionModule + 'static) {
        self.statics.register(bundle, module);
    }

    /// Drives async work queued by extension callbacks
    pub async fn run_deferred(&self) -> usize {
        let tasks = self.services.tasks.clone();
        tasks.run_all().await
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Stores an extension and runs its `onInit`. Returns `false` when the
    /// manifest is rejected.
    pub fn register_extension(&mut self, manifest: ExtensionManifest, handlers: ExtensionHandlers) -> bool {
        if let Err(e) = manifest.validate() {
            tracing::error!("Rejected extension registration: {}", e);
            self.services.notifier.log_error(&e.to_string());
            return false;
        }

        let id = manifest.id.clone();
        let on_init = handlers.on_init.clone();
        if self.registry.insert(manifest, handlers) {
            tracing::info!("Re-registered extension '{}'", id);
        } else {
            tracing::info!("Registered extension '{}'", id);
        }
        self.registrations += 1;

        if let Some(hook) = on_init {
            let result = self.as_contributor(Some(&id), |host| guarded(&id, "onInit", || hook(host)));
            if let Err(e) = result {
                self.services.notifier.log_error(&e.to_string());
            }
        }
        true
    }

    /// Drops an extension together with its buttons, facade contributions
    /// and listeners. `on_destroy` is not run.
    pub(super) fn unregister_extension(&mut self, id: &str) -> bool {
        let removed = self.registry.remove(id);
        self.facade.remove_contributions_of(id);
        self.events.remove_listeners_of(id);
        self.bundles.remove(id);
        if removed {
            tracing::info!("Unregistered extension '{}'", id);
        }
        removed
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribes to a named event; listeners added by extension code are
    /// dropped on the next reset.
    pub fn on_event(
        &mut self,
        event: &str,
        listener: impl Fn(&Value) -> HandlerResult<()> + 'static,
    ) -> ListenerId {
        match self.contributor.as_deref() {
            Some(owner) => self.events.on_for(owner, event, listener),
            None => self.events.on(event, listener),
        }
    }

    pub fn off_event(&mut self, event: &str, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    pub fn emit(&self, event: &str, payload: &Value) -> EmitReport {
        self.events.emit(event, payload)
    }

    // =========================================================================
    // Core controls
    // =========================================================================

    pub fn set_core_button_override(&mut self, id: &str, ov: CoreButtonOverride) -> CoreResult<()> {
        self.overrides
            .set_override(id, ov)
            .inspect_err(|e| tracing::warn!("Ignoring override: {}", e))
    }

    /// Applies a JSON map of overrides; returns how many were applied
    pub fn set_core_button_override_json(&mut self, json: &str) -> usize {
        self.overrides.set_overrides_json(json).unwrap_or_else(|e| {
            tracing::warn!("Ignoring override map: {}", e);
            0
        })
    }

    pub fn clear_core_button_override(&mut self, id: &str) -> bool {
        self.overrides.clear_override(id)
    }

    pub fn overrides(&self) -> &OverrideResolver {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut OverrideResolver {
        &mut self.overrides
    }

    pub fn project_kind(&self) -> ProjectKind {
        self.surface.project_kind
    }

    pub fn set_project_kind(&mut self, kind: ProjectKind) {
        self.surface.project_kind = kind;
    }

    pub fn resolve_controls(&mut self) -> Vec<RenderedControl> {
        self.overrides.resolve(&self.surface)
    }

    /// Handles a click on a core control. Override commands run here; a
    /// built-in action is returned for the editor to perform.
    pub fn click_control(&mut self, id: &str) -> ControlInvocation {
        let invocation = self.overrides.click(&self.surface, id);
        match &invocation {
            ControlInvocation::Command(command) => {
                let command = command.clone();
                self.execute_command(&command);
            }
            ControlInvocation::Blocked => tracing::debug!("Control '{}' is blocked", id),
            ControlInvocation::Builtin(_) => {}
        }
        invocation
    }

    // =========================================================================
    // Themes
    // =========================================================================

    pub fn theme(&self) -> &ThemePipeline {
        &self.theme
    }

    pub fn theme_snapshot(&self) -> ThemeSnapshot {
        self.theme.snapshot()
    }

    pub fn set_ui_theme(&mut self, name: &str) {
        self.theme.set_ui_theme(name);
    }

    /// Switches the normal theme: `None` restores the built-in look, a
    /// built-in name switches the editor class, anything else is loaded from
    /// the extension bundle of that id.
    pub async fn activate_theme(&mut self, id: Option<&str>) -> CoreResult<()> {
        let result = match id {
            None => {
                self.theme.clear_normal_theme();
                Ok(())
            }
            Some(name) if BUILTIN_EDITOR_THEMES.contains(&name) => {
                self.theme.use_builtin_theme(name);
                Ok(())
            }
            Some(theme_id) => self.apply_extension_theme(theme_id).await,
        };

        let active = self.theme.normal().id().map(str::to_string);
        self.events.emit(THEME_CHANGED, &json!({ "theme": active }));
        result
    }

    async fn apply_extension_theme(&mut self, id: &str) -> CoreResult<()> {
        let bridge = self.services.bridge.get()?;
        let css = match bridge.load_theme_css(ThemeLayerKind::Normal, id).await {
            Ok(css) => css,
            Err(e) => {
                tracing::warn!("Theme '{}' could not be loaded: {}", id, e);
                self.theme.clear_normal_theme();
                return Err(e);
            }
        };

        let syntax = match bridge.read_bundle_file(id, SYNTAX_FILE).await {
            Ok(bytes) => match String::from_utf8(bytes)
                .map_err(|e| CoreError::ValidationError(e.to_string()))
                .and_then(|text| SyntaxConfig::parse(&text))
            {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!("Ignoring syntax colors of '{}': {}", id, e);
                    None
                }
            },
            Err(_) => None,
        };

        self.theme.use_extension_theme(id, &css, syntax).map(|_| ())
    }

    /// Applies or clears the UI-layout theme; gated by `ui_layout_themes`
    pub async fn activate_ui_layout_theme(&mut self, id: Option<&str>) -> CoreResult<()> {
        if !self.config.ui_layout_themes {
            return Err(CoreError::FeatureDisabled("UI layout themes".to_string()));
        }
        let Some(id) = id else {
            self.theme.clear_ui_layout();
            return Ok(());
        };
        let bridge = self.services.bridge.get()?;
        let css = bridge.load_theme_css(ThemeLayerKind::UiLayout, id).await?;
        self.theme.apply_ui_layout(id, &css).map(|_| ())
    }

    /// Color override for a rendered token
    pub fn token_color(&mut self, language: &str, role: &str, token: &str) -> Option<String> {
        self.theme.token_color(language, role, token)
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("extensions", &self.registry.len())
            .field("loaded", &self.loaded)
            .field("test_target", &self.test_target)
            .field("facade", &self.facade)
            .finish()
    }
}
