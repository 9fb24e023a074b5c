//! Module evaluation
//!
//! An extension's code runs through an [`ExtensionModule`], which receives
//! exactly three things: its [`ModuleScope`], the [`CapabilityApi`] and the
//! host. [`ModuleEvaluator`]s decide whether they can run a bundle and turn its
//! entry code into a module.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use super::api::CapabilityApi;
use super::hooks::HandlerResult;
use super::host::PluginHost;
use super::manifest::ExtensionManifest;
use crate::core::{CoreError, CoreResult};

/// What the evaluated code knows about itself
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    /// Folder name of the bundle
    pub bundle: String,
    /// Manifest id when present, else the bundle name
    pub id: String,
    /// Path of the code inside the bundle, if it came from a file
    pub entry: Option<String>,
}

/// The module-local scope handed to extension code
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleScope {
    pub module: ModuleInfo,
    /// Values the module chooses to export; `null` until set
    pub exports: Value,
    /// Set when the code was pulled in through `require_module` rather than
    /// being the bundle entry; such modules must not register themselves
    pub required_by: Option<String>,
}

impl ModuleScope {
    pub fn new(module: ModuleInfo) -> Self {
        Self {
            module,
            exports: Value::Null,
            required_by: None,
        }
    }

    pub fn required(module: ModuleInfo, by: &str) -> Self {
        Self {
            required_by: Some(by.to_string()),
            ..Self::new(module)
        }
    }

    pub fn is_entry(&self) -> bool {
        self.required_by.is_none()
    }
}

/// Evaluated extension code
pub trait ExtensionModule {
    fn evaluate(
        &self,
        scope: &mut ModuleScope,
        api: &CapabilityApi,
        host: &mut PluginHost,
    ) -> HandlerResult<()>;
}

impl<F> ExtensionModule for F
where
    F: Fn(&mut ModuleScope, &CapabilityApi, &mut PluginHost) -> HandlerResult<()>,
{
    fn evaluate(
        &self,
        scope: &mut ModuleScope,
        api: &CapabilityApi,
        host: &mut PluginHost,
    ) -> HandlerResult<()> {
        self(scope, api, host)
    }
}

/// A bundle (or a required file) being considered for evaluation
#[derive(Debug, Clone, Copy)]
pub struct BundleContext<'a> {
    pub bundle: &'a str,
    pub manifest: Option<&'a ExtensionManifest>,
    /// Code file to evaluate, relative to the bundle
    pub entry: Option<&'a str>,
}

/// What an evaluator needs before it can compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRequest {
    /// Code is linked into the binary; nothing to fetch
    Builtin,
    /// Fetch this bundle-relative file and pass its bytes to `compile`
    File(String),
}

pub trait ModuleEvaluator {
    fn name(&self) -> &'static str;

    /// `None` when this evaluator cannot run the bundle
    fn accepts(&self, ctx: &BundleContext<'_>) -> Option<EntryRequest>;

    fn compile(
        &self,
        ctx: &BundleContext<'_>,
        code: Option<Vec<u8>>,
    ) -> CoreResult<Rc<dyn ExtensionModule>>;
}

// =============================================================================
// Statically linked modules
// =============================================================================

/// Rust extension modules compiled into the binary, keyed by bundle name
#[derive(Default, Clone)]
pub struct StaticModules {
    modules: BTreeMap<String, Rc<dyn ExtensionModule>>,
}

impl StaticModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bundle: impl Into<String>, module: impl ExtensionModule + 'static) {
        self.modules.insert(bundle.into(), Rc::new(module));
    }

    pub fn with(mut self, bundle: impl Into<String>, module: impl ExtensionModule + 'static) -> Self {
        self.register(bundle, module);
        self
    }

    pub fn contains(&self, bundle: &str) -> bool {
        self.modules.contains_key(bundle)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for StaticModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModules")
            .field("bundles", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleEvaluator for StaticModules {
    fn name(&self) -> &'static str {
        "static"
    }

    fn accepts(&self, ctx: &BundleContext<'_>) -> Option<EntryRequest> {
        self.contains(ctx.bundle).then_some(EntryRequest::Builtin)
    }

    fn compile(
        &self,
        ctx: &BundleContext<'_>,
        _code: Option<Vec<u8>>,
    ) -> CoreResult<Rc<dyn ExtensionModule>> {
        self.modules
            .get(ctx.bundle)
            .cloned()
            .ok_or_else(|| CoreError::load(ctx.bundle, "no linked module for this bundle"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plugin::api::SharedServices;
    use crate::core::plugin::host::PluginHostConfig;
    use serde_json::json;

    fn ctx(bundle: &str) -> BundleContext<'_> {
        BundleContext {
            bundle,
            manifest: None,
            entry: None,
        }
    }

    #[test]
    fn test_static_modules_accept_only_known_bundles() {
        let modules = StaticModules::new().with(
            "hello",
            |_: &mut ModuleScope, _: &CapabilityApi, _: &mut PluginHost| -> HandlerResult<()> {
                Ok(())
            },
        );
        assert_eq!(modules.accepts(&ctx("hello")), Some(EntryRequest::Builtin));
        assert_eq!(modules.accepts(&ctx("other")), None);
        assert!(modules.compile(&ctx("other"), None).is_err());
    }

    #[test]
    fn test_closure_module_writes_exports() {
        let modules = StaticModules::new().with(
            "hello",
            |scope: &mut ModuleScope, api: &CapabilityApi, _: &mut PluginHost| -> HandlerResult<()> {
                scope.exports = json!({ "greeting": format!("hi from {}", api.extension_id()) });
                Ok(())
            },
        );
        let module = modules.compile(&ctx("hello"), None).unwrap();

        let mut host = PluginHost::new(PluginHostConfig::default()).unwrap();
        let api = CapabilityApi::new(&SharedServices::default(), "hello", "hello", "curl");
        let mut scope = ModuleScope::new(ModuleInfo {
            bundle: "hello".into(),
            id: "hello".into(),
            entry: None,
        });
        module.evaluate(&mut scope, &api, &mut host).unwrap();
        assert_eq!(scope.exports["greeting"], "hi from hello");
    }
}
