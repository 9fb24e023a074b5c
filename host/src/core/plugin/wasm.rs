//! WASM Extension Modules
//!
//! Runs `.wasm` / `.wat` extension entries with wasmtime.
//!
//! Host imports (module `env`):
//! - `host_log(level, ptr, len)`: 0 debug, 1 info, 2 warn, anything else error
//! - `host_time_now() -> i64`: unix time in milliseconds
//! - `host_editor_insert(ptr, len)`: inserts UTF-8 text at the editor cursor
//! - `host_notify(kind, ptr, len)`: 0 info, 1 success, 2 warning, 3 error
//!
//! Recognized exports: `memory`, `alloc(len) -> ptr`, `on_init()`,
//! `on_file_open(path_ptr, path_len, ext_ptr, ext_len) -> i32`,
//! `on_editor_input()`, `on_destroy()`. Every other `() -> ()` export becomes
//! a named action. Each call runs on a fresh fuel budget when metering is on.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use wasmtime::*;

use super::api::{CapabilityApi, EditorAccessor, NotificationKind, Notifier};
use super::evaluator::{BundleContext, EntryRequest, ExtensionModule, ModuleEvaluator, ModuleScope};
use super::hooks::{ExtensionHandlers, HandlerError, HandlerResult};
use super::host::PluginHost;
use super::manifest::ExtensionManifest;
use crate::core::{CoreError, CoreResult};

const RESERVED_EXPORTS: &[&str] = &[
    "memory",
    "alloc",
    "on_init",
    "on_file_open",
    "on_editor_input",
    "on_destroy",
];

/// Store data visible to host imports
pub struct WasmState {
    pub extension_id: String,
    editor: EditorAccessor,
    notifier: Notifier,
}

/// Evaluator for WebAssembly bundle entries
pub struct WasmEvaluator {
    engine: Engine,
    fuel: Option<u64>,
}

impl WasmEvaluator {
    pub fn new(fuel_enabled: bool, initial_fuel: u64) -> CoreResult<Self> {
        let mut config = Config::new();
        if fuel_enabled {
            config.consume_fuel(true);
        }
        let engine = Engine::new(&config)
            .map_err(|e| CoreError::Wasm(format!("Failed to create WASM engine: {}", e)))?;

        Ok(Self {
            engine,
            fuel: fuel_enabled.then_some(initial_fuel),
        })
    }

    pub fn is_wasm_entry(path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        lower.ends_with(".wasm") || lower.ends_with(".wat")
    }
}

impl std::fmt::Debug for WasmEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEvaluator")
            .field("fuel", &self.fuel)
            .finish()
    }
}

impl ModuleEvaluator for WasmEvaluator {
    fn name(&self) -> &'static str {
        "wasm"
    }

    fn accepts(&self, ctx: &BundleContext<'_>) -> Option<EntryRequest> {
        ctx.entry
            .filter(|entry| Self::is_wasm_entry(entry))
            .map(|entry| EntryRequest::File(entry.to_string()))
    }

    fn compile(
        &self,
        ctx: &BundleContext<'_>,
        code: Option<Vec<u8>>,
    ) -> CoreResult<Rc<dyn ExtensionModule>> {
        let bytes = code.ok_or_else(|| CoreError::load(ctx.bundle, "missing WASM entry code"))?;
        let module = Module::new(&self.engine, &bytes)
            .map_err(|e| CoreError::Wasm(format!("Failed to compile WASM module: {}", e)))?;

        Ok(Rc::new(WasmModule {
            engine: self.engine.clone(),
            module,
            fuel: self.fuel,
            manifest: ctx.manifest.cloned(),
        }))
    }
}

// =============================================================================
// Instances
// =============================================================================

struct WasmModule {
    engine: Engine,
    module: Module,
    fuel: Option<u64>,
    manifest: Option<ExtensionManifest>,
}

struct WasmInstance {
    store: Store<WasmState>,
    instance: Instance,
    fuel: Option<u64>,
}

type SharedInstance = Rc<RefCell<WasmInstance>>;

fn trap(e: impl std::fmt::Display) -> HandlerError {
    HandlerError::failed(format!("WASM trap: {}", e))
}

impl WasmInstance {
    fn refuel(&mut self) -> HandlerResult<()> {
        if let Some(fuel) = self.fuel {
            self.store.set_fuel(fuel).map_err(trap)?;
        }
        Ok(())
    }

    fn call_unit(&mut self, name: &str) -> HandlerResult<()> {
        self.refuel()?;
        let func = self
            .instance
            .get_typed_func::<(), ()>(&mut self.store, name)
            .map_err(trap)?;
        func.call(&mut self.store, ()).map_err(trap)
    }

    /// Copies `text` into guest memory through the module's `alloc`
    fn write_guest_str(&mut self, text: &str) -> HandlerResult<(i32, i32)> {
        let len = i32::try_from(text.len()).map_err(|_| HandlerError::failed("string too long"))?;
        let alloc = self
            .instance
            .get_typed_func::<i32, i32>(&mut self.store, "alloc")
            .map_err(trap)?;
        let ptr = alloc.call(&mut self.store, len).map_err(trap)?;

        let memory = self
            .instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(|| HandlerError::failed("module does not export memory"))?;
        let offset = usize::try_from(ptr).map_err(|_| HandlerError::failed("alloc returned a negative pointer"))?;
        memory
            .write(&mut self.store, offset, text.as_bytes())
            .map_err(trap)?;
        Ok((ptr, len))
    }

    fn call_file_open(&mut self, path: &str, ext: &str) -> HandlerResult<bool> {
        self.refuel()?;
        let (path_ptr, path_len) = self.write_guest_str(path)?;
        let (ext_ptr, ext_len) = self.write_guest_str(ext)?;
        let func = self
            .instance
            .get_typed_func::<(i32, i32, i32, i32), i32>(&mut self.store, "on_file_open")
            .map_err(trap)?;
        let claimed = func
            .call(&mut self.store, (path_ptr, path_len, ext_ptr, ext_len))
            .map_err(trap)?;
        Ok(claimed != 0)
    }
}

fn borrow_instance(instance: &SharedInstance) -> HandlerResult<std::cell::RefMut<'_, WasmInstance>> {
    instance
        .try_borrow_mut()
        .map_err(|_| HandlerError::failed("WASM instance is already running"))
}

fn read_guest_str(caller: &mut Caller<'_, WasmState>, ptr: i32, len: i32) -> Option<String> {
    let memory = caller.get_export("memory").and_then(|e| e.into_memory())?;
    let start = usize::try_from(ptr).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    let data = memory.data(&*caller);
    data.get(start..end)
        .and_then(|slice| std::str::from_utf8(slice).ok())
        .map(str::to_string)
}

fn add_host_functions(linker: &mut Linker<WasmState>) -> CoreResult<()> {
    let link_err = |name: &str, e: Error| CoreError::Wasm(format!("Failed to add {}: {}", name, e));

    linker
        .func_wrap(
            "env",
            "host_log",
            |mut caller: Caller<'_, WasmState>, level: i32, ptr: i32, len: i32| {
                if let Some(message) = read_guest_str(&mut caller, ptr, len) {
                    let id = &caller.data().extension_id;
                    match level {
                        0 => tracing::debug!("[extension:{}] {}", id, message),
                        1 => tracing::info!("[extension:{}] {}", id, message),
                        2 => tracing::warn!("[extension:{}] {}", id, message),
                        _ => tracing::error!("[extension:{}] {}", id, message),
                    }
                }
            },
        )
        .map_err(|e| link_err("host_log", e))?;

    linker
        .func_wrap("env", "host_time_now", || -> i64 {
            chrono::Utc::now().timestamp_millis()
        })
        .map_err(|e| link_err("host_time_now", e))?;

    linker
        .func_wrap(
            "env",
            "host_editor_insert",
            |mut caller: Caller<'_, WasmState>, ptr: i32, len: i32| {
                if let Some(text) = read_guest_str(&mut caller, ptr, len) {
                    caller.data().editor.insert_at_cursor(&text);
                }
            },
        )
        .map_err(|e| link_err("host_editor_insert", e))?;

    linker
        .func_wrap(
            "env",
            "host_notify",
            |mut caller: Caller<'_, WasmState>, kind: i32, ptr: i32, len: i32| {
                if let Some(message) = read_guest_str(&mut caller, ptr, len) {
                    let kind = match kind {
                        0 => NotificationKind::Info,
                        1 => NotificationKind::Success,
                        2 => NotificationKind::Warning,
                        _ => NotificationKind::Error,
                    };
                    let state = caller.data();
                    state.notifier.show(&state.extension_id, &message, kind);
                }
            },
        )
        .map_err(|e| link_err("host_notify", e))?;

    Ok(())
}

impl WasmModule {
    fn instantiate(&self, extension_id: &str, api: &CapabilityApi) -> CoreResult<WasmInstance> {
        let state = WasmState {
            extension_id: extension_id.to_string(),
            editor: api.editor.clone(),
            notifier: api.notifications.clone(),
        };
        let mut store = Store::new(&self.engine, state);
        if let Some(fuel) = self.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| CoreError::Wasm(format!("Failed to set fuel: {}", e)))?;
        }

        let mut linker = Linker::new(&self.engine);
        add_host_functions(&mut linker)?;
        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| CoreError::Wasm(format!("Failed to instantiate module: {}", e)))?;

        Ok(WasmInstance {
            store,
            instance,
            fuel: self.fuel,
        })
    }

    fn exported_functions(&self) -> Vec<String> {
        self.module
            .exports()
            .filter(|export| matches!(export.ty(), ExternType::Func(_)))
            .map(|export| export.name().to_string())
            .collect()
    }

    /// `() -> ()` exports that are not lifecycle hooks
    fn action_names(&self) -> Vec<String> {
        self.module
            .exports()
            .filter(|export| !RESERVED_EXPORTS.contains(&export.name()))
            .filter(|export| match export.ty() {
                ExternType::Func(func) => func.params().len() == 0 && func.results().len() == 0,
                _ => false,
            })
            .map(|export| export.name().to_string())
            .collect()
    }

    fn handlers(&self, shared: &SharedInstance) -> ExtensionHandlers {
        let exports = self.exported_functions();
        let has = |name: &str| exports.iter().any(|e| e == name);
        let mut handlers = ExtensionHandlers::new();

        if has("on_init") {
            let inst = shared.clone();
            handlers = handlers.with_init(move |_| borrow_instance(&inst)?.call_unit("on_init"));
        }
        if has("on_file_open") {
            let inst = shared.clone();
            handlers = handlers.with_file_open(move |_, path, ext| {
                borrow_instance(&inst)?.call_file_open(path, ext)
            });
        }
        if has("on_editor_input") {
            let inst = shared.clone();
            handlers = handlers
                .with_editor_input(move |_, _| borrow_instance(&inst)?.call_unit("on_editor_input"));
        }
        if has("on_destroy") {
            let inst = shared.clone();
            handlers = handlers.with_destroy(move |_| borrow_instance(&inst)?.call_unit("on_destroy"));
        }
        for name in self.action_names() {
            let inst = shared.clone();
            let export = name.clone();
            handlers = handlers.with_action(name, move |_| borrow_instance(&inst)?.call_unit(&export));
        }
        handlers
    }
}

impl ExtensionModule for WasmModule {
    fn evaluate(
        &self,
        scope: &mut ModuleScope,
        api: &CapabilityApi,
        host: &mut PluginHost,
    ) -> HandlerResult<()> {
        let id = scope.module.id.clone();
        let instance = self.instantiate(&id, api)?;
        let shared: SharedInstance = Rc::new(RefCell::new(instance));

        let manifest = self
            .manifest
            .clone()
            .unwrap_or_else(|| ExtensionManifest::new(id.clone(), id.clone()));
        let handlers = self.handlers(&shared);
        scope.exports = json!({
            "functions": self.exported_functions(),
            "actions": self.action_names(),
        });

        if !scope.is_entry() {
            tracing::debug!("Evaluated required WASM module {:?} for '{}'", scope.module.entry, id);
            return Ok(());
        }
        tracing::info!("Instantiated WASM module for extension '{}'", id);
        host.register_extension(manifest, handlers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plugin::evaluator::ModuleInfo;
    use crate::core::plugin::host::PluginHostConfig;
    use crate::core::plugin::manifest::UiButton;
    use chrono::Local;

    const DEMO_WAT: &str = r#"
        (module
          (import "env" "host_log" (func $log (param i32 i32 i32)))
          (import "env" "host_editor_insert" (func $insert (param i32 i32)))
          (import "env" "host_notify" (func $notify (param i32 i32 i32)))
          (memory (export "memory") 1)
          (data (i32.const 0) "hello")
          (data (i32.const 16) "ready")
          (global $heap (mut i32) (i32.const 1024))
          (func (export "alloc") (param $len i32) (result i32)
            (local $ptr i32)
            (local.set $ptr (global.get $heap))
            (global.set $heap (i32.add (global.get $heap) (local.get $len)))
            (local.get $ptr))
          (func (export "on_init")
            (call $log (i32.const 1) (i32.const 16) (i32.const 5))
            (call $notify (i32.const 1) (i32.const 16) (i32.const 5)))
          (func (export "on_file_open") (param i32 i32 i32 i32) (result i32)
            (i32.and
              (i32.eq (local.get 3) (i32.const 4))
              (i32.eq (i32.load8_u offset=1 (local.get 2)) (i32.const 112))))
          (func (export "onGreet")
            (call $insert (i32.const 0) (i32.const 5)))
          (func (export "spin")
            (loop $forever (br $forever))))
    "#;

    fn evaluate_demo(host: &mut PluginHost, fuel: u64) -> ModuleScope {
        let evaluator = WasmEvaluator::new(true, fuel).unwrap();
        let manifest = ExtensionManifest::new("demo", "Demo").with_button(UiButton::new("Greet", "onGreet"));
        let ctx = BundleContext {
            bundle: "demo",
            manifest: Some(&manifest),
            entry: Some("main.wat"),
        };
        assert_eq!(
            evaluator.accepts(&ctx),
            Some(EntryRequest::File("main.wat".into()))
        );

        let module = evaluator
            .compile(&ctx, Some(DEMO_WAT.as_bytes().to_vec()))
            .unwrap();
        let api = host.api_for("demo", "demo");
        let mut scope = ModuleScope::new(ModuleInfo {
            bundle: "demo".into(),
            id: "demo".into(),
            entry: Some("main.wat".into()),
        });
        module.evaluate(&mut scope, &api, host).unwrap();
        scope
    }

    #[test]
    fn test_accepts_only_wasm_entries() {
        let evaluator = WasmEvaluator::new(false, 0).unwrap();
        let ctx = |entry| BundleContext {
            bundle: "x",
            manifest: None,
            entry,
        };
        assert!(evaluator.accepts(&ctx(Some("lib/Main.WASM"))).is_some());
        assert!(evaluator.accepts(&ctx(Some("main.js"))).is_none());
        assert!(evaluator.accepts(&ctx(None)).is_none());
    }

    #[test]
    fn test_invalid_module_fails_to_compile() {
        let evaluator = WasmEvaluator::new(true, 1000).unwrap();
        let ctx = BundleContext {
            bundle: "broken",
            manifest: None,
            entry: Some("main.wat"),
        };
        let err = evaluator
            .compile(&ctx, Some(b"(module (func".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Wasm(_)));
    }

    #[test]
    fn test_module_registers_and_runs_on_init() {
        let mut host = PluginHost::new(PluginHostConfig::default()).unwrap();
        let scope = evaluate_demo(&mut host, 1_000_000);

        assert!(host.registry().contains("demo"));
        let actions = scope.exports["actions"].as_array().unwrap();
        assert!(actions.iter().any(|a| a == "onGreet"));
        assert!(actions.iter().all(|a| a != "alloc"));

        let toasts = host.services().notifier.active(Local::now());
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].message, "ready");
        assert_eq!(toasts[0].kind, NotificationKind::Success);
    }

    #[test]
    fn test_file_open_passes_strings_through_memory() {
        let mut host = PluginHost::new(PluginHostConfig::default()).unwrap();
        evaluate_demo(&mut host, 1_000_000);

        assert_eq!(
            host.dispatch_file_open("icons/logo.png").handled_by.as_deref(),
            Some("demo")
        );
        assert!(!host.dispatch_file_open("notes.txt").handled());
    }

    #[test]
    fn test_actions_reach_the_editor() {
        let mut host = PluginHost::new(PluginHostConfig::default()).unwrap();
        evaluate_demo(&mut host, 1_000_000);
        host.services().editor.open_document(None, "", "text");

        assert!(host.invoke_action("demo", "onGreet"));
        assert_eq!(host.services().editor.content(), "hello");
    }

    #[test]
    fn test_fuel_exhaustion_is_isolated() {
        let mut host = PluginHost::new(PluginHostConfig::default()).unwrap();
        evaluate_demo(&mut host, 10_000);

        assert!(!host.invoke_action("demo", "spin"));
        assert!(host
            .services()
            .notifier
            .last_log_line()
            .unwrap()
            .contains("Extension 'demo' failed in spin"));

        // fresh budget on the next call
        host.services().editor.open_document(None, "", "text");
        assert!(host.invoke_action("demo", "onGreet"));
    }
}
