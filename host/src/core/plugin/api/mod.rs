//! Capability API
//!
//! The fixed set of host services handed to every extension. All proxies share
//! the host's [`BridgeSlot`]; calls made while no bridge is attached resolve
//! to an unsuccessful result instead of failing loudly. Storage is pre-bound
//! to the calling extension's namespace.

pub mod clipboard;
pub mod dialogs;
pub mod editor;
pub mod http;
pub mod modules;
pub mod notify;

pub use clipboard::{Clipboard, ClipboardBackend, ClipboardWrite};
pub use dialogs::{DialogPresenter, Dialogs, InputDialogOptions, ScriptedDialogs};
pub use editor::{EditorAccessor, EditorBuffer};
pub use http::{HttpApi, HttpRequest, HttpResponse};
pub use modules::{LoadedFile, ModuleLoader};
pub use notify::{Notification, NotificationKind, Notifier};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use crate::core::bridge::{BridgeResult, BridgeSlot, DirEntry, HostBridge, ScriptOutput};
use crate::core::process::ExecOutput;
use crate::core::CoreResult;

/// Runs `op` against the attached bridge, or reports it unavailable.
pub(crate) async fn with_bridge<T, F, Fut>(slot: &BridgeSlot, op: &str, f: F) -> BridgeResult<T>
where
    F: FnOnce(Arc<dyn HostBridge>) -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    match slot.get() {
        Ok(bridge) => f(bridge).await.into(),
        Err(_) => {
            tracing::debug!("{} ignored: host bridge not attached", op);
            BridgeResult::unavailable()
        }
    }
}

// =============================================================================
// Filesystem
// =============================================================================

#[derive(Debug, Clone)]
pub struct FsApi {
    bridge: BridgeSlot,
}

impl FsApi {
    pub async fn read(&self, path: &str) -> BridgeResult<String> {
        with_bridge(&self.bridge, "fs.read", |b| async move { b.read_file(path).await }).await
    }

    pub async fn write(&self, path: &str, content: &str) -> BridgeResult<()> {
        with_bridge(&self.bridge, "fs.write", |b| async move {
            b.write_file(path, content).await
        })
        .await
    }

    pub async fn list(&self, path: &str) -> BridgeResult<Vec<DirEntry>> {
        with_bridge(&self.bridge, "fs.list", |b| async move { b.list_dir(path).await }).await
    }

    pub async fn create_file(&self, path: &str) -> BridgeResult<()> {
        with_bridge(&self.bridge, "fs.createFile", |b| async move {
            b.create_file(path).await
        })
        .await
    }

    pub async fn create_dir(&self, path: &str) -> BridgeResult<()> {
        with_bridge(&self.bridge, "fs.createDir", |b| async move {
            b.create_dir(path).await
        })
        .await
    }

    pub async fn delete(&self, path: &str) -> BridgeResult<()> {
        with_bridge(&self.bridge, "fs.delete", |b| async move { b.delete(path).await }).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> BridgeResult<()> {
        with_bridge(&self.bridge, "fs.rename", |b| async move { b.rename(from, to).await }).await
    }

    pub async fn exists(&self, path: &str) -> BridgeResult<bool> {
        with_bridge(&self.bridge, "fs.exists", |b| async move { b.exists(path).await }).await
    }
}

// =============================================================================
// Shell, scripts, storage
// =============================================================================

#[derive(Debug, Clone)]
pub struct ShellApi {
    bridge: BridgeSlot,
}

impl ShellApi {
    pub async fn exec(&self, command: &str) -> BridgeResult<ExecOutput> {
        with_bridge(&self.bridge, "shell.exec", |b| async move { b.exec(command).await }).await
    }
}

#[derive(Debug, Clone)]
pub struct ScriptApi {
    bridge: BridgeSlot,
}

impl ScriptApi {
    pub async fn run(&self, path: &str, args: &[String]) -> ScriptOutput {
        let result = with_bridge(&self.bridge, "scripts.run", |b| async move {
            b.run_script(path, args).await
        })
        .await;
        match result.data {
            Some(out) => out,
            None => ScriptOutput {
                success: false,
                code: -1,
                error: result.error,
                ..Default::default()
            },
        }
    }
}

/// Key/value storage bound to one namespace
#[derive(Debug, Clone)]
pub struct StorageApi {
    bridge: BridgeSlot,
    namespace: String,
}

impl StorageApi {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self, key: &str) -> BridgeResult<Option<Value>> {
        let ns = self.namespace.as_str();
        with_bridge(&self.bridge, "storage.get", |b| async move {
            b.storage_get(ns, key).await
        })
        .await
    }

    pub async fn set(&self, key: &str, value: Value) -> BridgeResult<()> {
        let ns = self.namespace.as_str();
        with_bridge(&self.bridge, "storage.set", |b| async move {
            b.storage_set(ns, key, value).await
        })
        .await
    }

    pub async fn remove(&self, key: &str) -> BridgeResult<()> {
        let ns = self.namespace.as_str();
        with_bridge(&self.bridge, "storage.remove", |b| async move {
            b.storage_remove(ns, key).await
        })
        .await
    }
}

// =============================================================================
// Deferred work
// =============================================================================

type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Queue of async work started from synchronous extension callbacks.
///
/// Hooks cannot await; they queue a future here and the host drives the
/// queue at its next suspension point.
#[derive(Clone, Default)]
pub struct DeferredTasks {
    queue: Rc<RefCell<VecDeque<LocalTask>>>,
}

impl DeferredTasks {
    pub fn push(&self, task: impl Future<Output = ()> + 'static) {
        self.queue.borrow_mut().push_back(Box::pin(task));
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Runs queued tasks in order, including ones queued while running
    pub async fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task.await;
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl std::fmt::Debug for DeferredTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTasks")
            .field("pending", &self.len())
            .finish()
    }
}

// =============================================================================
// Capability API
// =============================================================================

/// Shared UI services the host owns; cloned into every [`CapabilityApi`]
#[derive(Debug, Clone, Default)]
pub struct SharedServices {
    pub bridge: BridgeSlot,
    pub editor: EditorAccessor,
    pub notifier: Notifier,
    pub clipboard: Clipboard,
    pub dialogs: Dialogs,
    pub tasks: DeferredTasks,
}

/// Services handed to one extension
#[derive(Debug, Clone)]
pub struct CapabilityApi {
    extension_id: String,
    pub fs: FsApi,
    pub shell: ShellApi,
    pub storage: StorageApi,
    pub editor: EditorAccessor,
    pub notifications: Notifier,
    pub dialogs: Dialogs,
    pub clipboard: Clipboard,
    pub http: HttpApi,
    pub modules: ModuleLoader,
    pub scripts: ScriptApi,
    tasks: DeferredTasks,
}

impl CapabilityApi {
    /// Builds the surface for `extension_id`, whose files live in `bundle`
    pub fn new(
        services: &SharedServices,
        extension_id: &str,
        bundle: &str,
        http_tool: &str,
    ) -> Self {
        let bridge = services.bridge.clone();
        Self {
            extension_id: extension_id.to_string(),
            fs: FsApi {
                bridge: bridge.clone(),
            },
            shell: ShellApi {
                bridge: bridge.clone(),
            },
            storage: StorageApi {
                bridge: bridge.clone(),
                namespace: extension_id.to_string(),
            },
            editor: services.editor.clone(),
            notifications: services.notifier.clone(),
            dialogs: services.dialogs.clone(),
            clipboard: services.clipboard.clone(),
            http: HttpApi::new(bridge.clone(), http_tool),
            modules: ModuleLoader::new(bridge.clone(), bundle),
            scripts: ScriptApi { bridge },
            tasks: services.tasks.clone(),
        }
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Queues async work; it runs when the host next drains deferred tasks
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.tasks.push(task);
    }
}
