//! Extension hooks and their dispatch
//!
//! [`ExtensionHandlers`] holds one optional callback per well-known hook plus
//! named actions. Every call into extension code goes through [`guarded`],
//! which turns both `Err` results and panics into a logged
//! `CoreError::HandlerInvocation`; nothing raised by an extension reaches the
//! caller of a dispatch method.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::api::EditorAccessor;
use super::events::{FILE_CHANGE, FILE_OPEN, FILE_SAVE, PROJECT_OPEN};
use super::host::PluginHost;
use super::manifest::file_extension_of;
use crate::core::CoreError;

// =============================================================================
// Handler errors
// =============================================================================

/// Error returned by extension callbacks
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs one extension callback at the recovery boundary.
pub fn guarded<T>(
    owner: &str,
    hook: &str,
    f: impl FnOnce() -> HandlerResult<T>,
) -> Result<T, CoreError> {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    };

    outcome.map_err(|e| {
        tracing::error!("[extension:{}] {} failed: {}", owner, hook, e);
        CoreError::HandlerInvocation {
            id: owner.to_string(),
            hook: hook.to_string(),
            message: e.to_string(),
        }
    })
}

// =============================================================================
// Handler set
// =============================================================================

pub type InitHook = Rc<dyn Fn(&mut PluginHost) -> HandlerResult<()>>;
pub type FileOpenHook = Rc<dyn Fn(&mut PluginHost, &str, &str) -> HandlerResult<bool>>;
pub type EditorInputHook = Rc<dyn Fn(&mut PluginHost, &EditorAccessor) -> HandlerResult<()>>;
pub type ActionHook = Rc<dyn Fn(&mut PluginHost) -> HandlerResult<()>>;

/// Callbacks an extension registers; absent hooks are simply `None`
#[derive(Clone, Default)]
pub struct ExtensionHandlers {
    pub on_init: Option<InitHook>,
    /// `(path, dotted_ext)`; returning `true` claims the file
    pub on_file_open: Option<FileOpenHook>,
    pub on_editor_input: Option<EditorInputHook>,
    pub on_destroy: Option<ActionHook>,
    /// Named actions referenced by buttons and commands
    pub actions: BTreeMap<String, ActionHook>,
}

impl ExtensionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(mut self, f: impl Fn(&mut PluginHost) -> HandlerResult<()> + 'static) -> Self {
        self.on_init = Some(Rc::new(f));
        self
    }

    pub fn with_file_open(
        mut self,
        f: impl Fn(&mut PluginHost, &str, &str) -> HandlerResult<bool> + 'static,
    ) -> Self {
        self.on_file_open = Some(Rc::new(f));
        self
    }

    pub fn with_editor_input(
        mut self,
        f: impl Fn(&mut PluginHost, &EditorAccessor) -> HandlerResult<()> + 'static,
    ) -> Self {
        self.on_editor_input = Some(Rc::new(f));
        self
    }

    pub fn with_destroy(mut self, f: impl Fn(&mut PluginHost) -> HandlerResult<()> + 'static) -> Self {
        self.on_destroy = Some(Rc::new(f));
        self
    }

    pub fn with_action(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&mut PluginHost) -> HandlerResult<()> + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Rc::new(f));
        self
    }

    pub fn action(&self, name: &str) -> Option<ActionHook> {
        self.actions.get(name).cloned()
    }
}

impl std::fmt::Debug for ExtensionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHandlers")
            .field("on_init", &self.on_init.is_some())
            .field("on_file_open", &self.on_file_open.is_some())
            .field("on_editor_input", &self.on_editor_input.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Result of a first-responder `onFileOpen` dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOpenOutcome {
    pub ext: String,
    /// Extension that claimed the file, if any
    pub handled_by: Option<String>,
    /// Extensions whose handler ran, in order
    pub invoked: Vec<String>,
}

impl FileOpenOutcome {
    pub fn handled(&self) -> bool {
        self.handled_by.is_some()
    }
}

/// Result of an `onEditorInput` fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorInputReport {
    pub invoked: Vec<String>,
    pub failed: Vec<String>,
    /// Trigger of the snippet expanded after the fan-out
    pub expanded_snippet: Option<String>,
}

impl PluginHost {
    /// Offers a file to extensions in dispatch order; stops at the first
    /// handler that claims it.
    pub fn dispatch_file_open(&mut self, path: &str) -> FileOpenOutcome {
        let ext = file_extension_of(path);
        let hooks: Vec<(String, FileOpenHook)> = self
            .registry()
            .dispatch_order()
            .into_iter()
            .filter_map(|entry| {
                entry
                    .handlers
                    .on_file_open
                    .clone()
                    .map(|hook| (entry.manifest.id.clone(), hook))
            })
            .collect();

        let mut outcome = FileOpenOutcome {
            ext: ext.clone(),
            ..Default::default()
        };
        for (id, hook) in hooks {
            outcome.invoked.push(id.clone());
            match self.as_contributor(Some(&id), |host| {
                guarded(&id, "onFileOpen", || hook(host, path, &ext))
            }) {
                Ok(true) => {
                    outcome.handled_by = Some(id);
                    break;
                }
                Ok(false) => {}
                Err(e) => self.services().notifier.log_error(&e.to_string()),
            }
        }

        self.events().emit(
            FILE_OPEN,
            &json!({ "path": path, "ext": ext, "handledBy": outcome.handled_by }),
        );
        outcome
    }

    /// Runs every `onEditorInput` handler, then snippet expansion.
    pub fn dispatch_editor_input(&mut self) -> EditorInputReport {
        let hooks: Vec<(String, EditorInputHook)> = self
            .registry()
            .dispatch_order()
            .into_iter()
            .filter_map(|entry| {
                entry
                    .handlers
                    .on_editor_input
                    .clone()
                    .map(|hook| (entry.manifest.id.clone(), hook))
            })
            .collect();

        let editor = self.services().editor.clone();
        let mut report = EditorInputReport::default();
        for (id, hook) in hooks {
            report.invoked.push(id.clone());
            let result = self.as_contributor(Some(&id), |host| {
                guarded(&id, "onEditorInput", || hook(host, &editor))
            });
            if let Err(e) = result {
                self.services().notifier.log_error(&e.to_string());
                report.failed.push(id);
            }
        }

        report.expanded_snippet = self.expand_snippet_at_cursor();
        report
    }

    /// Invokes a named action of one extension; `false` when it is missing
    /// or failed.
    pub fn invoke_action(&mut self, extension_id: &str, action: &str) -> bool {
        let hook = self
            .registry()
            .get(extension_id)
            .and_then(|entry| entry.handlers.action(action));
        let Some(hook) = hook else {
            tracing::debug!(
                "Action '{}' not found on extension '{}'",
                action,
                extension_id
            );
            return false;
        };

        match self.as_contributor(Some(extension_id), |host| guarded(extension_id, action, || hook(host))) {
            Ok(()) => true,
            Err(e) => {
                self.services()
                    .notifier
                    .report_failure("Extension action failed", &e.to_string());
                false
            }
        }
    }

    /// Calls `onDestroy` on every entry in registration order
    pub(crate) fn run_destroy_hooks(&mut self) {
        let hooks: Vec<(String, ActionHook)> = self
            .registry()
            .entries()
            .iter()
            .filter_map(|entry| {
                entry
                    .handlers
                    .on_destroy
                    .clone()
                    .map(|hook| (entry.manifest.id.clone(), hook))
            })
            .collect();
        for (id, hook) in hooks {
            let result = self.as_contributor(Some(&id), |host| guarded(&id, "onDestroy", || hook(host)));
            if let Err(e) = result {
                self.services().notifier.log_error(&e.to_string());
            }
        }
    }

    pub fn notify_file_saved(&mut self, path: &str) {
        self.events().emit(FILE_SAVE, &json!({ "path": path }));
    }

    pub fn notify_file_changed(&mut self, path: &str) {
        self.events().emit(FILE_CHANGE, &json!({ "path": path }));
    }

    pub fn notify_project_opened(&mut self, path: &str) {
        self.events().emit(PROJECT_OPEN, &json!({ "path": path }));
    }
}
