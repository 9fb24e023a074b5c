//! Clipboard surface
//!
//! Uses the platform clipboard when a backend is present (the
//! `system-clipboard` feature wires in `arboard`). When it is missing or a
//! write fails, the text is staged for manual selection and the user is asked
//! to copy it themselves.

use std::cell::RefCell;
use std::rc::Rc;

use super::notify::{NotificationKind, Notifier};

/// Platform clipboard access
pub trait ClipboardBackend {
    fn read_text(&mut self) -> Result<String, String>;
    fn write_text(&mut self, text: &str) -> Result<(), String>;
}

/// How a copy request was satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardWrite {
    Copied,
    /// Text is staged; the user has to select and copy it
    ManualSelection,
}

#[derive(Default)]
struct ClipboardState {
    backend: Option<Box<dyn ClipboardBackend>>,
    staged: Option<String>,
}

/// Shared clipboard handle
#[derive(Clone, Default)]
pub struct Clipboard {
    state: Rc<RefCell<ClipboardState>>,
    notifier: Notifier,
}

impl Clipboard {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            state: Rc::default(),
            notifier,
        }
    }

    /// Clipboard backed by the system clipboard when the feature and the
    /// platform allow it
    pub fn system(notifier: Notifier) -> Self {
        let clipboard = Self::new(notifier);
        #[cfg(feature = "system-clipboard")]
        {
            match arboard::Clipboard::new() {
                Ok(inner) => clipboard.set_backend(Box::new(SystemClipboard { inner })),
                Err(e) => tracing::warn!("System clipboard unavailable: {}", e),
            }
        }
        clipboard
    }

    pub fn set_backend(&self, backend: Box<dyn ClipboardBackend>) {
        self.state.borrow_mut().backend = Some(backend);
    }

    pub fn has_backend(&self) -> bool {
        self.state.borrow().backend.is_some()
    }

    pub fn write_text(&self, text: &str) -> ClipboardWrite {
        let mut state = self.state.borrow_mut();
        if let Some(backend) = state.backend.as_mut() {
            match backend.write_text(text) {
                Ok(()) => {
                    state.staged = None;
                    return ClipboardWrite::Copied;
                }
                Err(e) => tracing::warn!("Clipboard write failed, staging text: {}", e),
            }
        }
        state.staged = Some(text.to_string());
        drop(state);

        self.notifier.show(
            "Copy manually",
            "The clipboard is unavailable. Select the text and copy it.",
            NotificationKind::Warning,
        );
        ClipboardWrite::ManualSelection
    }

    /// System clipboard text, or the staged text when there is no backend
    pub fn read_text(&self) -> Option<String> {
        let mut state = self.state.borrow_mut();
        if let Some(backend) = state.backend.as_mut() {
            match backend.read_text() {
                Ok(text) => return Some(text),
                Err(e) => tracing::debug!("Clipboard read failed: {}", e),
            }
        }
        state.staged.clone()
    }

    /// Text waiting for manual selection, if any
    pub fn staged_text(&self) -> Option<String> {
        self.state.borrow().staged.clone()
    }
}

impl std::fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clipboard")
            .field("backend", &self.has_backend())
            .field("staged", &self.staged_text().is_some())
            .finish()
    }
}

#[cfg(feature = "system-clipboard")]
struct SystemClipboard {
    inner: arboard::Clipboard,
}

#[cfg(feature = "system-clipboard")]
impl ClipboardBackend for SystemClipboard {
    fn read_text(&mut self) -> Result<String, String> {
        self.inner.get_text().map_err(|e| e.to_string())
    }

    fn write_text(&mut self, text: &str) -> Result<(), String> {
        self.inner.set_text(text).map_err(|e| e.to_string())
    }
}
