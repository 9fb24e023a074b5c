//! Core control catalog
//!
//! The built-in toolbar controls extensions may override, and the surface that
//! reports their live default appearance.

use serde::{Deserialize, Serialize};

/// Control whose default follows the project kind
pub const DYNAMIC_CONTROL: &str = "run";

/// Every overridable control, in toolbar order
pub const CORE_CONTROLS: &[&str] = &[
    "run",
    "build",
    "save",
    "new-file",
    "terminal",
    "search",
    "theme-toggle",
];

pub fn is_core_control(id: &str) -> bool {
    CORE_CONTROLS.contains(&id)
}

/// Default appearance and behaviour of one control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSnapshot {
    pub label: String,
    pub icon: String,
    pub title: String,
    /// Built-in action the control triggers
    pub action: String,
}

impl ControlSnapshot {
    pub fn new(icon: &str, label: &str, title: &str, action: &str) -> Self {
        Self {
            label: label.to_string(),
            icon: icon.to_string(),
            title: title.to_string(),
            action: action.to_string(),
        }
    }
}

/// What the open project is, which decides what `run` does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    #[default]
    App,
    Extension,
    /// An extension project currently loaded in test mode
    ExtensionTest,
}

/// Source of the live default state of core controls
pub trait ControlSurface {
    fn snapshot(&self, control: &str) -> Option<ControlSnapshot>;
}

/// The editor's stock toolbar
#[derive(Debug, Clone, Default)]
pub struct DefaultControlSurface {
    pub project_kind: ProjectKind,
}

impl DefaultControlSurface {
    pub fn new(project_kind: ProjectKind) -> Self {
        Self { project_kind }
    }

    fn run_control(&self) -> ControlSnapshot {
        match self.project_kind {
            ProjectKind::App => {
                ControlSnapshot::new("play", "Ejecutar", "Ejecutar proyecto", "run-project")
            }
            ProjectKind::Extension => {
                ControlSnapshot::new("flask-conical", "Probar", "Probar extensión", "test-extension")
            }
            ProjectKind::ExtensionTest => ControlSnapshot::new(
                "square",
                "Terminar Prueba",
                "Terminar prueba de extensión",
                "stop-test-extension",
            ),
        }
    }
}

impl ControlSurface for DefaultControlSurface {
    fn snapshot(&self, control: &str) -> Option<ControlSnapshot> {
        let snapshot = match control {
            "run" => self.run_control(),
            "build" => ControlSnapshot::new("hammer", "Compilar", "Compilar proyecto", "build-project"),
            "save" => ControlSnapshot::new("save", "Guardar", "Guardar archivo (Ctrl+S)", "save-file"),
            "new-file" => ControlSnapshot::new("file-plus", "Nuevo", "Nuevo archivo", "new-file"),
            "terminal" => {
                ControlSnapshot::new("terminal", "Terminal", "Mostrar u ocultar la consola", "toggle-console")
            }
            "search" => ControlSnapshot::new("search", "Buscar", "Buscar en el proyecto", "search-project"),
            "theme-toggle" => ControlSnapshot::new("palette", "Tema", "Cambiar tema", "toggle-theme"),
            _ => return None,
        };
        Some(snapshot)
    }
}
