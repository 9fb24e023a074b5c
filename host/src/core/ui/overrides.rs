//! UI Override Resolver
//!
//! Each core control carries `{default_snapshot, current_override}`.
//! Rendering is a pure function of those two fields, and a click re-reads
//! the applicable action at click time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::controls::{is_core_control, ControlSnapshot, ControlSurface, CORE_CONTROLS, DYNAMIC_CONTROL};
use crate::core::{CoreError, CoreResult};

/// Sparse override of one control; absent fields keep the default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoreButtonOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Command id run instead of the built-in action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl CoreButtonOverride {
    pub fn from_value(value: Value) -> CoreResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::ValidationError(format!("Malformed control override: {}", e)))
    }

    pub fn label(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Default::default()
        }
    }
}

/// Per-control resolver state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub default_snapshot: Option<ControlSnapshot>,
    pub current_override: Option<CoreButtonOverride>,
}

/// What a control looks like after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedControl {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub title: String,
    pub hidden: bool,
    pub disabled: bool,
}

/// What clicking a control does right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlInvocation {
    /// Disabled, hidden or unknown
    Blocked,
    /// Run the editor's built-in action
    Builtin(String),
    /// Run an extension command
    Command(String),
}

impl ControlState {
    /// Pure merge of snapshot and override
    pub fn render(&self, id: &str) -> Option<RenderedControl> {
        let default = self.default_snapshot.as_ref()?;
        let ov = self.current_override.clone().unwrap_or_default();
        Some(RenderedControl {
            id: id.to_string(),
            label: ov.label.unwrap_or_else(|| default.label.clone()),
            icon: ov.icon.unwrap_or_else(|| default.icon.clone()),
            title: ov.title.unwrap_or_else(|| default.title.clone()),
            hidden: ov.hidden.unwrap_or(false),
            disabled: ov.disabled.unwrap_or(false),
        })
    }

    pub fn invocation(&self) -> ControlInvocation {
        let Some(default) = &self.default_snapshot else {
            return ControlInvocation::Blocked;
        };
        let ov = self.current_override.as_ref();
        if ov.and_then(|o| o.disabled).unwrap_or(false) || ov.and_then(|o| o.hidden).unwrap_or(false) {
            return ControlInvocation::Blocked;
        }
        match ov.and_then(|o| o.action.clone()) {
            Some(command) => ControlInvocation::Command(command),
            None => ControlInvocation::Builtin(default.action.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverrideResolver {
    states: BTreeMap<String, ControlState>,
}

impl OverrideResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &str) -> Option<&ControlState> {
        self.states.get(id)
    }

    pub fn set_override(&mut self, id: &str, ov: CoreButtonOverride) -> CoreResult<()> {
        if !is_core_control(id) {
            return Err(CoreError::ValidationError(format!("Unknown core control '{}'", id)));
        }
        self.states.entry(id.to_string()).or_default().current_override = Some(ov);
        Ok(())
    }

    /// Applies `{controlId: {...}, ...}`; bad entries are logged and skipped.
    /// Returns how many overrides were applied.
    pub fn set_overrides_json(&mut self, json: &str) -> CoreResult<usize> {
        let map: BTreeMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| CoreError::ValidationError(format!("Override map is not an object: {}", e)))?;

        let mut applied = 0;
        for (id, value) in map {
            match CoreButtonOverride::from_value(value).and_then(|ov| self.set_override(&id, ov)) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!("Ignoring override for '{}': {}", id, e),
            }
        }
        Ok(applied)
    }

    pub fn clear_override(&mut self, id: &str) -> bool {
        self.states
            .get_mut(id)
            .and_then(|state| state.current_override.take())
            .is_some()
    }

    /// Drops every override; captured defaults stay
    pub fn clear_overrides(&mut self) {
        for state in self.states.values_mut() {
            state.current_override = None;
        }
    }

    pub fn overrides(&self) -> BTreeMap<&str, &CoreButtonOverride> {
        self.states
            .iter()
            .filter_map(|(id, s)| s.current_override.as_ref().map(|ov| (id.as_str(), ov)))
            .collect()
    }

    /// One resolution pass over the catalog
    pub fn resolve(&mut self, surface: &dyn ControlSurface) -> Vec<RenderedControl> {
        CORE_CONTROLS
            .iter()
            .filter_map(|id| {
                let state = self.states.entry(id.to_string()).or_default();
                if state.default_snapshot.is_none() || *id == DYNAMIC_CONTROL {
                    state.default_snapshot = surface.snapshot(id);
                }
                state.render(id)
            })
            .collect()
    }

    /// Action for a click, read at click time
    pub fn click(&mut self, surface: &dyn ControlSurface, id: &str) -> ControlInvocation {
        if !is_core_control(id) {
            return ControlInvocation::Blocked;
        }
        let state = self.states.entry(id.to_string()).or_default();
        if state.default_snapshot.is_none() || id == DYNAMIC_CONTROL {
            state.default_snapshot = surface.snapshot(id);
        }
        state.invocation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ui::controls::{DefaultControlSurface, ProjectKind};
    use serde_json::json;

    #[test]
    fn test_empty_override_map_round_trips_defaults() {
        let surface = DefaultControlSurface::default();
        let mut resolver = OverrideResolver::new();
        let rendered = resolver.resolve(&surface);

        assert_eq!(rendered.len(), CORE_CONTROLS.len());
        for control in &rendered {
            let default = surface.snapshot(&control.id).unwrap();
            assert_eq!(control.label, default.label);
            assert_eq!(control.icon, default.icon);
            assert_eq!(control.title, default.title);
            assert!(!control.hidden && !control.disabled);
            assert_eq!(
                resolver.click(&surface, &control.id),
                ControlInvocation::Builtin(default.action)
            );
        }
    }

    #[test]
    fn test_stop_override_scenario() {
        let surface = DefaultControlSurface::default();
        let mut resolver = OverrideResolver::new();
        resolver.resolve(&surface);

        assert_eq!(resolver.set_overrides_json(r#"{"run": {"label": "Stop", "hidden": false}}"#).unwrap(), 1);
        let run = resolver.resolve(&surface).remove(0);
        assert_eq!(run.label, "Stop");
        assert_eq!(run.icon, "play");
        assert!(!run.hidden);

        assert!(resolver.clear_override("run"));
        assert_eq!(resolver.resolve(&surface)[0].label, "Ejecutar");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let surface = DefaultControlSurface::default();
        let mut resolver = OverrideResolver::new();
        resolver.set_override("save", CoreButtonOverride::label("Guardar todo")).unwrap();
        let first = resolver.resolve(&surface);
        let second = resolver.resolve(&surface);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dynamic_control_tracks_live_state() {
        let mut surface = DefaultControlSurface::default();
        let mut resolver = OverrideResolver::new();
        resolver.resolve(&surface);

        surface.project_kind = ProjectKind::ExtensionTest;
        let rendered = resolver.resolve(&surface);
        assert_eq!(rendered[0].label, "Terminar Prueba");
        assert_eq!(
            resolver.click(&surface, "run"),
            ControlInvocation::Builtin("stop-test-extension".into())
        );
        // frozen controls keep their first snapshot
        assert_eq!(rendered[1].label, "Compilar");
    }

    #[test]
    fn test_hidden_and_disabled_keep_the_override() {
        let surface = DefaultControlSurface::default();
        let mut resolver = OverrideResolver::new();
        resolver
            .set_override(
                "build",
                CoreButtonOverride {
                    action: Some("cargo.build".into()),
                    disabled: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(resolver.click(&surface, "build"), ControlInvocation::Blocked);
        assert!(resolver.resolve(&surface)[1].disabled);

        let mut ov = resolver.state("build").unwrap().current_override.clone().unwrap();
        ov.disabled = Some(false);
        resolver.set_override("build", ov).unwrap();
        assert_eq!(
            resolver.click(&surface, "build"),
            ControlInvocation::Command("cargo.build".into())
        );

        resolver
            .set_override("search", CoreButtonOverride { hidden: Some(true), ..Default::default() })
            .unwrap();
        let search = resolver.resolve(&surface).into_iter().find(|c| c.id == "search").unwrap();
        assert!(search.hidden);
        assert_eq!(search.label, "Buscar");
    }

    #[test]
    fn test_malformed_overrides_are_ignored() {
        let mut resolver = OverrideResolver::new();
        let applied = resolver
            .set_overrides_json(
                &json!({
                    "run": {"label": "Go"},
                    "format": {"label": "Format"},
                    "save": {"hidden": "yes"},
                    "build": {"colour": "red"},
                })
                .to_string(),
            )
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(resolver.overrides().len(), 1);
        assert!(resolver.set_overrides_json("[1, 2]").unwrap_err().is_validation());
        assert!(resolver
            .set_override("format", CoreButtonOverride::default())
            .unwrap_err()
            .is_validation());
    }
}
