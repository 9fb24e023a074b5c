//! Host Facade
//!
//! Commands, keybinds, snippets, menu items and panels that extensions
//! contribute at runtime. Each contribution remembers the extension that made
//! it so a registry reset can drop exactly the extension-contributed set.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::hooks::{guarded, ActionHook, HandlerResult};
use super::host::PluginHost;
use crate::core::{CoreError, CoreResult};

/// Wildcard language for snippets
pub const ANY_LANGUAGE: &str = "*";

/// Default width of a right-docked panel
pub const DEFAULT_PANEL_WIDTH: &str = "350px";

// =============================================================================
// Key combos
// =============================================================================

/// Parsed keybind, e.g. `ctrl+shift+p`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyCombo {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    /// Lower-cased key name
    pub key: String,
}

impl KeyCombo {
    pub fn new(ctrl: bool, shift: bool, alt: bool, key: &str) -> Self {
        Self {
            ctrl,
            shift,
            alt,
            key: key.to_ascii_lowercase(),
        }
    }
}

impl FromStr for KeyCombo {
    type Err = CoreError;

    /// Optional `ctrl+`, `shift+`, `alt+` in any order, then exactly one key.
    fn from_str(combo: &str) -> CoreResult<Self> {
        let invalid = |why: &str| CoreError::ValidationError(format!("Invalid key combo '{combo}': {why}"));

        let parts: Vec<String> = combo
            .split('+')
            .map(|p| p.trim().to_ascii_lowercase())
            .collect();
        let Some((key, modifiers)) = parts.split_last() else {
            return Err(invalid("empty"));
        };
        if key.is_empty() {
            return Err(invalid("missing key"));
        }
        if matches!(key.as_str(), "ctrl" | "shift" | "alt") {
            return Err(invalid("modifier without a key"));
        }

        let mut parsed = KeyCombo {
            key: key.clone(),
            ..Default::default()
        };
        for modifier in modifiers {
            let flag = match modifier.as_str() {
                "ctrl" => &mut parsed.ctrl,
                "shift" => &mut parsed.shift,
                "alt" => &mut parsed.alt,
                "" => return Err(invalid("empty segment")),
                other => return Err(invalid(&format!("unknown modifier '{other}'"))),
            };
            if *flag {
                return Err(invalid("repeated modifier"));
            }
            *flag = true;
        }
        Ok(parsed)
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "ctrl+")?;
        }
        if self.shift {
            write!(f, "shift+")?;
        }
        if self.alt {
            write!(f, "alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

// =============================================================================
// Contribution types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub trigger: String,
    pub language: String,
    pub expansion: String,
}

impl Snippet {
    fn matches(&self, before_cursor: &str, language: &str) -> bool {
        !self.trigger.is_empty()
            && (self.language == ANY_LANGUAGE || self.language.eq_ignore_ascii_case(language))
            && before_cursor.ends_with(&self.trigger)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub label: String,
    /// Command executed when the item is chosen
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl MenuItem {
    pub fn command(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: Some(command.into()),
            icon: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelPosition {
    /// Covers the editor
    #[default]
    Full,
    /// Docked to the right of the editor
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelOptions {
    #[serde(default)]
    pub position: PanelPosition,
    #[serde(default = "default_panel_width")]
    pub width: String,
}

fn default_panel_width() -> String {
    DEFAULT_PANEL_WIDTH.to_string()
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            position: PanelPosition::Full,
            width: default_panel_width(),
        }
    }
}

impl PanelOptions {
    pub fn right() -> Self {
        Self {
            position: PanelPosition::Right,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub id: String,
    pub html: String,
    pub options: PanelOptions,
}

/// A value plus the extension that contributed it (`None` for the host)
#[derive(Clone)]
struct Contributed<T> {
    owner: Option<String>,
    value: T,
}

// =============================================================================
// Facade state
// =============================================================================

#[derive(Default)]
pub struct HostFacade {
    commands: BTreeMap<String, Contributed<ActionHook>>,
    keybinds: Vec<Contributed<(KeyCombo, ActionHook)>>,
    snippets: Vec<Contributed<Snippet>>,
    menus: BTreeMap<String, Vec<Contributed<MenuItem>>>,
    panels: Vec<Contributed<Panel>>,
}

impl HostFacade {
    pub fn has_command(&self, id: &str) -> bool {
        self.commands.contains_key(id)
    }

    pub fn command_ids(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn keybinds(&self) -> Vec<&KeyCombo> {
        self.keybinds.iter().map(|k| &k.value.0).collect()
    }

    pub fn snippets(&self) -> Vec<&Snippet> {
        self.snippets.iter().map(|s| &s.value).collect()
    }

    pub fn menu_items(&self, menu: &str) -> Vec<&MenuItem> {
        self.menus
            .get(menu)
            .map(|items| items.iter().map(|i| &i.value).collect())
            .unwrap_or_default()
    }

    pub fn panels(&self) -> Vec<&Panel> {
        self.panels.iter().map(|p| &p.value).collect()
    }

    pub fn panel(&self, id: &str) -> Option<&Panel> {
        self.panels.iter().map(|p| &p.value).find(|p| p.id == id)
    }

    /// The editor is hidden while any full-size panel is open
    pub fn editor_hidden(&self) -> bool {
        self.panels
            .iter()
            .any(|p| p.value.options.position == PanelPosition::Full)
    }

    /// Best snippet for the text before the cursor: longest trigger, then
    /// most recently registered.
    fn matching_snippet(&self, before_cursor: &str, language: &str) -> Option<Snippet> {
        self.snippets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.value.matches(before_cursor, language))
            .max_by_key(|(order, s)| (s.value.trigger.chars().count(), *order))
            .map(|(_, s)| s.value.clone())
    }

    /// Drops everything contributed by extensions
    pub fn clear_extension_contributions(&mut self) {
        self.retain_contributions(|owner| owner.is_none());
    }

    /// Drops what one extension contributed
    pub fn remove_contributions_of(&mut self, extension_id: &str) {
        self.retain_contributions(|owner| owner != Some(extension_id));
    }

    fn retain_contributions(&mut self, keep: impl Fn(Option<&str>) -> bool) {
        self.commands.retain(|_, c| keep(c.owner.as_deref()));
        self.keybinds.retain(|c| keep(c.owner.as_deref()));
        self.snippets.retain(|c| keep(c.owner.as_deref()));
        for items in self.menus.values_mut() {
            items.retain(|c| keep(c.owner.as_deref()));
        }
        self.menus.retain(|_, items| !items.is_empty());
        self.panels.retain(|c| keep(c.owner.as_deref()));
    }
}

impl fmt::Debug for HostFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFacade")
            .field("commands", &self.command_ids())
            .field("keybinds", &self.keybinds())
            .field("snippets", &self.snippets.len())
            .field("menus", &self.menus.keys().collect::<Vec<_>>())
            .field("panels", &self.panels.len())
            .finish()
    }
}

// =============================================================================
// PluginHost surface
// =============================================================================

impl PluginHost {
    pub fn register_command(
        &mut self,
        id: &str,
        f: impl Fn(&mut PluginHost) -> HandlerResult<()> + 'static,
    ) {
        let owner = self.contributor();
        self.facade_mut().commands.insert(
            id.to_string(),
            Contributed {
                owner,
                value: Rc::new(f),
            },
        );
    }

    /// Runs a registered command; `false` when it is unknown or failed
    pub fn execute_command(&mut self, id: &str) -> bool {
        let Some(entry) = self.facade().commands.get(id).cloned() else {
            tracing::debug!("Command '{}' is not registered", id);
            return false;
        };
        let who = entry.owner.clone().unwrap_or_else(|| "host".to_string());
        let hook = entry.value;
        match self.as_contributor(entry.owner.as_deref(), |host| guarded(&who, id, || hook(host))) {
            Ok(()) => true,
            Err(e) => {
                self.services()
                    .notifier
                    .report_failure("Command failed", &e.to_string());
                false
            }
        }
    }

    /// Binds `combo` (e.g. `"ctrl+shift+p"`); a later bind of the same combo
    /// replaces the earlier one.
    pub fn register_keybind(
        &mut self,
        combo: &str,
        f: impl Fn(&mut PluginHost) -> HandlerResult<()> + 'static,
    ) -> CoreResult<KeyCombo> {
        let parsed: KeyCombo = combo.parse().inspect_err(|e| tracing::warn!("{}", e))?;
        let owner = self.contributor();
        let keybinds = &mut self.facade_mut().keybinds;
        keybinds.retain(|k| k.value.0 != parsed);
        keybinds.push(Contributed {
            owner,
            value: (parsed.clone(), Rc::new(f)),
        });
        Ok(parsed)
    }

    /// Runs the keybind for a key press; `true` when one was bound and
    /// completed.
    pub fn dispatch_key(&mut self, pressed: &KeyCombo) -> bool {
        let bound = self
            .facade()
            .keybinds
            .iter()
            .find(|k| k.value.0 == *pressed)
            .map(|k| (k.owner.clone(), k.value.1.clone()));
        let Some((owner, hook)) = bound else {
            return false;
        };

        let who = owner.clone().unwrap_or_else(|| "host".to_string());
        let label = pressed.to_string();
        match self.as_contributor(owner.as_deref(), |host| guarded(&who, &label, || hook(host))) {
            Ok(()) => true,
            Err(e) => {
                self.services().notifier.log_error(&e.to_string());
                false
            }
        }
    }

    pub fn register_snippet(&mut self, trigger: &str, language: &str, expansion: &str) {
        let owner = self.contributor();
        self.facade_mut().snippets.push(Contributed {
            owner,
            value: Snippet {
                trigger: trigger.to_string(),
                language: language.to_string(),
                expansion: expansion.to_string(),
            },
        });
    }

    /// Replaces a trigger that ends right before the cursor with its
    /// expansion; returns the trigger that fired.
    pub fn expand_snippet_at_cursor(&mut self) -> Option<String> {
        let editor = self.services().editor.clone();
        let before = editor.text_before_cursor();
        let snippet = self.facade().matching_snippet(&before, &editor.language())?;
        editor.replace_before_cursor(snippet.trigger.chars().count(), &snippet.expansion);
        tracing::debug!("Expanded snippet '{}'", snippet.trigger);
        Some(snippet.trigger)
    }

    pub fn add_menu_item(&mut self, menu: &str, item: MenuItem) {
        let owner = self.contributor();
        self.facade_mut()
            .menus
            .entry(menu.to_string())
            .or_default()
            .push(Contributed { owner, value: item });
    }

    /// Opens a panel, replacing any panel with the same id
    pub fn create_panel(&mut self, id: &str, html: &str, options: PanelOptions) {
        let owner = self.contributor();
        let panels = &mut self.facade_mut().panels;
        panels.retain(|p| p.value.id != id);
        panels.push(Contributed {
            owner,
            value: Panel {
                id: id.to_string(),
                html: html.to_string(),
                options,
            },
        });
    }

    /// Right-docked panel at the default width
    pub fn show_sidebar(&mut self, id: &str, html: &str) {
        self.create_panel(id, html, PanelOptions::right());
    }

    pub fn remove_panel(&mut self, id: &str) -> bool {
        let panels = &mut self.facade_mut().panels;
        let before = panels.len();
        panels.retain(|p| p.value.id != id);
        before != panels.len()
    }
}
