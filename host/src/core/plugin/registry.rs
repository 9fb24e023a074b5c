//! Extension Registry
//!
//! Registered extensions in registration order plus the toolbar buttons they
//! contributed. Ids are unique; re-registering an id replaces the entry in
//! place and supersedes the buttons it contributed before.

use serde::Serialize;

use super::hooks::ExtensionHandlers;
use super::manifest::{file_extension_of, matches_file_type, ExtensionManifest, UiButton};

/// One registered extension
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub manifest: ExtensionManifest,
    pub handlers: ExtensionHandlers,
}

/// A toolbar button tagged with the extension that declared it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiButtonDescriptor {
    pub icon: String,
    pub label: String,
    pub action: String,
    pub file_types: Vec<String>,
    pub owner_extension_id: String,
}

impl UiButtonDescriptor {
    fn from_button(button: &UiButton, owner: &str) -> Self {
        Self {
            icon: button.icon.clone(),
            label: button.label.clone(),
            action: button.action.clone(),
            file_types: button.file_types.clone(),
            owner_extension_id: owner.to_string(),
        }
    }

    pub fn applies_to(&self, ext: &str) -> bool {
        self.file_types.is_empty() || matches_file_type(&self.file_types, ext)
    }
}

/// Summary row for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub priority: i32,
    pub file_types: Vec<String>,
    pub buttons: usize,
}

#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: Vec<RegistryEntry>,
    buttons: Vec<UiButtonDescriptor>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entry; returns `true` when it replaced an existing id.
    pub fn insert(&mut self, manifest: ExtensionManifest, handlers: ExtensionHandlers) -> bool {
        let id = manifest.id.clone();
        self.buttons.retain(|b| b.owner_extension_id != id);
        self.buttons.extend(
            manifest
                .ui_buttons
                .iter()
                .map(|button| UiButtonDescriptor::from_button(button, &id)),
        );

        let entry = RegistryEntry { manifest, handlers };
        match self.entries.iter_mut().find(|e| e.manifest.id == id) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.entries.push(entry);
                false
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.manifest.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RegistryEntry> {
        self.entries.iter_mut().find(|e| e.manifest.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Registration order, stably sorted by descending priority
    pub fn dispatch_order(&self) -> Vec<&RegistryEntry> {
        let mut ordered: Vec<&RegistryEntry> = self.entries.iter().collect();
        ordered.sort_by(|a, b| b.manifest.priority.cmp(&a.manifest.priority));
        ordered
    }

    pub fn buttons(&self) -> &[UiButtonDescriptor] {
        &self.buttons
    }

    /// Buttons to show while `path` is the active file
    pub fn buttons_for_file(&self, path: &str) -> Vec<&UiButtonDescriptor> {
        let ext = file_extension_of(path);
        self.buttons.iter().filter(|b| b.applies_to(&ext)).collect()
    }

    /// Extensions declaring the file's type, in dispatch order
    pub fn claimants_of(&self, path: &str) -> Vec<&RegistryEntry> {
        let ext = file_extension_of(path);
        self.dispatch_order()
            .into_iter()
            .filter(|e| e.manifest.claims_file_type(&ext))
            .collect()
    }

    pub fn infos(&self) -> Vec<ExtensionInfo> {
        self.entries
            .iter()
            .map(|e| ExtensionInfo {
                id: e.manifest.id.clone(),
                name: e.manifest.name.clone(),
                version: e.manifest.version.clone(),
                description: e.manifest.description.clone(),
                priority: e.manifest.priority,
                file_types: e.manifest.file_types.clone(),
                buttons: self
                    .buttons
                    .iter()
                    .filter(|b| b.owner_extension_id == e.manifest.id)
                    .count(),
            })
            .collect()
    }

    /// Removes an entry and its buttons; returns whether it was present
    pub fn remove(&mut self, id: &str) -> bool {
        self.buttons.retain(|b| b.owner_extension_id != id);
        let before = self.entries.len();
        self.entries.retain(|e| e.manifest.id != id);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buttons.clear();
    }
}
