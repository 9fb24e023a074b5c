//! Root style scope
//!
//! Models the document root's custom properties: stylesheet base values plus
//! one injection layer per theme source. Important declarations beat normal
//! ones; within the same importance the normal-theme layer beats the
//! UI-layout layer, which beats the base.

use std::collections::{BTreeMap, BTreeSet};

use super::css::Declaration;

/// Injection point for theme declarations, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StyleLayer {
    UiLayout,
    Normal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootStyle {
    base: BTreeMap<String, String>,
    layers: BTreeMap<StyleLayer, BTreeMap<String, Declaration>>,
}

impl RootStyle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in stylesheet values
    pub fn with_base<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            base: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn set_base(&mut self, name: &str, value: &str) {
        self.base.insert(name.to_string(), value.to_string());
    }

    pub fn set(&mut self, layer: StyleLayer, declaration: Declaration) {
        self.layers
            .entry(layer)
            .or_default()
            .insert(declaration.name.clone(), declaration);
    }

    pub fn remove(&mut self, layer: StyleLayer, name: &str) -> bool {
        self.layers
            .get_mut(&layer)
            .is_some_and(|decls| decls.remove(name).is_some())
    }

    pub fn layer_len(&self, layer: StyleLayer) -> usize {
        self.layers.get(&layer).map_or(0, BTreeMap::len)
    }

    /// Highest-layer declaration of `name` with the given importance
    fn declared(&self, name: &str, important: bool) -> Option<&str> {
        self.layers
            .values()
            .rev()
            .filter_map(|decls| decls.get(name))
            .find(|d| d.important == important)
            .map(|d| d.value.as_str())
    }

    /// Effective value of `name`
    pub fn computed(&self, name: &str) -> Option<&str> {
        self.declared(name, true)
            .or_else(|| self.declared(name, false))
            .or_else(|| self.base.get(name).map(String::as_str))
    }

    /// Effective values of every property known to any layer
    pub fn computed_all(&self) -> BTreeMap<String, String> {
        let names: BTreeSet<&String> = self
            .base
            .keys()
            .chain(self.layers.values().flat_map(|decls| decls.keys()))
            .collect();
        names
            .into_iter()
            .filter_map(|name| self.computed(name).map(|v| (name.clone(), v.to_string())))
            .collect()
    }
}
