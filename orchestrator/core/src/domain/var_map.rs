// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Layered Variable Maps
//!
//! Each role carries its own `VarMap` layers (defaults, vars, user vars,
//! locals). A `LayeredVarMap` is a borrowed view over one role's layer and
//! the corresponding layers of all its ancestors: reads fall through from
//! the innermost layer outwards, writes only ever touch a role's own layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Hierarchical string-keyed variable storage with parent fallthrough

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single layer of string variables owned by one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarMap(BTreeMap<String, String>);

impl VarMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Direct access to this layer's entries, without fallthrough.
    pub fn raw(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn raw_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.0
    }

    /// Copy every entry of `other` into this layer, overriding existing keys.
    pub fn extend_from(&mut self, other: &VarMap) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl From<BTreeMap<String, String>> for VarMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VarMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Read-only fallthrough view over a chain of layers.
///
/// `layers[0]` is the innermost (own) layer; the last entry is the
/// outermost ancestor layer.
#[derive(Debug, Clone, Default)]
pub struct LayeredVarMap<'a> {
    layers: Vec<&'a VarMap>,
}

impl<'a> LayeredVarMap<'a> {
    pub fn new(own: &'a VarMap) -> Self {
        Self { layers: vec![own] }
    }

    /// Build a view from layers ordered innermost first.
    pub fn from_layers<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a VarMap>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Place `parent` beneath every layer already in this view.
    pub fn wrap(mut self, parent: &'a VarMap) -> Self {
        self.layers.push(parent);
        self
    }

    /// Own layer, if any.
    pub fn own(&self) -> Option<&'a VarMap> {
        self.layers.first().copied()
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.layers.iter().any(|layer| layer.contains_key(key))
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// All keys visible through this view, inner definitions winning.
    pub fn flattened(&self) -> BTreeMap<String, String> {
        Self::flatten(&self.layers)
    }

    /// Everything visible from the parent, i.e. the view without its own
    /// layer.
    pub fn flattened_parent(&self) -> BTreeMap<String, String> {
        match self.layers.split_first() {
            Some((_, parents)) => Self::flatten(parents),
            None => BTreeMap::new(),
        }
    }

    fn flatten(layers: &[&VarMap]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for layer in layers.iter().rev() {
            for (k, v) in layer.iter() {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}
