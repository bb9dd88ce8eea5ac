/*
 * Patchbay - Audio Signal Routing Simulator
 * Copyright (c) 2025 MACHIKO LAB
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! In-process table of resolved plugin modules.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use lazy_static::lazy_static;

use crate::nodes::{is_builtin, NodeConstructor};
use crate::plugin::{PluginError, PluginResult};

/// A plugin module: a dotted path and the node kinds it provides.
#[derive(Debug, Clone)]
pub struct PluginModule {
    path: String,
    kinds: BTreeMap<String, NodeConstructor>,
}

impl PluginModule {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kinds: BTreeMap::new(),
        }
    }

    /// Add a kind. Kind names are stored lowercased; a repeated name replaces the earlier one.
    pub fn with_kind(mut self, kind: &str, constructor: NodeConstructor) -> Self {
        self.insert_kind(kind, constructor);
        self
    }

    pub(crate) fn insert_kind(&mut self, kind: &str, constructor: NodeConstructor) -> Option<NodeConstructor> {
        self.kinds.insert(kind.to_lowercase(), constructor)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn provides(&self, kind: &str) -> bool {
        self.kinds.contains_key(&kind.to_lowercase())
    }

    pub fn constructor(&self, kind: &str) -> Option<NodeConstructor> {
        self.kinds.get(&kind.to_lowercase()).copied()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    modules: BTreeMap<String, PluginModule>,
    sealed: bool,
}

/// プラグインレジストリ
///
/// Modules are registered once and never replaced. Once sealed, the
/// registry rejects new modules, which pins the set of code the factory
/// can reach.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: PluginRegistry = PluginRegistry::new();
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by [`crate::factory::NodeFactory::new`].
    pub fn global() -> &'static PluginRegistry {
        &GLOBAL_REGISTRY
    }

    pub fn register(&self, module: PluginModule) -> PluginResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.sealed {
            return Err(PluginError::RegistrySealed {
                module: module.path.clone(),
            });
        }
        if state.modules.contains_key(&module.path) {
            return Err(PluginError::DuplicateModule {
                module: module.path.clone(),
            });
        }
        if let Some(kind) = module.kinds().find(|kind| is_builtin(kind)) {
            return Err(PluginError::ShadowsBuiltin { kind: kind.to_string() });
        }
        for kind in module.kinds() {
            if let Some(owner) = state.modules.values().find(|m| m.provides(kind)) {
                return Err(PluginError::DuplicateKind {
                    kind: kind.to_string(),
                    owner: owner.path.clone(),
                });
            }
        }

        tracing::debug!(
            module = %module.path,
            kinds = ?module.kinds().collect::<Vec<_>>(),
            "plugin module registered"
        );
        state.modules.insert(module.path.clone(), module);
        Ok(())
    }

    /// Reject all further registrations.
    pub fn seal(&self) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).sealed
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .modules
            .contains_key(module)
    }

    /// Resolve `kind` inside `module`.
    pub fn constructor(&self, module: &str, kind: &str) -> PluginResult<NodeConstructor> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let entry = state.modules.get(module).ok_or_else(|| PluginError::ModuleNotFound {
            module: module.to_string(),
        })?;
        entry.constructor(kind).ok_or_else(|| PluginError::KindNotInModule {
            kind: kind.to_string(),
            module: module.to_string(),
        })
    }

    /// Registered module paths with their kinds, in path order.
    pub fn modules(&self) -> Vec<(String, Vec<String>)> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .modules
            .values()
            .map(|m| (m.path.clone(), m.kinds().map(str::to_string).collect()))
            .collect()
    }
}
