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

//! Plugin ABI
//!
//! A plugin shared library exports two C symbols, normally generated with
//! [`export_plugin!`](crate::export_plugin):
//!
//! - `patchbay_plugin_abi_version() -> u32`, checked before anything else
//! - `patchbay_plugin_register(*mut PluginRegistrar)`, which adds the
//!   module's node constructors to the registrar
//!
//! Constructors cross the boundary as Rust function pointers, so a plugin
//! must be built with the same compiler and `patchbay` version as the host.
//! [`PLUGIN_ABI_VERSION`] is bumped whenever that contract changes.

use crate::nodes::{is_builtin, NodeConstructor};
use crate::plugin::{PluginError, PluginModule, PluginResult};

/// Plugin ABI version - must match between host and plugin
pub const PLUGIN_ABI_VERSION: u32 = 1;

pub const ABI_VERSION_SYMBOL: &[u8] = b"patchbay_plugin_abi_version\0";
pub const REGISTER_SYMBOL: &[u8] = b"patchbay_plugin_register\0";

pub type AbiVersionFn = extern "C" fn() -> u32;

#[allow(improper_ctypes_definitions)]
pub type RegisterFn = unsafe extern "C" fn(registrar: *mut PluginRegistrar);

/// Collects the node kinds a plugin module provides.
#[derive(Debug)]
pub struct PluginRegistrar {
    module: PluginModule,
    error: Option<PluginError>,
}

impl PluginRegistrar {
    pub fn new(module_path: impl Into<String>) -> Self {
        Self {
            module: PluginModule::new(module_path),
            error: None,
        }
    }

    pub fn module_path(&self) -> &str {
        self.module.path()
    }

    /// Add a node kind. The first invalid registration is kept and
    /// reported by [`PluginRegistrar::into_module`].
    pub fn register_kind(&mut self, kind: &str, constructor: NodeConstructor) -> &mut Self {
        if self.error.is_some() {
            return self;
        }

        if is_builtin(kind) {
            self.error = Some(PluginError::ShadowsBuiltin { kind: kind.to_string() });
        } else if self.module.provides(kind) {
            self.error = Some(PluginError::DuplicateKind {
                kind: kind.to_string(),
                owner: self.module.path().to_string(),
            });
        } else {
            self.module.insert_kind(kind, constructor);
        }
        self
    }

    pub fn into_module(self) -> PluginResult<PluginModule> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.module),
        }
    }
}

/// Generate the C entry points of a plugin library.
///
/// ```ignore
/// fn register(registrar: &mut patchbay::plugin::PluginRegistrar) {
///     registrar.register_kind("tone", ToneNode::build);
/// }
///
/// patchbay::export_plugin!(register);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn patchbay_plugin_abi_version() -> u32 {
            $crate::plugin::PLUGIN_ABI_VERSION
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn patchbay_plugin_register(registrar: *mut $crate::plugin::PluginRegistrar) {
            if let Some(registrar) = registrar.as_mut() {
                $register(registrar);
            }
        }
    };
}
