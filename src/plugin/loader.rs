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

//! Plugin Loader - resolve a plugin module from its shared library.
//!
//! Loading happens only after the trust policy has admitted the manifest.
//! Loaded libraries are never unloaded: node constructors and the vtables
//! of the nodes they build point into them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use lazy_static::lazy_static;
use libloading::{Library, Symbol};

use crate::plugin::api::{AbiVersionFn, RegisterFn, ABI_VERSION_SYMBOL, PLUGIN_ABI_VERSION, REGISTER_SYMBOL};
use crate::plugin::{PluginError, PluginModule, PluginRegistrar, PluginResult};

lazy_static! {
    static ref LOADED_LIBRARIES: Mutex<Vec<Library>> = Mutex::new(Vec::new());
}

/// Platform library path for `module` inside `plugin_dir`.
///
/// `patchbay_plugins.tone_pack` maps to `libpatchbay_plugins_tone_pack.so`
/// on Linux, `.dylib` on macOS and `patchbay_plugins_tone_pack.dll` on Windows.
pub fn library_path(plugin_dir: &Path, module: &str) -> PathBuf {
    plugin_dir.join(libloading::library_filename(module.replace('.', "_")))
}

/// Load the shared library for `module` and collect its node kinds.
pub fn load_plugin_module(plugin_dir: &Path, module: &str) -> PluginResult<PluginModule> {
    let path = library_path(plugin_dir, module);
    // The digest only covers regular files, so the library must be one too.
    let reason = match fs::symlink_metadata(&path) {
        Ok(metadata) if metadata.file_type().is_file() => None,
        Ok(_) => Some("library is not a regular file"),
        Err(_) => Some("library file not found"),
    };
    if let Some(reason) = reason {
        return Err(PluginError::Load {
            path,
            reason: reason.to_string(),
        });
    }

    let load_error = |reason: String| PluginError::Load {
        path: path.clone(),
        reason,
    };

    let library = unsafe { Library::new(&path) }.map_err(|e| load_error(e.to_string()))?;

    let found = {
        let abi_version: Symbol<AbiVersionFn> = unsafe { library.get(ABI_VERSION_SYMBOL) }
            .map_err(|e| load_error(format!("missing ABI version entry point: {}", e)))?;
        abi_version()
    };
    if found != PLUGIN_ABI_VERSION {
        return Err(PluginError::AbiMismatch {
            module: module.to_string(),
            expected: PLUGIN_ABI_VERSION,
            found,
        });
    }

    let mut registrar = PluginRegistrar::new(module);
    {
        let register: Symbol<RegisterFn> = unsafe { library.get(REGISTER_SYMBOL) }
            .map_err(|e| load_error(format!("missing register entry point: {}", e)))?;
        unsafe { register(&mut registrar) };
    }
    let plugin_module = registrar.into_module()?;

    tracing::info!(
        module,
        library = %path.display(),
        kinds = ?plugin_module.kinds().collect::<Vec<_>>(),
        "plugin library loaded"
    );

    LOADED_LIBRARIES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(library);

    Ok(plugin_module)
}
