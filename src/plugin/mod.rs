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

//! Patchbay Plugin System
//!
//! Third-party node kinds come in through two gates, and both must pass
//! before any plugin code runs:
//!
//! - **Namespace**: the plugin's module path must sit under an allowed prefix
//!   ([`policy::DEFAULT_ALLOWED_PREFIXES`])
//! - **Integrity**: a manifest declares the module, the node kinds it may
//!   provide, and a SHA-256 digest of the whole plugin directory, which is
//!   recomputed and compared before the module is resolved
//!
//! Resolved modules live in a [`PluginRegistry`]. Modules are either compiled
//! in and registered at startup, or loaded from a shared library through the
//! C entry points generated by [`export_plugin!`](crate::export_plugin).

pub mod api;
pub mod integrity;
pub mod loader;
pub mod manifest;
pub mod policy;
pub mod registry;

use std::path::PathBuf;

use thiserror::Error;

pub use api::{PluginRegistrar, PLUGIN_ABI_VERSION};
pub use integrity::{hash_directory, verify_plugin_dir};
pub use loader::{library_path, load_plugin_module};
pub use manifest::{HashSpec, PluginManifest};
pub use policy::{TrustPolicy, DEFAULT_ALLOWED_PREFIXES, PLUGIN_ROOT_ENV};
pub use registry::{PluginModule, PluginRegistry};

pub type PluginResult<T> = Result<T, PluginError>;

/// Plugin system error types
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin module '{module}' is not allowed; it must start with one of {allowed:?}")]
    NamespaceNotAllowed { module: String, allowed: Vec<String> },

    #[error("plugin manifest not found: {}", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("failed to read plugin manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid plugin manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("unsupported hash algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("plugin directory not found: {}", path.display())]
    PluginDirNotFound { path: PathBuf },

    #[error("failed to hash plugin directory {}: {reason}", path.display())]
    Hashing { path: PathBuf, reason: String },

    #[error("plugin hash mismatch for '{plugin}'; the plugin directory may have been modified (expected {expected}, computed {actual})")]
    HashMismatch {
        plugin: String,
        expected: String,
        actual: String,
    },

    #[error("kind '{kind}' not allowed by plugin manifest '{plugin}' (allowed: {allowed:?})")]
    KindNotAllowed {
        kind: String,
        plugin: String,
        allowed: Vec<String>,
    },

    #[error("plugin module '{module}' is not registered")]
    ModuleNotFound { module: String },

    #[error("kind '{kind}' not found in plugin module '{module}'")]
    KindNotInModule { kind: String, module: String },

    #[error("plugin node for kind '{kind}' violates the node contract: {reason}")]
    ContractViolation { kind: String, reason: String },

    #[error("plugin module '{module}' was built for ABI version {found}, host expects {expected}")]
    AbiMismatch {
        module: String,
        expected: u32,
        found: u32,
    },

    #[error("plugin module '{module}' is already registered")]
    DuplicateModule { module: String },

    #[error("kind '{kind}' is already provided by plugin module '{owner}'")]
    DuplicateKind { kind: String, owner: String },

    #[error("plugin kind '{kind}' would shadow a built-in kind")]
    ShadowsBuiltin { kind: String },

    #[error("plugin registry is sealed; module '{module}' cannot be registered")]
    RegistrySealed { module: String },

    #[error("failed to load plugin library {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}
