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

//! Trust policy applied before any plugin module is resolved.

use std::path::{Path, PathBuf};

use crate::plugin::{verify_plugin_dir, PluginError, PluginManifest, PluginResult};

/// Module path prefixes plugins must live under.
pub const DEFAULT_ALLOWED_PREFIXES: &[&str] = &["patchbay_plugins"];

/// Environment variable overriding the plugin root directory.
pub const PLUGIN_ROOT_ENV: &str = "PATCHBAY_PLUGIN_ROOT";

/// Plugin root used when [`PLUGIN_ROOT_ENV`] is unset.
pub const DEFAULT_PLUGIN_ROOT: &str = "plugins";

/// プラグイン信頼ポリシー
///
/// Plugin packages are expected at `<plugin_root>/<manifest name>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    plugin_root: PathBuf,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PLUGIN_ROOT)
    }
}

impl TrustPolicy {
    pub fn new<P: Into<PathBuf>>(plugin_root: P) -> Self {
        Self {
            plugin_root: plugin_root.into(),
        }
    }

    /// Policy rooted at `$PATCHBAY_PLUGIN_ROOT`, or `plugins` when unset.
    pub fn from_env() -> Self {
        match std::env::var_os(PLUGIN_ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::default(),
        }
    }

    pub fn plugin_root(&self) -> &Path {
        &self.plugin_root
    }

    pub fn allowed_prefixes(&self) -> Vec<String> {
        DEFAULT_ALLOWED_PREFIXES.iter().map(|p| p.to_string()).collect()
    }

    /// Namespace gate: `module` must equal an allowed prefix or sit below one.
    pub fn check_namespace(&self, module: &str) -> PluginResult<()> {
        let allowed = DEFAULT_ALLOWED_PREFIXES.iter().any(|prefix| {
            module == *prefix
                || module
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with('.'))
                    .unwrap_or(false)
        });

        if allowed {
            Ok(())
        } else {
            Err(PluginError::NamespaceNotAllowed {
                module: module.to_string(),
                allowed: self.allowed_prefixes(),
            })
        }
    }

    pub fn plugin_dir(&self, manifest: &PluginManifest) -> PathBuf {
        self.plugin_root.join(&manifest.name)
    }

    /// Load a manifest and run both gates against it.
    ///
    /// Nothing from the plugin package is executed here; the returned
    /// manifest has passed validation, the namespace check and the
    /// directory digest comparison.
    pub fn admit<P: AsRef<Path>>(&self, manifest_path: P) -> PluginResult<PluginManifest> {
        let manifest_path = manifest_path.as_ref();
        let manifest = PluginManifest::load_from_file(manifest_path)?;

        self.check_namespace(&manifest.module)?;

        let plugin_dir = self.plugin_dir(&manifest);
        match verify_plugin_dir(&manifest, &plugin_dir) {
            Ok(digest) => {
                tracing::info!(
                    plugin = %manifest.name,
                    version = %manifest.version,
                    module = %manifest.module,
                    digest = %digest,
                    "plugin integrity verified"
                );
                Ok(manifest)
            }
            Err(err) => {
                tracing::warn!(
                    plugin = %manifest.name,
                    manifest = %manifest_path.display(),
                    error = %err,
                    "plugin rejected"
                );
                Err(err)
            }
        }
    }
}
