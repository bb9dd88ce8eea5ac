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

//! Plugin Manifest
//!
//! On-disk descriptor of a plugin package, YAML by default, TOML when the
//! file ends in `.toml`:
//!
//! ```yaml
//! name: tone_pack
//! version: "1.0.0"
//! module: patchbay_plugins.tone_pack
//! hash:
//!   algorithm: sha256
//!   value: <hex digest of the plugin directory>
//! allowed_node_kinds:
//!   - tone
//! ```

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::{PluginError, PluginResult};

/// Hash algorithms a manifest may declare.
pub const SUPPORTED_ALGORITHMS: &[&str] = &["sha256"];

/// Shortest digest string accepted as plausible.
pub const MIN_DIGEST_LEN: usize = 32;

/// Declared digest of the plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSpec {
    pub algorithm: String,
    pub value: String,
}

/// Plugin package manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    /// Dotted implementation path, e.g. `patchbay_plugins.tone_pack`.
    pub module: String,
    pub hash: HashSpec,
    pub allowed_node_kinds: Vec<String>,
}

/// Loosely typed shape, so `version: 1.0` and similar scalars are accepted.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<Value>,
    version: Option<Value>,
    module: Option<Value>,
    hash: Option<RawHash>,
    #[serde(default)]
    allowed_node_kinds: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawHash {
    algorithm: Option<Value>,
    value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestFormat {
    Yaml,
    Toml,
}

impl PluginManifest {
    /// Load and validate a manifest file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PluginResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PluginError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| PluginError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            Self::load_from_toml_str(&content)
        } else {
            Self::load_from_str(&content)
        }
    }

    /// Parse and validate a YAML manifest.
    pub fn load_from_str(content: &str) -> PluginResult<Self> {
        Self::parse(content, ManifestFormat::Yaml)
    }

    /// Parse and validate a TOML manifest.
    pub fn load_from_toml_str(content: &str) -> PluginResult<Self> {
        Self::parse(content, ManifestFormat::Toml)
    }

    fn parse(content: &str, format: ManifestFormat) -> PluginResult<Self> {
        let raw: RawManifest = match format {
            ManifestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| invalid(format!("invalid manifest structure: {}", e)))?,
            ManifestFormat::Toml => toml::from_str(content).map_err(|e| invalid(format!("invalid manifest structure: {}", e)))?,
        };

        let hash = raw
            .hash
            .ok_or_else(|| invalid("manifest missing required 'hash' field"))?;

        let manifest = Self {
            name: required_scalar(raw.name, "name")?,
            version: required_scalar(raw.version, "version")?,
            module: required_scalar(raw.module, "module")?,
            hash: HashSpec {
                algorithm: required_scalar(hash.algorithm, "hash.algorithm")?.to_lowercase(),
                value: required_scalar(hash.value, "hash.value")?,
            },
            allowed_node_kinds: raw
                .allowed_node_kinds
                .into_iter()
                .map(|kind| scalar(&kind).map(|k| k.to_lowercase()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("'allowed_node_kinds' must be a list of strings"))?,
        };

        manifest.validate()?;
        Ok(manifest)
    }

    /// 構造検証
    pub fn validate(&self) -> PluginResult<()> {
        if self.name.is_empty() {
            return Err(invalid("manifest 'name' cannot be empty"));
        }
        if !is_plain_dir_name(&self.name) {
            return Err(invalid(format!(
                "manifest 'name' must be a single directory name, got '{}'",
                self.name
            )));
        }
        if self.version.is_empty() {
            return Err(invalid("manifest 'version' cannot be empty"));
        }
        if !self.module.contains('.') {
            return Err(invalid(format!(
                "manifest 'module' must be a fully qualified module path, got '{}'",
                self.module
            )));
        }
        if !SUPPORTED_ALGORITHMS.contains(&self.hash.algorithm.as_str()) {
            return Err(PluginError::UnsupportedAlgorithm {
                algorithm: self.hash.algorithm.clone(),
            });
        }
        if self.hash.value.len() < MIN_DIGEST_LEN {
            return Err(invalid("manifest 'hash.value' appears invalid (too short)"));
        }
        if self.allowed_node_kinds.is_empty() {
            return Err(invalid("manifest must declare at least one of allowed_node_kinds"));
        }
        Ok(())
    }

    pub fn allows_kind(&self, kind: &str) -> bool {
        let kind = kind.to_lowercase();
        self.allowed_node_kinds.iter().any(|k| *k == kind)
    }

    /// Pretty JSON rendering, for logs and the CLI.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// The name becomes `<plugin_root>/<name>`, so it must not leave the root.
fn is_plain_dir_name(name: &str) -> bool {
    if name.contains(['/', '\\']) || name.contains("..") {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn invalid(reason: impl Into<String>) -> PluginError {
    PluginError::InvalidManifest {
        reason: reason.into(),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_scalar(value: Option<Value>, field: &str) -> PluginResult<String> {
    match value {
        None | Some(Value::Null) => Err(invalid(format!("manifest missing required '{}' field", field))),
        Some(v) => scalar(&v).ok_or_else(|| invalid(format!("manifest field '{}' must be a scalar", field))),
    }
}
