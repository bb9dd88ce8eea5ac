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

//! Routing file loading.
//!
//! ```yaml
//! sample_rate: 48000
//! frame_size: 1024
//! nodes:
//!   - id: osc
//!     kind: sine
//!     params: { frequency_hz: 440, amplitude: 0.2 }
//!     position: [0, 0]
//!   - id: amp
//!     kind: gain
//!     params: { gain_db: -3 }
//! connections:
//!   - { from: osc, to: amp }
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::graph::RoutingSpec;

/// 設定の読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read routing file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse routing spec: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },
}

impl RoutingSpec {
    /// Parse a routing spec from YAML text. Paths are kept as written.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse { source })
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|source| ConfigError::Parse { source })
    }
}

/// Load a routing file.
///
/// Relative `manifest` paths and relative `file_path` parameters of
/// `audio_file` nodes are resolved against the routing file's directory.
pub fn load_routing_file<P: AsRef<Path>>(path: P) -> Result<RoutingSpec, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut spec = RoutingSpec::from_yaml_str(&content)?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for node in &mut spec.nodes {
        if let Some(manifest) = node.manifest.as_mut() {
            if manifest.is_relative() {
                *manifest = base.join(&*manifest);
            }
        }

        if node.kind.eq_ignore_ascii_case("audio_file") {
            if let Ok(Some(file_path)) = node.params.text("file_path") {
                let file_path = PathBuf::from(file_path);
                if file_path.is_relative() {
                    node.params
                        .insert("file_path", base.join(file_path).to_string_lossy().into_owned());
                }
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        nodes = spec.nodes.len(),
        connections = spec.connections.len(),
        "routing file loaded"
    );
    Ok(spec)
}
