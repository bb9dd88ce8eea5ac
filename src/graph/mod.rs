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

//! Routing graph description and the engine that executes it.

pub mod engine;
pub mod topology;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parameters::NodeParams;
use crate::processing::NodeCategory;

pub use engine::GraphEngine;
pub use topology::execution_order;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_FRAME_LENGTH: usize = 1024;
pub const DEFAULT_CHANNELS: usize = 2;
pub const DEFAULT_NODE_KIND: &str = "passthrough";

/// A directed edge `from -> to` between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Layout position, for visualization only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PositionRepr")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// `{x, y}` or `[x, y]`
#[derive(Deserialize)]
#[serde(untagged)]
enum PositionRepr {
    Map { x: f64, y: f64 },
    Pair([f64; 2]),
}

impl From<PositionRepr> for Position {
    fn from(repr: PositionRepr) -> Self {
        match repr {
            PositionRepr::Map { x, y } => Position { x, y },
            PositionRepr::Pair([x, y]) => Position { x, y },
        }
    }
}

fn default_kind() -> String {
    DEFAULT_NODE_KIND.to_string()
}

/// ノード定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub params: NodeParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Plugin manifest for non-built-in kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            params: NodeParams::new(),
            position: None,
            manifest: None,
        }
    }

    pub fn with_params(mut self, params: NodeParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_manifest(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_frame_length() -> usize {
    DEFAULT_FRAME_LENGTH
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

/// ルーティング定義
///
/// Already-parsed input to [`GraphEngine`]. Node order is significant: it
/// seeds the execution order among independent nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSpec {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(rename = "frame_size", alias = "frame_length", default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_channels")]
    pub default_channels: usize,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Default for RoutingSpec {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_FRAME_LENGTH)
    }
}

impl RoutingSpec {
    pub fn new(sample_rate: u32, frame_length: usize) -> Self {
        Self {
            sample_rate,
            frame_length,
            default_channels: DEFAULT_CHANNELS,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn with_default_channels(mut self, channels: usize) -> Self {
        self.default_channels = channels;
        self
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connections.push(Connection::new(from, to));
        self
    }
}

/// Serializable snapshot of one node for UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeState {
    pub id: String,
    pub kind: String,
    pub category: NodeCategory,
    pub channels: usize,
    pub position: Position,
}

/// Serializable snapshot of the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphState {
    pub nodes: Vec<NodeState>,
    pub connections: Vec<Connection>,
    pub execution_order: Vec<String>,
    pub layout_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_spec_defaults() {
        let spec: RoutingSpec = serde_yaml::from_str("nodes:\n  - id: a\n").unwrap();
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.frame_length, 1024);
        assert_eq!(spec.default_channels, 2);
        assert_eq!(spec.nodes[0].kind, "passthrough");
        assert!(spec.connections.is_empty());
    }

    #[test]
    fn test_frame_length_aliases() {
        let a: RoutingSpec = serde_yaml::from_str("frame_size: 256\n").unwrap();
        let b: RoutingSpec = serde_yaml::from_str("frame_length: 512\n").unwrap();
        assert_eq!(a.frame_length, 256);
        assert_eq!(b.frame_length, 512);
    }

    #[test]
    fn test_position_forms() {
        let map: Position = serde_yaml::from_str("{x: 1.5, y: -2}").unwrap();
        let pair: Position = serde_yaml::from_str("[3, 4.25]").unwrap();
        assert_eq!(map, Position::new(1.5, -2.0));
        assert_eq!(pair, Position::new(3.0, 4.25));
    }

    #[test]
    fn test_node_spec_builder() {
        let node = NodeSpec::new("amp", "gain")
            .with_params(NodeParams::new().with("gain_db", -3.0))
            .with_position(Position::new(10.0, 20.0));
        assert_eq!(node.params.f32_or("gain_db", 0.0).unwrap(), -3.0);
        assert_eq!(node.position, Some(Position::new(10.0, 20.0)));
        assert!(node.manifest.is_none());
    }
}
