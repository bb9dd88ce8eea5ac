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

use std::collections::{HashMap, HashSet};

use crate::errors::{EngineError, EngineResult};
use crate::factory::{FactoryError, NodeFactory};
use crate::frame::AudioFrame;
use crate::graph::{execution_order, Connection, GraphState, NodeState, Position, RoutingSpec};
use crate::nodes::FileInfo;
use crate::processing::{AudioNode, NodeContext, ProcessingError};

/// Per-node outputs of one block, keyed by node id.
pub type BlockOutputs = HashMap<String, AudioFrame>;

/// ルーティンググラフ実行エンジン
///
/// Built once from a [`RoutingSpec`]; the topology is fixed for the engine's
/// lifetime. Nodes run one at a time in execution order, and every node sees
/// only the outputs its upstream nodes produced in the same block.
pub struct GraphEngine {
    sample_rate: u32,
    frame_length: usize,
    nodes: HashMap<String, Box<dyn AudioNode>>,
    // declaration order
    node_ids: Vec<String>,
    connections: Vec<Connection>,
    execution_order: Vec<String>,
    // destination -> sources, in connection order
    sources: HashMap<String, Vec<String>>,
    positions: HashMap<String, Position>,
    layout_version: u64,
}

impl GraphEngine {
    /// Build with the process-wide plugin registry and the environment's trust policy.
    pub fn new(spec: &RoutingSpec) -> EngineResult<Self> {
        Self::with_factory(spec, &NodeFactory::default())
    }

    pub fn with_factory(spec: &RoutingSpec, factory: &NodeFactory<'_>) -> EngineResult<Self> {
        validate_settings(spec)?;

        let mut nodes: HashMap<String, Box<dyn AudioNode>> = HashMap::with_capacity(spec.nodes.len());
        let mut node_ids = Vec::with_capacity(spec.nodes.len());
        let mut positions = HashMap::new();

        for node_spec in &spec.nodes {
            if nodes.contains_key(&node_spec.id) {
                return Err(EngineError::DuplicateNodeId {
                    node_id: node_spec.id.clone(),
                });
            }

            let kind = node_spec.kind.to_lowercase();
            let channels = node_spec
                .params
                .usize_or("channels", spec.default_channels)
                .map_err(|e| EngineError::NodeCreation {
                    node_id: node_spec.id.clone(),
                    kind: kind.clone(),
                    source: FactoryError::Parameter(e),
                })?;
            if channels == 0 {
                return Err(EngineError::InvalidChannels {
                    node_id: node_spec.id.clone(),
                    reason: "channel count must be at least 1".to_string(),
                });
            }

            let ctx = NodeContext::new(node_spec.id.clone(), kind.clone(), spec.sample_rate, channels);
            let node = factory
                .create(&ctx, &node_spec.params, node_spec.manifest.as_deref())
                .map_err(|source| EngineError::NodeCreation {
                    node_id: node_spec.id.clone(),
                    kind,
                    source,
                })?;

            if let Some(position) = node_spec.position {
                positions.insert(node_spec.id.clone(), position);
            }
            node_ids.push(node_spec.id.clone());
            nodes.insert(node_spec.id.clone(), node);
        }

        for connection in &spec.connections {
            for endpoint in [&connection.from, &connection.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(EngineError::UnknownConnectionEndpoint {
                        from: connection.from.clone(),
                        to: connection.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        let execution_order = execution_order(&node_ids, &spec.connections)?;

        let mut sources: HashMap<String, Vec<String>> = HashMap::new();
        for connection in &spec.connections {
            sources
                .entry(connection.to.clone())
                .or_default()
                .push(connection.from.clone());
        }

        tracing::info!(
            nodes = node_ids.len(),
            connections = spec.connections.len(),
            sample_rate = spec.sample_rate,
            frame_length = spec.frame_length,
            "routing graph built"
        );
        tracing::debug!(order = ?execution_order, "execution order");

        Ok(Self {
            sample_rate: spec.sample_rate,
            frame_length: spec.frame_length,
            nodes,
            node_ids,
            connections: spec.connections.clone(),
            execution_order,
            sources,
            positions,
            layout_version: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Start time of block `block_index`, in seconds.
    pub fn block_timestamp(&self, block_index: u64) -> f64 {
        block_index as f64 * self.frame_length as f64 / self.sample_rate as f64
    }

    /// 1ブロック処理
    ///
    /// Runs every node once and returns all outputs of the block. A node
    /// returning a frame of the wrong shape fails the block.
    pub fn process_block(&mut self, block_index: u64) -> EngineResult<BlockOutputs> {
        let timestamp = self.block_timestamp(block_index);
        let frame_length = self.frame_length;
        let mut outputs: BlockOutputs = HashMap::with_capacity(self.nodes.len());

        for id in &self.execution_order {
            let node = self
                .nodes
                .get_mut(id)
                .ok_or_else(|| EngineError::NodeNotFound { node_id: id.clone() })?;

            let inputs: Vec<&AudioFrame> = self
                .sources
                .get(id)
                .map(|sources| sources.iter().filter_map(|s| outputs.get(s)).collect())
                .unwrap_or_default();

            let processing_error = |source: ProcessingError| EngineError::Processing {
                node_id: id.clone(),
                block_index,
                source,
            };

            let frame = node
                .process(frame_length, timestamp, &inputs)
                .map_err(processing_error)?;

            let expected = (frame_length, node.node_info().channels);
            if frame.shape() != expected {
                return Err(processing_error(ProcessingError::ShapeMismatch {
                    expected,
                    found: frame.shape(),
                }));
            }

            outputs.insert(id.clone(), frame);
        }

        Ok(outputs)
    }

    /// Run `num_blocks` consecutive blocks starting at block 0.
    ///
    /// With `track`, only the listed nodes' outputs are kept per block.
    pub fn run(&mut self, num_blocks: u64, track: Option<&[&str]>) -> EngineResult<Vec<BlockOutputs>> {
        let tracked = self.tracked_ids(track)?;

        let mut blocks = Vec::new();
        for block_index in 0..num_blocks {
            let mut outputs = self.process_block(block_index)?;
            if let Some(tracked) = &tracked {
                outputs.retain(|id, _| tracked.contains(id.as_str()));
            }
            blocks.push(outputs);
        }
        Ok(blocks)
    }

    /// Run `num_blocks` blocks and keep only the last block's outputs.
    ///
    /// Memory stays at one block regardless of `num_blocks`. Returns `None`
    /// when no block was processed.
    pub fn run_last(&mut self, num_blocks: u64, track: Option<&[&str]>) -> EngineResult<Option<BlockOutputs>> {
        let tracked = self.tracked_ids(track)?;

        let mut last = None;
        for block_index in 0..num_blocks {
            let mut outputs = self.process_block(block_index)?;
            if let Some(tracked) = &tracked {
                outputs.retain(|id, _| tracked.contains(id.as_str()));
            }
            last = Some(outputs);
        }
        Ok(last)
    }

    fn tracked_ids<'a>(&self, track: Option<&[&'a str]>) -> EngineResult<Option<HashSet<&'a str>>> {
        let Some(ids) = track else {
            return Ok(None);
        };
        if let Some(unknown) = ids.iter().find(|id| !self.nodes.contains_key(**id)) {
            return Err(EngineError::NodeNotFound {
                node_id: unknown.to_string(),
            });
        }
        Ok(Some(ids.iter().copied().collect()))
    }

    /// Node ids in declaration order.
    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn node(&self, id: &str) -> Option<&dyn AudioNode> {
        self.nodes.get(id).map(|node| node.as_ref())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Playback metadata of a file-backed node.
    pub fn file_info(&self, id: &str) -> Option<FileInfo> {
        self.nodes.get(id).and_then(|node| node.file_info())
    }

    /// Move a node. Returns the new layout version.
    pub fn set_node_position(&mut self, id: &str, position: Position) -> EngineResult<u64> {
        if !self.nodes.contains_key(id) {
            return Err(EngineError::NodeNotFound { node_id: id.to_string() });
        }
        self.positions.insert(id.to_string(), position);
        self.layout_version += 1;
        Ok(self.layout_version)
    }

    /// Layout position of a node; `(0, 0)` when never set.
    pub fn node_position(&self, id: &str) -> Position {
        self.positions.get(id).copied().unwrap_or_default()
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    pub fn graph_state(&self) -> GraphState {
        let nodes = self
            .node_ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|node| (id, node.node_info())))
            .map(|(id, info)| NodeState {
                id: id.clone(),
                kind: info.kind.clone(),
                category: info.category,
                channels: info.channels,
                position: self.node_position(id),
            })
            .collect();

        GraphState {
            nodes,
            connections: self.connections.clone(),
            execution_order: self.execution_order.clone(),
            layout_version: self.layout_version,
        }
    }
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("sample_rate", &self.sample_rate)
            .field("frame_length", &self.frame_length)
            .field("execution_order", &self.execution_order)
            .field("connections", &self.connections)
            .finish()
    }
}

fn validate_settings(spec: &RoutingSpec) -> EngineResult<()> {
    let reason = if spec.sample_rate == 0 {
        "sample_rate must be positive"
    } else if spec.frame_length == 0 {
        "frame_size must be positive"
    } else if spec.default_channels == 0 {
        "default_channels must be at least 1"
    } else {
        return Ok(());
    };
    Err(EngineError::InvalidSettings {
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeSpec;
    use crate::parameters::NodeParams;
    use crate::plugin::{PluginRegistry, TrustPolicy};

    fn build(spec: &RoutingSpec) -> EngineResult<GraphEngine> {
        let registry = PluginRegistry::new();
        GraphEngine::with_factory(spec, &NodeFactory::with_registry(TrustPolicy::default(), &registry))
    }

    fn sine_gain() -> RoutingSpec {
        RoutingSpec::new(48000, 256)
            .with_node(NodeSpec::new("osc", "sine"))
            .with_node(NodeSpec::new("amp", "gain").with_params(NodeParams::new().with("gain_db", -6.0)))
            .connect("osc", "amp")
    }

    #[test]
    fn test_block_timestamps() {
        let engine = build(&sine_gain()).unwrap();
        assert_eq!(engine.block_timestamp(0), 0.0);
        assert!((engine.block_timestamp(3) - 3.0 * 256.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn test_process_block_outputs_every_node() {
        let mut engine = build(&sine_gain()).unwrap();
        let outputs = engine.process_block(2).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["amp"].shape(), (256, 2));
        assert!((outputs["osc"].timestamp() - 512.0 / 48000.0).abs() < 1e-12);
        assert!(outputs["amp"].peak() < outputs["osc"].peak());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(build(&RoutingSpec::new(0, 256)), Err(EngineError::InvalidSettings { .. })));
        assert!(matches!(build(&RoutingSpec::new(48000, 0)), Err(EngineError::InvalidSettings { .. })));
        assert!(matches!(
            build(&RoutingSpec::new(48000, 256).with_default_channels(0)),
            Err(EngineError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let spec = RoutingSpec::new(48000, 256)
            .with_node(NodeSpec::new("osc", "sine").with_params(NodeParams::new().with("channels", 0)));
        assert!(matches!(build(&spec), Err(EngineError::InvalidChannels { .. })));
    }

    #[test]
    fn test_per_node_channels() {
        let spec = RoutingSpec::new(48000, 64)
            .with_node(NodeSpec::new("osc", "sine").with_params(NodeParams::new().with("channels", 1)))
            .with_node(NodeSpec::new("wide", "passthrough").with_params(NodeParams::new().with("channels", 4)))
            .connect("osc", "wide");
        let mut engine = build(&spec).unwrap();
        let outputs = engine.process_block(0).unwrap();
        assert_eq!(outputs["osc"].shape(), (64, 1));
        assert_eq!(outputs["wide"].shape(), (64, 4));
        assert_eq!(outputs["wide"].sample(10, 3), outputs["osc"].sample(10, 0));
    }

    #[test]
    fn test_run_rejects_unknown_tracked_node() {
        let mut engine = build(&sine_gain()).unwrap();
        assert!(matches!(
            engine.run(2, Some(&["ghost"][..])),
            Err(EngineError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_graph_state_snapshot() {
        let spec = RoutingSpec::new(48000, 64)
            .with_node(NodeSpec::new("osc", "sine").with_position(Position::new(5.0, 6.0)))
            .with_node(NodeSpec::new("out", "passthrough"))
            .connect("osc", "out");
        let mut engine = build(&spec).unwrap();
        engine.set_node_position("out", Position::new(100.0, 0.0)).unwrap();

        let state = engine.graph_state();
        assert_eq!(state.layout_version, 1);
        assert_eq!(state.execution_order, vec!["osc".to_string(), "out".to_string()]);
        assert_eq!(state.nodes[0].position, Position::new(5.0, 6.0));
        assert_eq!(state.nodes[1].position, Position::new(100.0, 0.0));
        assert_eq!(state.nodes[1].kind, "passthrough");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["nodes"][0]["category"], "generator");
        assert_eq!(json["connections"][0]["from"], "osc");
    }
}
