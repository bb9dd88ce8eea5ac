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

use crate::frame::AudioFrame;
use crate::nodes::NodeBuildError;
use crate::parameters::NodeParams;
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// ミキサー / パススルー
///
/// Sums its inputs into the node's shape; silence when nothing is connected.
pub struct PassthroughNode {
    node_info: NodeInfo,
}

impl PassthroughNode {
    pub fn new(ctx: &NodeContext) -> Self {
        Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Mixing),
        }
    }

    pub fn build(ctx: &NodeContext, _params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx)))
    }
}

impl AudioNode for PassthroughNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError> {
        Ok(self.node_info.mix(frame_length, timestamp, inputs))
    }
}
