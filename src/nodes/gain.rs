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
use crate::parameters::{db_to_linear, BasicParameter, NodeParams};
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// ゲインノード - dB指定の固定ゲイン
pub struct GainNode {
    node_info: NodeInfo,
    gain_db: f32,
    linear: f32,
}

impl GainNode {
    const GAIN_DB: BasicParameter = BasicParameter::new("gain_db", f32::MIN, f32::MAX, 0.0).with_unit("dB");

    pub const PARAMETERS: &'static [BasicParameter] = &[Self::GAIN_DB];

    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        let gain_db = Self::GAIN_DB.read(params)?;
        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Processor),
            gain_db,
            linear: db_to_linear(gain_db),
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn linear_gain(&self) -> f32 {
        self.linear
    }
}

impl AudioNode for GainNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError> {
        let mixed = self.node_info.mix(frame_length, timestamp, inputs);
        let linear = self.linear;
        let samples = mixed.into_samples().into_iter().map(|s| s * linear).collect();
        AudioFrame::from_interleaved(samples, self.node_info.channels, self.node_info.sample_rate, timestamp)
    }
}
