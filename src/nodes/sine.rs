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

use std::f64::consts::TAU;

use crate::frame::AudioFrame;
use crate::nodes::NodeBuildError;
use crate::parameters::{BasicParameter, NodeParams};
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// サイン波オシレーター
///
/// Phase is carried across blocks and kept in `[0, 2π)`, so consecutive
/// blocks join without a discontinuity. Every channel gets the same signal.
pub struct SineNode {
    node_info: NodeInfo,
    frequency: f64,
    amplitude: f64,
    phase: f64,
}

impl SineNode {
    const FREQUENCY: BasicParameter = BasicParameter::new("frequency_hz", 0.0, f32::MAX, 440.0).with_unit("Hz");
    const AMPLITUDE: BasicParameter = BasicParameter::new("amplitude", 0.0, 1.0, 0.2);
    const INITIAL_PHASE: BasicParameter =
        BasicParameter::new("initial_phase", f32::MIN, f32::MAX, 0.0).with_unit("rad");

    pub const PARAMETERS: &'static [BasicParameter] = &[Self::FREQUENCY, Self::AMPLITUDE, Self::INITIAL_PHASE];

    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Generator),
            frequency: Self::FREQUENCY.read(params)? as f64,
            amplitude: Self::AMPLITUDE.read(params)? as f64,
            phase: (Self::INITIAL_PHASE.read(params)? as f64).rem_euclid(TAU),
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    /// Current phase in radians, always within `[0, 2π)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl AudioNode for SineNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        _inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError> {
        let increment = TAU * self.frequency / self.node_info.sample_rate as f64;
        let start = self.phase;
        let amplitude = self.amplitude;

        let frame = AudioFrame::from_fn(
            frame_length,
            self.node_info.channels,
            self.node_info.sample_rate,
            timestamp,
            |i, _| (amplitude * (start + increment * i as f64).sin()) as f32,
        );

        self.phase = (start + increment * frame_length as f64).rem_euclid(TAU);
        Ok(frame)
    }
}
