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

use crate::audio::{open_capture_stream, CaptureSlot, StreamState};
use crate::frame::AudioFrame;
use crate::nodes::NodeBuildError;
use crate::parameters::NodeParams;
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// ライブ入力ノード
///
/// The capture stream is opened on the first `process` call. Each block copies
/// the latest captured buffer, padded or truncated to the block size; before
/// any data arrives, or if the device could not be opened, the block is silent.
pub struct InputNode {
    node_info: NodeInfo,
    device: Option<String>,
    slot: CaptureSlot,
    stream: StreamState,
}

impl InputNode {
    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Generator),
            device: params.text("device")?,
            slot: CaptureSlot::new(),
            stream: StreamState::Idle,
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    /// Handle to the slot the capture callback writes into.
    pub fn capture_slot(&self) -> CaptureSlot {
        self.slot.clone()
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_running()
    }
}

impl AudioNode for InputNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        _inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError> {
        let NodeInfo {
            id,
            sample_rate,
            channels,
            ..
        } = &self.node_info;
        let (sample_rate, channels) = (*sample_rate, *channels);

        let device = self.device.as_deref();
        let slot = self.slot.clone();
        self.stream
            .ensure_started(id, || open_capture_stream(device, sample_rate, channels, slot));

        let mut samples = self.slot.latest().unwrap_or_default();
        samples.resize(frame_length * channels, 0.0);
        AudioFrame::from_interleaved(samples, channels, sample_rate, timestamp)
    }
}

impl Drop for InputNode {
    fn drop(&mut self) {
        self.stream.shutdown();
    }
}
