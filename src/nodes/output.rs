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

use crate::audio::{open_playback_stream, PlaybackQueue, StreamState};
use crate::frame::AudioFrame;
use crate::nodes::NodeBuildError;
use crate::parameters::NodeParams;
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// Seconds of audio the playback queue may hold before dropping the oldest samples.
const QUEUE_SECONDS: f64 = 0.5;

/// ライブ出力ノード
///
/// Mixed input is handed to the device through a bounded queue; the node
/// itself always returns silence, so anything downstream hears nothing.
pub struct OutputNode {
    node_info: NodeInfo,
    device: Option<String>,
    queue: PlaybackQueue,
    stream: StreamState,
    overruns: OverrunCounter,
}

/// Playback overrun bookkeeping. Warnings go out on the 1st, 2nd, 4th, 8th...
/// overrun so a stalled device does not flood the log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct OverrunCounter {
    events: u64,
    dropped: u64,
}

impl OverrunCounter {
    /// Record one overrun; returns true when it should be logged.
    fn record(&mut self, dropped: usize) -> bool {
        self.events += 1;
        self.dropped += dropped as u64;
        self.events.is_power_of_two()
    }
}

impl OutputNode {
    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        let capacity = (ctx.sample_rate as f64 * QUEUE_SECONDS) as usize * ctx.channels;
        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Output),
            device: params.text("device")?,
            queue: PlaybackQueue::with_capacity(capacity),
            stream: StreamState::Idle,
            overruns: OverrunCounter::default(),
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_running()
    }

    /// Samples waiting for the device.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl AudioNode for OutputNode {
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

        let (sample_rate, channels) = (self.node_info.sample_rate, self.node_info.channels);
        let device = self.device.as_deref();
        let queue = self.queue.clone();
        self.stream.ensure_started(&self.node_info.id, || {
            open_playback_stream(device, sample_rate, channels, queue)
        });

        if self.stream.is_running() {
            let dropped = self.queue.push(mixed.samples());
            if dropped > 0 && self.overruns.record(dropped) {
                tracing::warn!(
                    node_id = %self.node_info.id,
                    dropped,
                    overruns = self.overruns.events,
                    total_dropped = self.overruns.dropped,
                    "playback queue overrun"
                );
            }
        }

        Ok(self.node_info.silence(frame_length, timestamp))
    }
}

impl Drop for OutputNode {
    fn drop(&mut self) {
        self.stream.shutdown();
    }
}
