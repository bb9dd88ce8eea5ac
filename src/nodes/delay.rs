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
use crate::parameters::{BasicParameter, NodeParams};
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// ディレイエフェクト - フィードバック付きリングバッファ
///
/// The ring buffer holds exactly `delay_samples` frames, so the value read at
/// the write cursor is the input from `delay_samples` frames ago.
pub struct DelayNode {
    node_info: NodeInfo,
    feedback: f32,
    mix: f32,
    delay_samples: usize,
    // interleaved, delay_samples * channels
    buffer: Vec<f32>,
    write_index: usize,
}

impl DelayNode {
    const DELAY_MS: BasicParameter = BasicParameter::new("delay_ms", 0.0, 60_000.0, 250.0).with_unit("ms");
    const FEEDBACK: BasicParameter = BasicParameter::new("feedback", 0.0, 0.99, 0.3);
    const MIX: BasicParameter = BasicParameter::new("mix", 0.0, 1.0, 0.5);

    pub const PARAMETERS: &'static [BasicParameter] = &[Self::DELAY_MS, Self::FEEDBACK, Self::MIX];

    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        let delay_ms = Self::DELAY_MS.read_clamped(params)?;
        let delay_samples = delay_samples(ctx.sample_rate, delay_ms);

        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Processor),
            feedback: Self::FEEDBACK.read_clamped(params)?,
            mix: Self::MIX.read_clamped(params)?,
            delay_samples,
            buffer: vec![0.0; delay_samples * ctx.channels],
            write_index: 0,
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }
}

/// `max(1, round(sample_rate * ms / 1000))`
pub fn delay_samples(sample_rate: u32, delay_ms: f32) -> usize {
    let samples = (sample_rate as f64 * delay_ms as f64 / 1000.0).round();
    if samples < 1.0 {
        1
    } else {
        samples as usize
    }
}

impl AudioNode for DelayNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError> {
        let channels = self.node_info.channels;
        let mut samples = self.node_info.mix(frame_length, timestamp, inputs).into_samples();

        for frame in samples.chunks_exact_mut(channels.max(1)) {
            let base = self.write_index * channels;
            for (channel, sample) in frame.iter_mut().enumerate() {
                let dry = *sample;
                let delayed = self.buffer[base + channel];
                self.buffer[base + channel] = dry + self.feedback * delayed;
                *sample = (1.0 - self.mix) * dry + self.mix * delayed;
            }
            self.write_index = (self.write_index + 1) % self.delay_samples;
        }

        AudioFrame::from_interleaved(samples, channels, self.node_info.sample_rate, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(params: NodeParams, channels: usize) -> DelayNode {
        DelayNode::new(&NodeContext::new("echo", "delay", 48000, channels), &params).unwrap()
    }

    fn impulse(len: usize, channels: usize) -> AudioFrame {
        AudioFrame::from_fn(len, channels, 48000, 0.0, |f, _| if f == 0 { 1.0 } else { 0.0 })
    }

    #[test]
    fn test_impulse_appears_after_delay() {
        let mut node = delay(
            NodeParams::new()
                .with("delay_ms", 10.0)
                .with("feedback", 0.0)
                .with("mix", 1.0),
            2,
        );
        let d = delay_samples(48000, 10.0);
        assert_eq!(d, 480);

        let frame = node.process(1024, 0.0, &[&impulse(1024, 2)]).unwrap();
        assert!(frame.sample(0, 0).abs() < 1e-6);
        assert!(frame.sample(d, 0) > 0.5);
        assert!(frame.sample(d, 1) > 0.5);
        assert!(frame.sample(2 * d, 0).abs() < 1e-6);
    }

    #[test]
    fn test_feedback_repeats_decay() {
        let mut node = delay(
            NodeParams::new()
                .with("delay_ms", 1.0)
                .with("feedback", 0.5)
                .with("mix", 1.0),
            1,
        );
        let frame = node.process(200, 0.0, &[&impulse(200, 1)]).unwrap();
        assert!((frame.sample(48, 0) - 1.0).abs() < 1e-6);
        assert!((frame.sample(96, 0) - 0.5).abs() < 1e-6);
        assert!((frame.sample(144, 0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_delay_carries_across_blocks() {
        let mut node = delay(
            NodeParams::new()
                .with("delay_ms", 2.0)
                .with("feedback", 0.0)
                .with("mix", 1.0),
            1,
        );
        let first = node.process(64, 0.0, &[&impulse(64, 1)]).unwrap();
        assert!(first.is_silent());
        let second = node.process(64, 64.0 / 48000.0, &[]).unwrap();
        assert!((second.sample(96 - 64, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parameters_are_clamped() {
        let node = delay(
            NodeParams::new()
                .with("delay_ms", 0.0)
                .with("feedback", 1.5)
                .with("mix", -0.2),
            2,
        );
        assert_eq!(node.delay_samples(), 1);
        assert_eq!(node.feedback(), 0.99);
        assert_eq!(node.mix(), 0.0);
    }

    #[test]
    fn test_dry_only_mix_passes_input() {
        let mut node = delay(NodeParams::new().with("mix", 0.0), 2);
        let input = impulse(32, 2);
        let frame = node.process(32, 0.0, &[&input]).unwrap();
        assert_eq!(frame.samples(), input.samples());
    }
}
