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

use serde::Serialize;
use thiserror::Error;

use crate::frame::AudioFrame;
use crate::nodes::FileInfo;
use crate::parameters::ParameterError;

/// ノード構築時に渡される共通引数
///
/// Every constructor, built-in or plugin, receives exactly this plus the
/// node's parameter mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    pub id: String,
    pub kind: String,
    pub sample_rate: u32,
    pub channels: usize,
}

impl NodeContext {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, sample_rate: u32, channels: usize) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            sample_rate,
            channels,
        }
    }
}

/// ノードのカテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Generator,
    Processor,
    Mixing,
    Output,
}

/// ノード情報
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    pub id: String,
    pub kind: String,
    pub category: NodeCategory,
    pub sample_rate: u32,
    pub channels: usize,
}

impl NodeInfo {
    pub fn new(ctx: &NodeContext, category: NodeCategory) -> Self {
        Self {
            id: ctx.id.clone(),
            kind: ctx.kind.clone(),
            category,
            sample_rate: ctx.sample_rate,
            channels: ctx.channels,
        }
    }

    /// Silent frame in this node's shape.
    pub fn silence(&self, frame_length: usize, timestamp: f64) -> AudioFrame {
        AudioFrame::silence(frame_length, self.channels, self.sample_rate, timestamp)
    }

    /// Mix `inputs` into this node's shape. See [`mix_inputs`].
    pub fn mix(&self, frame_length: usize, timestamp: f64, inputs: &[&AudioFrame]) -> AudioFrame {
        mix_inputs(inputs, frame_length, self.channels, self.sample_rate, timestamp)
    }
}

/// Processing unit driven by the graph engine.
///
/// `process` must return a frame of exactly `frame_length` rows and the node's
/// configured channel count. Nodes never mutate the frames they receive.
pub trait AudioNode {
    /// ノード情報を取得
    fn node_info(&self) -> &NodeInfo;

    /// 1ブロック分を処理
    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError>;

    /// Playback metadata for file-backed sources.
    fn file_info(&self) -> Option<FileInfo> {
        None
    }
}

/// オーディオ処理エラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error("buffer of {len} samples is not a whole number of {channels}-channel frames")]
    BufferLength { channels: usize, len: usize },

    #[error("node returned a {found:?} frame, expected {expected:?} (frames, channels)")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("internal processing error: {message}")]
    Internal { message: String },
}

/// Mix any number of upstream frames into one frame of the given shape.
///
/// Each input is channel-matched (mono is broadcast, extra channels are
/// dropped, missing channels stay silent) and length-matched (zero-padded or
/// truncated), then all inputs are summed sample-wise. No inputs gives silence.
pub fn mix_inputs(
    inputs: &[&AudioFrame],
    frame_length: usize,
    channels: usize,
    sample_rate: u32,
    timestamp: f64,
) -> AudioFrame {
    let mut samples = vec![0.0f32; frame_length * channels];

    for input in inputs {
        let in_channels = input.channels();
        let rows = input.frame_length().min(frame_length);

        for frame in 0..rows {
            let row = &mut samples[frame * channels..(frame + 1) * channels];
            for (channel, out) in row.iter_mut().enumerate() {
                let source = if in_channels == 1 {
                    0
                } else if channel < in_channels {
                    channel
                } else {
                    continue;
                };
                *out += input.sample(frame, source);
            }
        }
    }

    AudioFrame::from_parts(samples, frame_length, channels, sample_rate, timestamp)
}
