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

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::audio::decode::{read_wav, DecodedAudio};
use crate::audio::resample::{resample_interleaved, target_len};
use crate::frame::AudioFrame;
use crate::nodes::NodeBuildError;
use crate::parameters::{BasicParameter, NodeParams};
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

const WAVEFORM_POINTS: usize = 1000;

/// One min/max bucket of the overview waveform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveformPoint {
    pub min: f32,
    pub max: f32,
    /// Bucket start, in seconds.
    pub time: f64,
}

/// ファイル再生状態のメタデータ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub file_path: String,
    pub duration: f64,
    pub current_time: f64,
    pub progress_percent: f64,
    pub file_peak: f32,
    pub file_rms: f64,
    pub total_samples: usize,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub waveform: Vec<WaveformPoint>,
}

/// オーディオファイル再生ノード
///
/// The file is decoded, resampled to the engine rate and adapted to the node's
/// channel count once, at construction. `process` only copies out of memory.
pub struct FileSourceNode {
    node_info: NodeInfo,
    path: PathBuf,
    // interleaved, node channel layout, engine rate
    data: Vec<f32>,
    total_frames: usize,
    position: usize,
    looping: bool,
    peak: f32,
    rms: f64,
    waveform: Vec<WaveformPoint>,
}

impl FileSourceNode {
    const START_OFFSET: BasicParameter = BasicParameter::new("start_offset", 0.0, f32::MAX, 0.0).with_unit("s");

    pub const PARAMETERS: &'static [BasicParameter] = &[Self::START_OFFSET];

    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        let path = PathBuf::from(params.required_text("file_path")?);
        let looping = params.bool_or("loop", false)?;
        let start_offset = Self::START_OFFSET.read(params)?;

        if !path.is_file() {
            return Err(NodeBuildError::FileNotFound { path });
        }

        let decoded = read_wav(&path).map_err(|source| NodeBuildError::FileDecode {
            path: path.clone(),
            source,
        })?;
        let data = load_samples(&path, decoded, ctx.sample_rate, ctx.channels)?;

        let channels = ctx.channels.max(1);
        let total_frames = data.len() / channels;
        let start = (start_offset as f64 * ctx.sample_rate as f64) as usize;
        let position = if looping && total_frames > 0 {
            start % total_frames
        } else {
            start
        };

        let peak = data.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let rms = if data.is_empty() {
            0.0
        } else {
            (data.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
        };
        let waveform = waveform(&data, channels, ctx.sample_rate);

        tracing::info!(
            node_id = %ctx.id,
            path = %path.display(),
            frames = total_frames,
            looping,
            "audio file loaded"
        );

        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Generator),
            path,
            data,
            total_frames,
            position,
            looping,
            peak,
            rms,
            waveform,
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    /// Playback cursor, in frames at the engine rate.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resample to the engine rate, then adapt the channel layout.
fn load_samples(
    path: &Path,
    decoded: DecodedAudio,
    sample_rate: u32,
    channels: usize,
) -> Result<Vec<f32>, NodeBuildError> {
    let source_channels = decoded.channels.max(1);
    let mut samples = decoded.samples;

    if decoded.sample_rate != sample_rate {
        let target = target_len(samples.len() / source_channels, decoded.sample_rate, sample_rate);
        samples = resample_interleaved(&samples, source_channels, target).map_err(|e| {
            NodeBuildError::Resample {
                path: path.to_path_buf(),
                from: decoded.sample_rate,
                to: sample_rate,
                reason: e.to_string(),
            }
        })?;
    }

    if source_channels == channels {
        return Ok(samples);
    }

    let frames = samples.len() / source_channels;
    let mut adapted = Vec::with_capacity(frames * channels);
    for frame in samples.chunks_exact(source_channels) {
        for channel in 0..channels {
            let value = if source_channels == 1 {
                frame[0]
            } else {
                frame.get(channel).copied().unwrap_or(0.0)
            };
            adapted.push(value);
        }
    }
    Ok(adapted)
}

/// Min/max overview in buckets of `max(1, total / WAVEFORM_POINTS)` frames.
fn waveform(data: &[f32], channels: usize, sample_rate: u32) -> Vec<WaveformPoint> {
    let total = data.len() / channels;
    if total == 0 {
        return Vec::new();
    }

    let step = (total / WAVEFORM_POINTS).max(1);
    (0..total / step)
        .map(|i| {
            let start = i * step;
            let end = ((i + 1) * step).min(total);
            let segment = &data[start * channels..end * channels];
            let (min, max) = segment
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| (lo.min(*s), hi.max(*s)));
            WaveformPoint {
                min,
                max,
                time: start as f64 / sample_rate as f64,
            }
        })
        .collect()
}

impl AudioNode for FileSourceNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(
        &mut self,
        frame_length: usize,
        timestamp: f64,
        _inputs: &[&AudioFrame],
    ) -> Result<AudioFrame, ProcessingError> {
        let channels = self.node_info.channels;
        let mut out = Vec::with_capacity(frame_length * channels);

        if self.looping && self.total_frames > 0 {
            let mut remaining = frame_length;
            while remaining > 0 {
                let take = remaining.min(self.total_frames - self.position);
                out.extend_from_slice(&self.data[self.position * channels..(self.position + take) * channels]);
                self.position = (self.position + take) % self.total_frames;
                remaining -= take;
            }
        } else if self.position < self.total_frames {
            let take = frame_length.min(self.total_frames - self.position);
            out.extend_from_slice(&self.data[self.position * channels..(self.position + take) * channels]);
            self.position += take;
        }

        out.resize(frame_length * channels, 0.0);
        AudioFrame::from_interleaved(out, channels, self.node_info.sample_rate, timestamp)
    }

    fn file_info(&self) -> Option<FileInfo> {
        let sample_rate = self.node_info.sample_rate as f64;
        let progress_percent = if self.total_frames > 0 {
            self.position.min(self.total_frames) as f64 / self.total_frames as f64 * 100.0
        } else {
            0.0
        };

        Some(FileInfo {
            file_path: self.path.display().to_string(),
            duration: self.total_frames as f64 / sample_rate,
            current_time: self.position as f64 / sample_rate,
            progress_percent,
            file_peak: self.peak,
            file_rms: self.rms,
            total_samples: self.total_frames,
            looping: self.looping,
            waveform: self.waveform.clone(),
        })
    }
}
