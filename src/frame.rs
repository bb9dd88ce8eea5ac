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

use crate::processing::ProcessingError;

/// 1ブロック分のオーディオデータ
///
/// Samples are stored interleaved, frame-major: `samples[frame * channels + channel]`.
/// A frame never changes shape after it is built; nodes produce a fresh one every block.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    frame_length: usize,
    channels: usize,
    sample_rate: u32,
    timestamp: f64,
}

impl AudioFrame {
    /// 無音フレームを作成
    pub fn silence(frame_length: usize, channels: usize, sample_rate: u32, timestamp: f64) -> Self {
        Self {
            samples: vec![0.0; frame_length * channels],
            frame_length,
            channels,
            sample_rate,
            timestamp,
        }
    }

    /// Wrap an interleaved buffer. The buffer length must be a whole number of frames.
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: usize,
        sample_rate: u32,
        timestamp: f64,
    ) -> Result<Self, ProcessingError> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(ProcessingError::BufferLength {
                channels,
                len: samples.len(),
            });
        }

        Ok(Self {
            frame_length: samples.len() / channels,
            samples,
            channels,
            sample_rate,
            timestamp,
        })
    }

    /// Wrap a buffer whose length is already `frame_length * channels`.
    pub(crate) fn from_parts(
        samples: Vec<f32>,
        frame_length: usize,
        channels: usize,
        sample_rate: u32,
        timestamp: f64,
    ) -> Self {
        debug_assert_eq!(samples.len(), frame_length * channels);
        Self {
            samples,
            frame_length,
            channels,
            sample_rate,
            timestamp,
        }
    }

    /// Build a frame by evaluating `f(frame_index, channel)` for every sample.
    pub fn from_fn<F>(
        frame_length: usize,
        channels: usize,
        sample_rate: u32,
        timestamp: f64,
        mut f: F,
    ) -> Self
    where
        F: FnMut(usize, usize) -> f32,
    {
        let mut samples = Vec::with_capacity(frame_length * channels);
        for frame in 0..frame_length {
            for channel in 0..channels {
                samples.push(f(frame, channel));
            }
        }

        Self {
            samples,
            frame_length,
            channels,
            sample_rate,
            timestamp,
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// (frame_length, channels)
    pub fn shape(&self) -> (usize, usize) {
        (self.frame_length, self.channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// ブロック先頭の時刻（秒）
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Sample at `(frame, channel)`, or `0.0` outside the frame.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        if frame >= self.frame_length || channel >= self.channels {
            return 0.0;
        }
        self.samples[frame * self.channels + channel]
    }

    /// Iterate over interleaved frames, one slice of `channels` samples each.
    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        self.samples.chunks_exact(self.channels.max(1))
    }

    /// 指定チャンネルのサンプルをコピーして取得
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        (0..self.frame_length)
            .map(|frame| self.sample(frame, channel))
            .collect()
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Root mean square over every sample of every channel.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }
}
