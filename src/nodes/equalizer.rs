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

//! Three-band block equalizer.
//!
//! Each block is transformed on its own, without windowing or overlap, so
//! block edges can show discontinuities. That is the expected output.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

use crate::frame::AudioFrame;
use crate::nodes::NodeBuildError;
use crate::parameters::{db_to_linear, BasicParameter, NodeParams};
use crate::processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};

/// 3バンドイコライザー
pub struct EqualizerNode {
    node_info: NodeInfo,
    low_gain: f64,
    mid_gain: f64,
    high_gain: f64,
    low_cut_hz: f64,
    high_cut_hz: f64,
    planner: RealFftPlanner<f64>,
}

impl EqualizerNode {
    const LOW_GAIN_DB: BasicParameter = BasicParameter::new("low_gain_db", f32::MIN, f32::MAX, 0.0).with_unit("dB");
    const MID_GAIN_DB: BasicParameter = BasicParameter::new("mid_gain_db", f32::MIN, f32::MAX, 0.0).with_unit("dB");
    const HIGH_GAIN_DB: BasicParameter = BasicParameter::new("high_gain_db", f32::MIN, f32::MAX, 0.0).with_unit("dB");
    const LOW_CUT_HZ: BasicParameter = BasicParameter::new("low_cut_hz", 0.0, f32::MAX, 200.0).with_unit("Hz");
    const HIGH_CUT_HZ: BasicParameter = BasicParameter::new("high_cut_hz", 0.0, f32::MAX, 4000.0).with_unit("Hz");

    pub const PARAMETERS: &'static [BasicParameter] = &[
        Self::LOW_GAIN_DB,
        Self::MID_GAIN_DB,
        Self::HIGH_GAIN_DB,
        Self::LOW_CUT_HZ,
        Self::HIGH_CUT_HZ,
    ];

    pub fn new(ctx: &NodeContext, params: &NodeParams) -> Result<Self, NodeBuildError> {
        Ok(Self {
            node_info: NodeInfo::new(ctx, NodeCategory::Processor),
            low_gain: db_to_linear(Self::LOW_GAIN_DB.read(params)?) as f64,
            mid_gain: db_to_linear(Self::MID_GAIN_DB.read(params)?) as f64,
            high_gain: db_to_linear(Self::HIGH_GAIN_DB.read(params)?) as f64,
            low_cut_hz: Self::LOW_CUT_HZ.read(params)? as f64,
            high_cut_hz: Self::HIGH_CUT_HZ.read(params)? as f64,
            planner: RealFftPlanner::new(),
        })
    }

    pub fn build(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
        Ok(Box::new(Self::new(ctx, params)?))
    }

    /// Gain applied to a bin at `freq` Hz. Low and high bands multiply when
    /// the cutoffs are inverted and a bin falls in both.
    fn bin_gain(&self, freq: f64) -> f64 {
        let in_low = freq < self.low_cut_hz;
        let in_high = freq > self.high_cut_hz;

        let mut gain = 1.0;
        if in_low {
            gain *= self.low_gain;
        }
        if !in_low && !in_high {
            gain *= self.mid_gain;
        }
        if in_high {
            gain *= self.high_gain;
        }
        gain
    }

    fn filter_channel(&mut self, signal: &mut [f64]) -> Result<(), ProcessingError> {
        let n = signal.len();
        if n == 0 {
            return Ok(());
        }

        let forward = self.planner.plan_fft_forward(n);
        let inverse = self.planner.plan_fft_inverse(n);
        let mut spectrum = forward.make_output_vec();
        forward
            .process(signal, &mut spectrum)
            .map_err(|e| ProcessingError::Internal { message: e.to_string() })?;

        let bin_hz = self.node_info.sample_rate as f64 / n as f64;
        for (k, bin) in spectrum.iter_mut().enumerate() {
            *bin *= self.bin_gain(k as f64 * bin_hz);
        }

        // DC and (for even n) Nyquist must be real for the inverse
        spectrum[0].im = 0.0;
        if n % 2 == 0 {
            let last = spectrum.len() - 1;
            spectrum[last] = Complex::new(spectrum[last].re, 0.0);
        }

        inverse
            .process(&mut spectrum, signal)
            .map_err(|e| ProcessingError::Internal { message: e.to_string() })?;

        let scale = 1.0 / n as f64;
        signal.iter_mut().for_each(|v| *v *= scale);
        Ok(())
    }
}

impl AudioNode for EqualizerNode {
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
        let mixed = self.node_info.mix(frame_length, timestamp, inputs);
        let mut out = vec![0.0f32; frame_length * channels];

        for channel in 0..channels {
            let mut signal: Vec<f64> = mixed.channel(channel).into_iter().map(f64::from).collect();
            self.filter_channel(&mut signal)?;
            for (frame, value) in signal.into_iter().enumerate() {
                out[frame * channels + channel] = value as f32;
            }
        }

        AudioFrame::from_interleaved(out, channels, self.node_info.sample_rate, timestamp)
    }
}
