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

//! Frequency-domain resampling used when a file's rate differs from the engine's.
//!
//! The whole signal is transformed once, its spectrum truncated or zero-padded
//! to the target length, and transformed back. Even-length spectra split or
//! fold the Nyquist bin so the result stays real and energy-consistent.

use realfft::num_complex::Complex;
use realfft::{FftError, RealFftPlanner};

/// Target frame count for converting `frames` from `from_rate` to `to_rate`.
pub fn target_len(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }
    ((frames as u128 * to_rate as u128) / from_rate as u128) as usize
}

/// Resample interleaved audio to `target_frames` frames per channel.
pub fn resample_interleaved(
    samples: &[f32],
    channels: usize,
    target_frames: usize,
) -> Result<Vec<f32>, FftError> {
    if channels == 0 {
        return Ok(Vec::new());
    }

    let frames = samples.len() / channels;
    let mut planner = RealFftPlanner::<f64>::new();
    let mut out = vec![0.0f32; target_frames * channels];

    for channel in 0..channels {
        let signal: Vec<f64> = (0..frames)
            .map(|f| samples[f * channels + channel] as f64)
            .collect();
        let resampled = resample_channel(&mut planner, &signal, target_frames)?;
        for (f, value) in resampled.into_iter().enumerate() {
            out[f * channels + channel] = value as f32;
        }
    }

    Ok(out)
}

fn resample_channel(
    planner: &mut RealFftPlanner<f64>,
    signal: &[f64],
    num: usize,
) -> Result<Vec<f64>, FftError> {
    let nx = signal.len();
    if nx == 0 || num == 0 {
        return Ok(vec![0.0; num]);
    }

    let forward = planner.plan_fft_forward(nx);
    let mut input = signal.to_vec();
    let mut spectrum = forward.make_output_vec();
    forward.process(&mut input, &mut spectrum)?;

    let inverse = planner.plan_fft_inverse(num);
    let mut target = inverse.make_input_vec();

    let n = num.min(nx);
    let keep = n / 2 + 1;
    target[..keep].copy_from_slice(&spectrum[..keep]);

    if n % 2 == 0 {
        if num < nx {
            target[n / 2] *= 2.0;
        } else if num > nx {
            target[n / 2] *= 0.5;
        }
    }

    // Bins the inverse treats as purely real.
    target[0].im = 0.0;
    if num % 2 == 0 {
        let last = target.len() - 1;
        target[last] = Complex::new(target[last].re, 0.0);
    }

    let mut output = inverse.make_output_vec();
    inverse.process(&mut target, &mut output)?;

    let scale = 1.0 / nx as f64;
    Ok(output.into_iter().map(|v| v * scale).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_target_len_floors() {
        assert_eq!(target_len(44100, 44100, 48000), 48000);
        assert_eq!(target_len(100, 48000, 44100), 91);
        assert_eq!(target_len(10, 0, 48000), 0);
    }

    #[test]
    fn test_same_length_is_identity() {
        let signal: Vec<f32> = (0..64).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
        let out = resample_interleaved(&signal, 1, 64).unwrap();
        for (a, b) in signal.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_dc_level_is_preserved() {
        let signal = vec![0.5f32; 2 * 100];
        let out = resample_interleaved(&signal, 2, 160).unwrap();
        assert_eq!(out.len(), 320);
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_upsampled_sine_keeps_frequency() {
        // 4 cycles over 64 samples, upsampled to 128 samples
        let signal: Vec<f32> = (0..64)
            .map(|i| (2.0 * PI * 4.0 * i as f64 / 64.0).sin() as f32)
            .collect();
        let out = resample_interleaved(&signal, 1, 128).unwrap();
        for (i, v) in out.iter().enumerate() {
            let expected = (2.0 * PI * 4.0 * i as f64 / 128.0).sin() as f32;
            assert!((v - expected).abs() < 1e-4, "sample {}: {} vs {}", i, v, expected);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(resample_interleaved(&[], 2, 0).unwrap().is_empty());
        assert_eq!(resample_interleaved(&[], 1, 4).unwrap(), vec![0.0; 4]);
    }
}
