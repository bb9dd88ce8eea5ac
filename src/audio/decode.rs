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

//! WAV decoding into interleaved `f32`.

use std::path::Path;

use dasp::sample::I24;
use dasp::Sample;
use hound::{SampleFormat, WavReader};

/// Decoded file contents, interleaved, in the file's own rate and layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }
}

/// Read a whole WAV file. Integer PCM is scaled to [-1, 1).
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<DecodedAudio, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if !matches!(bits, 8 | 16 | 24 | 32) {
                return Err(hound::Error::Unsupported);
            }
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| int_to_f32(v, bits)))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(DecodedAudio {
        samples,
        channels: spec.channels as usize,
        sample_rate: spec.sample_rate,
    })
}

fn int_to_f32(value: i32, bits: u16) -> f32 {
    match bits {
        8 => (value as i8).to_sample::<f32>(),
        16 => (value as i16).to_sample::<f32>(),
        24 => I24::new_unchecked(value).to_sample::<f32>(),
        _ => value.to_sample::<f32>(),
    }
}
