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

//! Hardware device plumbing for the live input/output nodes.
//!
//! The device callback thread and the engine thread meet at exactly one place
//! per node: a [`CaptureSlot`] for capture, a [`PlaybackQueue`] for playback.

pub mod decode;
pub mod resample;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use thiserror::Error;

/// オーディオデバイスエラー
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no default {0} device available")]
    NoDevice(Direction),

    #[error("no {direction} device matching '{selector}'")]
    DeviceNotFound {
        direction: Direction,
        selector: String,
    },

    #[error("failed to enumerate {direction} devices: {reason}")]
    Enumerate {
        direction: Direction,
        reason: String,
    },

    #[error("failed to build {direction} stream: {source}")]
    Build {
        direction: Direction,
        #[source]
        source: cpal::BuildStreamError,
    },

    #[error("failed to start {direction} stream: {source}")]
    Play {
        direction: Direction,
        #[source]
        source: cpal::PlayStreamError,
    },
}

/// Stream direction, used for device lookup and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Most recent buffer delivered by a capture callback.
///
/// The callback overwrites the slot on every delivery; the engine copies it
/// out. `None` means nothing has arrived yet.
#[derive(Debug, Clone, Default)]
pub struct CaptureSlot {
    inner: Arc<Mutex<Option<Vec<f32>>>>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents with `data`.
    pub fn store(&self, data: &[f32]) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(buffer) => {
                buffer.clear();
                buffer.extend_from_slice(data);
            }
            None => *slot = Some(data.to_vec()),
        }
    }

    /// Copy of the latest buffer, if any.
    pub fn latest(&self) -> Option<Vec<f32>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Bounded FIFO between the engine (producer) and a playback callback (consumer).
#[derive(Debug, Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl PlaybackQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Append samples, discarding the oldest ones on overrun.
    /// Returns how many samples were discarded.
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut queue = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        queue.extend(samples.iter().copied());
        let overflow = queue.len().saturating_sub(self.capacity);
        queue.drain(..overflow);
        overflow
    }

    /// Fill `out` from the queue without blocking. Anything not available is silence.
    pub fn fill(&self, out: &mut [f32]) {
        let mut queue = match self.inner.try_lock() {
            Ok(queue) => queue,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                out.fill(0.0);
                return;
            }
        };

        for sample in out.iter_mut() {
            *sample = queue.pop_front().unwrap_or(0.0);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// デバイスを検索
///
/// `None` selects the host default. A numeric selector is an index into the
/// device list; anything else matches a case-insensitive name substring.
pub fn find_device(host: &Host, direction: Direction, selector: Option<&str>) -> Result<Device, DeviceError> {
    let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or(DeviceError::NoDevice(direction));
    };

    let devices: Vec<Device> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    }
    .map_err(|e| DeviceError::Enumerate {
        direction,
        reason: e.to_string(),
    })?;

    if let Ok(index) = selector.parse::<usize>() {
        return devices
            .into_iter()
            .nth(index)
            .ok_or_else(|| DeviceError::DeviceNotFound {
                direction,
                selector: selector.to_string(),
            });
    }

    let search_lower = selector.to_lowercase();
    devices
        .into_iter()
        .find(|device| {
            device
                .name()
                .map(|name| name.to_lowercase().contains(&search_lower))
                .unwrap_or(false)
        })
        .ok_or_else(|| DeviceError::DeviceNotFound {
            direction,
            selector: selector.to_string(),
        })
}

fn stream_config(sample_rate: u32, channels: usize) -> StreamConfig {
    StreamConfig {
        channels: channels as u16,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Open and start a capture stream that writes every callback buffer into `slot`.
pub fn open_capture_stream(
    selector: Option<&str>,
    sample_rate: u32,
    channels: usize,
    slot: CaptureSlot,
) -> Result<Stream, DeviceError> {
    let host = cpal::default_host();
    let device = find_device(&host, Direction::Input, selector)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let error_device = device_name.clone();

    let stream = device
        .build_input_stream(
            &stream_config(sample_rate, channels),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                slot.store(data);
            },
            move |err| {
                tracing::warn!(device = %error_device, error = %err, "input stream error");
            },
            None,
        )
        .map_err(|source| DeviceError::Build {
            direction: Direction::Input,
            source,
        })?;

    stream.play().map_err(|source| DeviceError::Play {
        direction: Direction::Input,
        source,
    })?;

    tracing::info!(device = %device_name, sample_rate, channels, "input stream started");
    Ok(stream)
}

/// Open and start a playback stream that drains `queue`.
pub fn open_playback_stream(
    selector: Option<&str>,
    sample_rate: u32,
    channels: usize,
    queue: PlaybackQueue,
) -> Result<Stream, DeviceError> {
    let host = cpal::default_host();
    let device = find_device(&host, Direction::Output, selector)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let error_device = device_name.clone();

    let stream = device
        .build_output_stream(
            &stream_config(sample_rate, channels),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                queue.fill(data);
            },
            move |err| {
                tracing::warn!(device = %error_device, error = %err, "output stream error");
            },
            None,
        )
        .map_err(|source| DeviceError::Build {
            direction: Direction::Output,
            source,
        })?;

    stream.play().map_err(|source| DeviceError::Play {
        direction: Direction::Output,
        source,
    })?;

    tracing::info!(device = %device_name, sample_rate, channels, "output stream started");
    Ok(stream)
}

/// Lifecycle of a lazily opened device stream.
pub enum StreamState {
    Idle,
    Running(Stream),
    Failed,
}

impl StreamState {
    /// Open the stream on first use. A failure is logged once and sticks.
    pub fn ensure_started<F>(&mut self, node_id: &str, open: F)
    where
        F: FnOnce() -> Result<Stream, DeviceError>,
    {
        if !matches!(self, StreamState::Idle) {
            return;
        }

        *self = match open() {
            Ok(stream) => StreamState::Running(stream),
            Err(err) => {
                tracing::warn!(node_id, error = %err, "audio device unavailable, node will output silence");
                StreamState::Failed
            }
        };
    }

    pub fn is_running(&self) -> bool {
        matches!(self, StreamState::Running(_))
    }

    /// Stop and release the stream, if one was opened.
    pub fn shutdown(&mut self) {
        if let StreamState::Running(stream) = std::mem::replace(self, StreamState::Idle) {
            if let Err(err) = stream.pause() {
                tracing::debug!(error = %err, "failed to pause stream during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Idle => write!(f, "Idle"),
            StreamState::Running(_) => write!(f, "Running"),
            StreamState::Failed => write!(f, "Failed"),
        }
    }
}
