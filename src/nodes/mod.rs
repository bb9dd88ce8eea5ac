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

pub mod delay;
pub mod equalizer;
pub mod file_source;
pub mod gain;
pub mod input;
pub mod output;
pub mod passthrough;
pub mod sine;

use std::path::PathBuf;

use thiserror::Error;

use crate::parameters::{BasicParameter, NodeParams, ParameterError};
use crate::processing::{AudioNode, NodeContext};

pub use delay::DelayNode;
pub use equalizer::EqualizerNode;
pub use file_source::{FileInfo, FileSourceNode, WaveformPoint};
pub use gain::GainNode;
pub use input::InputNode;
pub use output::OutputNode;
pub use passthrough::PassthroughNode;
pub use sine::SineNode;

/// Canonical node constructor signature, shared by built-ins and plugins.
pub type NodeConstructor = fn(&NodeContext, &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError>;

/// 組み込みノードの種類
pub const BUILTIN_KINDS: &[&str] = &[
    "sine",
    "audio_file",
    "audio_input",
    "audio_output",
    "passthrough",
    "gain",
    "eq",
    "delay",
];

/// ノード構築エラー
#[derive(Debug, Error)]
pub enum NodeBuildError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("audio file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to decode {}: {source}", path.display())]
    FileDecode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("failed to resample {} from {from} Hz to {to} Hz: {reason}", path.display())]
    Resample {
        path: PathBuf,
        from: u32,
        to: u32,
        reason: String,
    },

    /// Free-form failure reported by a plugin constructor.
    #[error("{message}")]
    Custom { message: String },
}

impl NodeBuildError {
    pub fn custom(message: impl Into<String>) -> Self {
        NodeBuildError::Custom {
            message: message.into(),
        }
    }
}

/// Look up a built-in constructor. Matching is case-insensitive.
pub fn builtin_constructor(kind: &str) -> Option<NodeConstructor> {
    let constructor: NodeConstructor = match kind.to_ascii_lowercase().as_str() {
        "sine" => SineNode::build,
        "audio_file" => FileSourceNode::build,
        "audio_input" => InputNode::build,
        "audio_output" => OutputNode::build,
        "passthrough" => PassthroughNode::build,
        "gain" => GainNode::build,
        "eq" => EqualizerNode::build,
        "delay" => DelayNode::build,
        _ => return None,
    };
    Some(constructor)
}

pub fn is_builtin(kind: &str) -> bool {
    builtin_constructor(kind).is_some()
}

/// Numeric parameters a built-in kind understands.
pub fn builtin_parameters(kind: &str) -> &'static [BasicParameter] {
    match kind.to_ascii_lowercase().as_str() {
        "sine" => SineNode::PARAMETERS,
        "audio_file" => FileSourceNode::PARAMETERS,
        "gain" => GainNode::PARAMETERS,
        "eq" => EqualizerNode::PARAMETERS,
        "delay" => DelayNode::PARAMETERS,
        _ => &[],
    }
}
