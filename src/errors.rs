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

use thiserror::Error;

use crate::factory::FactoryError;
use crate::processing::ProcessingError;

/// Patchbay全体のエラー型
#[derive(Debug, Error)]
pub enum EngineError {
    /// エンジン設定が不正
    #[error("invalid engine settings: {reason}")]
    InvalidSettings { reason: String },

    /// ノードIDの重複
    #[error("duplicate node id '{node_id}'")]
    DuplicateNodeId { node_id: String },

    /// 接続先・接続元が存在しない
    #[error("connection {from} -> {to} references unknown node '{missing}'")]
    UnknownConnectionEndpoint {
        from: String,
        to: String,
        missing: String,
    },

    /// ノードの作成に失敗
    #[error("failed to create node '{node_id}' (kind '{kind}'): {source}")]
    NodeCreation {
        node_id: String,
        kind: String,
        #[source]
        source: FactoryError,
    },

    #[error("node '{node_id}' has an invalid channel count: {reason}")]
    InvalidChannels { node_id: String, reason: String },

    /// 循環参照の検出
    #[error("routing graph contains a cycle; unscheduled nodes: {remaining:?}")]
    CycleDetected { remaining: Vec<String> },

    /// オーディオ処理エラー
    #[error("node '{node_id}' failed in block {block_index}: {source}")]
    Processing {
        node_id: String,
        block_index: u64,
        #[source]
        source: ProcessingError,
    },

    /// ノードが見つからない
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Id of the node the error is about, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            EngineError::DuplicateNodeId { node_id }
            | EngineError::NodeCreation { node_id, .. }
            | EngineError::InvalidChannels { node_id, .. }
            | EngineError::Processing { node_id, .. }
            | EngineError::NodeNotFound { node_id } => Some(node_id),
            EngineError::UnknownConnectionEndpoint { missing, .. } => Some(missing),
            EngineError::InvalidSettings { .. } | EngineError::CycleDetected { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = EngineError::UnknownConnectionEndpoint {
            from: "osc".to_string(),
            to: "ghost".to_string(),
            missing: "ghost".to_string(),
        };
        assert_eq!(err.to_string(), "connection osc -> ghost references unknown node 'ghost'");
        assert_eq!(err.node_id(), Some("ghost"));

        let err = EngineError::Processing {
            node_id: "amp".to_string(),
            block_index: 3,
            source: ProcessingError::ShapeMismatch {
                expected: (64, 2),
                found: (64, 1),
            },
        };
        assert!(err.to_string().contains("amp"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cycle_has_no_single_node() {
        let err = EngineError::CycleDetected {
            remaining: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.node_id(), None);
    }
}
