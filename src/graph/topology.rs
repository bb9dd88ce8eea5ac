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

//! Execution ordering with Kahn's algorithm.

use std::collections::{HashMap, VecDeque};

use crate::errors::{EngineError, EngineResult};
use crate::graph::Connection;

/// 実行順序を計算
///
/// Zero-indegree nodes are seeded in declaration order; nodes freed later
/// are appended in connection order. Every connection endpoint must be one
/// of `node_ids`.
pub fn execution_order(node_ids: &[String], connections: &[Connection]) -> EngineResult<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = node_ids.iter().map(|id| (id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for connection in connections {
        successors
            .entry(connection.from.as_str())
            .or_default()
            .push(connection.to.as_str());
        if let Some(count) = indegree.get_mut(connection.to.as_str()) {
            *count += 1;
        }
    }

    let mut queue: VecDeque<&str> = node_ids
        .iter()
        .map(String::as_str)
        .filter(|id| indegree.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(node_ids.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for next in successors.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = indegree.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if order.len() < node_ids.len() {
        let remaining = node_ids
            .iter()
            .filter(|id| indegree.get(id.as_str()).copied().unwrap_or(0) > 0)
            .cloned()
            .collect();
        return Err(EngineError::CycleDetected { remaining });
    }

    Ok(order)
}
